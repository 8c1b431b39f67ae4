//! 错误类型 (Error taxonomy)
//!
//! 每个错误都带有稳定的机器可读原因码,写入运行报告。

use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 配置非法 (致命,在处理任何帧之前抛出)
    #[error("invalid configuration: {0}")]
    Config(String),

    /// 源帧无法读取 (终止输入循环,但编码会话仍会收尾)
    #[error("frame {frame_index} could not be decoded: {reason}")]
    Decode { frame_index: u64, reason: String },

    /// 所有编码器候选都无法打开
    #[error("no codec candidate could be opened (tried: {})", .tried.join(", "))]
    EncoderInit { tried: Vec<String> },

    /// 单帧写入失败 (本地恢复: 跳过该帧)
    #[error("frame write failed: {0}")]
    FrameWrite(String),

    /// 输出文件未通过校验
    #[error("output validation failed for {}: {}", .path.display(), .reason)]
    Validation { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn frame_write(msg: impl Into<String>) -> Self {
        Error::FrameWrite(msg.into())
    }

    pub fn validation(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// 机器可读原因码
    pub fn reason_code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_invalid",
            Error::Decode { .. } => "decode_failed",
            Error::EncoderInit { .. } => "encoder_init_failed",
            Error::FrameWrite(_) => "frame_write_failed",
            Error::Validation { .. } => "validation_failed",
            Error::Io(_) => "io_error",
            Error::Json(_) => "report_invalid",
        }
    }
}
