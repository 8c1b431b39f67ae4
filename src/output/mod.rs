/// 视频输出系统 (Video Output System)
///
/// - codec:   FourCC → FFmpeg 编码器名
/// - frame:   原始帧与尺寸/颜色归一化
/// - encoder: 编码会话 (候选编码器回退 + 输出校验)
/// - ffmpeg:  ez-ffmpeg 编码后端
pub mod codec;
pub mod encoder;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod frame;

pub use encoder::{
    EncoderSession, EncoderSettings, FinalizedVideo, FrameWriter, ProbeInfo, SessionState,
    VideoBackend,
};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegBackend;
pub use frame::{FrameNormalizer, PixelLayout, VideoFrame};
