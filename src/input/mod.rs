/// 视频输入系统 (Video Input System)
///
/// - FrameSource:  按源帧顺序提供原始帧
/// - VideoDecoder: FFmpeg 软件解码 (独立线程 + 有界通道)
/// - DecodeFilter: 帧校验与 YUV → RGB 转换
#[cfg(feature = "ffmpeg")]
pub mod decode_filter;
#[cfg(feature = "ffmpeg")]
pub mod decoder;

#[cfg(feature = "ffmpeg")]
pub use decode_filter::DecodeFilter;
#[cfg(feature = "ffmpeg")]
pub use decoder::{probe_frame_count, VideoDecoder};

use crate::error::Result;
use crate::output::VideoFrame;

/// 原始帧来源
pub trait FrameSource {
    /// 下一帧; 输入结束返回 `Ok(None)`, 读取失败返回 `Error::Decode`
    fn next_frame(&mut self) -> Result<Option<VideoFrame>>;

    /// 总帧数 (未知时为None)
    fn total_frames(&self) -> Option<u64> {
        None
    }

    /// 来源内部丢弃的帧数 (损坏/无法转换, 从未交给调用方)
    fn dropped_frames(&self) -> u64 {
        0
    }
}

/// 内存帧序列 (测试与离线合成)
pub struct FrameIter<I> {
    frames: I,
    total: Option<u64>,
}

impl<I> FrameIter<I>
where
    I: Iterator<Item = Result<VideoFrame>>,
{
    pub fn new(frames: I) -> Self {
        Self {
            frames,
            total: None,
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }
}

impl<I> FrameSource for FrameIter<I>
where
    I: Iterator<Item = Result<VideoFrame>>,
{
    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        self.frames.next().transpose()
    }

    fn total_frames(&self) -> Option<u64> {
        self.total
    }
}
