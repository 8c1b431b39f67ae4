/// 视频文件解码器
/// Video file decoder with software decoding, frames delivered through a bounded channel
use super::decode_filter::DecodeFilter;
use super::FrameSource;
use crossbeam_channel::{bounded, Receiver};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::stream_info::{find_video_stream_info, StreamInfo};
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crate::config::Resolution;
use crate::error::{Error, Result};
use crate::output::VideoFrame;

/// 解码线程与处理循环之间的缓冲帧数
const DECODE_QUEUE_DEPTH: usize = 4;

/// 视频解码器 (独立线程运行FFmpeg, 按源帧顺序输出RGB帧)
pub struct VideoDecoder {
    rx: Receiver<Result<VideoFrame>>,
    total_frames: Option<u64>,
    dropped: Arc<AtomicU64>,
}

impl VideoDecoder {
    /// 打开视频文件, 解码输出缩放到 `resolution`
    pub fn open(url: &str, resolution: Resolution) -> Result<Self> {
        let total_frames = probe_frame_count(url);
        log::info!("🎬 视频解码器启动: {}", url);
        match total_frames {
            Some(n) => log::info!("📹 源视频共 {} 帧", n),
            None => log::info!("📹 源视频帧数未知"),
        }

        let (tx, rx) = bounded(DECODE_QUEUE_DEPTH);
        let dropped = Arc::new(AtomicU64::new(0));
        let filter_dropped = Arc::clone(&dropped);
        let url = url.to_string();
        let scale = format!(
            "scale={}:{},format=yuv420p",
            resolution.width, resolution.height
        );

        thread::Builder::new()
            .name("video-decoder".into())
            .spawn(move || {
                let next_index = Arc::new(AtomicU64::new(0));
                let filter = DecodeFilter::new(tx.clone(), Arc::clone(&next_index), filter_dropped);
                if let Err(reason) = software_decode(&url, &scale, filter) {
                    let frame_index = next_index.load(Ordering::Relaxed);
                    // 接收端可能已经关闭, 忽略发送失败
                    let _ = tx.send(Err(Error::Decode {
                        frame_index,
                        reason,
                    }));
                }
                log::debug!("解码线程退出");
            })?;

        Ok(Self {
            rx,
            total_frames,
            dropped,
        })
    }
}

/// CPU软件解码, 阻塞直到输入结束
fn software_decode(url: &str, scale: &str, filter: DecodeFilter) -> std::result::Result<(), String> {
    let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
    let pipe = pipe.filter("decode", Box::new(filter));
    let out = create_null_output().add_frame_pipeline(pipe);

    let ctx = FfmpegContext::builder()
        .input(Input::new(url))
        .filter_descs([scale].into())
        .output(out)
        .build()
        .map_err(|e| format!("构建失败: {}", e))?;

    let sch = ctx.start().map_err(|e| format!("启动失败: {}", e))?;
    sch.wait().map_err(|e| e.to_string())
}

impl FrameSource for VideoDecoder {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        match self.rx.recv() {
            Ok(Ok(frame)) => Ok(Some(frame)),
            Ok(Err(e)) => Err(e),
            // 所有发送端已释放: 输入结束
            Err(_) => Ok(None),
        }
    }

    fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// 读取容器报告的视频帧数
pub fn probe_frame_count(url: &str) -> Option<u64> {
    match find_video_stream_info(url.to_string()) {
        Ok(Some(StreamInfo::Video { nb_frames, .. })) if nb_frames > 0 => Some(nb_frames as u64),
        Ok(_) => None,
        Err(e) => {
            log::warn!("⚠️  无法读取视频信息: {}", e);
            None
        }
    }
}
