//! FFmpeg 编码后端 (ez-ffmpeg)
//!
//! 合成后的 RGB24 帧经有界通道送入 rawvideo 读回调,由 FFmpeg 调度线程编码写盘。
//! 候选编码器可以是 FourCC, 见 `codec` 模块。

use crossbeam_channel::{bounded, Receiver, Sender};
use ez_ffmpeg::stream_info::{find_video_stream_info, StreamInfo};
use ez_ffmpeg::{FfmpegContext, Input, Output};
use image::RgbImage;
use std::path::Path;

use ffmpeg_sys_next::AVERROR_EOF;

use super::codec::resolve_encoder;
use super::encoder::{FrameWriter, ProbeInfo, VideoBackend};
use crate::config::Resolution;
use crate::error::{Error, Result};

/// 编码线程前的帧缓冲深度
const WRITE_QUEUE_DEPTH: usize = 8;

/// 基于 ez-ffmpeg 的视频后端
#[derive(Debug, Default)]
pub struct FfmpegBackend {
    encoders: Option<Vec<String>>,
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 本机 FFmpeg 可用的编码器名 (首次调用时查询)
    fn available_encoders(&mut self) -> &[String] {
        self.encoders.get_or_insert_with(|| {
            let names: Vec<String> = ez_ffmpeg::codec::get_encoders()
                .into_iter()
                .map(|c| c.codec_name)
                .collect();
            log::debug!("FFmpeg 可用编码器 {} 个", names.len());
            names
        })
    }
}

impl VideoBackend for FfmpegBackend {
    fn open(
        &mut self,
        codec: &str,
        path: &Path,
        resolution: Resolution,
        fps: f64,
    ) -> Result<Box<dyn FrameWriter>> {
        let encoder = resolve_encoder(codec, self.available_encoders())
            .map(str::to_string)
            .ok_or_else(|| Error::EncoderInit {
                tried: vec![codec.to_string()],
            })?;
        if encoder != codec {
            log::debug!("编码器标识 {} → {}", codec, encoder);
        }

        let (tx, rx) = bounded::<Vec<u8>>(WRITE_QUEUE_DEPTH);
        let input = Input::new_by_read_callback(raw_reader(rx))
            .set_format("rawvideo")
            .set_input_opts(
                [
                    ("video_size", format!("{}x{}", resolution.width, resolution.height)),
                    ("pixel_format", "rgb24".to_string()),
                    ("framerate", format!("{fps:.3}")),
                ]
                .into(),
            );
        let output =
            Output::from(path.to_string_lossy().to_string()).set_video_codec(encoder.as_str());

        let ctx = FfmpegContext::builder()
            .input(input)
            .output(output)
            .build()
            .map_err(|e| Error::EncoderInit {
                tried: vec![format!("{codec} ({e})")],
            })?;
        let scheduler = ctx.start().map_err(|e| Error::EncoderInit {
            tried: vec![format!("{codec} ({e})")],
        })?;

        Ok(Box::new(FfmpegWriter {
            tx: Some(tx),
            wait: Some(Box::new(move || scheduler.wait().map_err(|e| e.to_string()))),
            frame_bytes: resolution.rgb_frame_bytes(),
        }))
    }

    fn probe(&self, path: &Path) -> Result<ProbeInfo> {
        let info = find_video_stream_info(path.to_string_lossy().to_string())
            .map_err(|e| Error::validation(path, e.to_string()))?;
        match info {
            Some(StreamInfo::Video { nb_frames, .. }) => Ok(ProbeInfo {
                frame_count: nb_frames.max(0) as u64,
            }),
            _ => Err(Error::validation(path, "no video stream")),
        }
    }
}

/// rawvideo 读回调: 按需从通道取帧,发送端关闭后返回 EOF
fn raw_reader(rx: Receiver<Vec<u8>>) -> impl FnMut(&mut [u8]) -> i32 {
    let mut pending: Vec<u8> = Vec::new();
    let mut offset = 0usize;
    move |buf: &mut [u8]| {
        if offset >= pending.len() {
            match rx.recv() {
                Ok(frame) => {
                    pending = frame;
                    offset = 0;
                }
                Err(_) => return AVERROR_EOF,
            }
        }
        let n = buf.len().min(pending.len() - offset);
        buf[..n].copy_from_slice(&pending[offset..offset + n]);
        offset += n;
        n as i32
    }
}

struct FfmpegWriter {
    tx: Option<Sender<Vec<u8>>>,
    wait: Option<Box<dyn FnOnce() -> std::result::Result<(), String>>>,
    frame_bytes: usize,
}

impl FrameWriter for FfmpegWriter {
    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::frame_write("writer already closed"))?;
        if frame.as_raw().len() != self.frame_bytes {
            return Err(Error::frame_write(format!(
                "frame has {} bytes, encoder expects {}",
                frame.as_raw().len(),
                self.frame_bytes
            )));
        }
        tx.send(frame.as_raw().clone())
            .map_err(|_| Error::frame_write("encoder thread has stopped"))
    }

    fn close(&mut self) -> Result<()> {
        // 先关闭发送端, 读回调才会返回 EOF
        drop(self.tx.take());
        match self.wait.take() {
            Some(wait) => wait().map_err(Error::frame_write),
            None => Ok(()),
        }
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("⚠️  编码线程退出异常: {}", e);
        }
    }
}
