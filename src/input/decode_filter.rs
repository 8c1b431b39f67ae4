/// FFmpeg解码过滤器模块
/// FFmpeg decode filter: YUV420P → RGB24 帧, 经有界通道交给处理循环
use crossbeam_channel::Sender;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::output::VideoFrame;

/// 逐条打印丢帧原因的上限
const DROP_LOG_LIMIT: u64 = 10;

/// 解码过滤器
pub struct DecodeFilter {
    tx: Sender<Result<VideoFrame>>,
    /// 下一帧的源帧号 (损坏帧也占用帧号, 保证时间戳真实)
    next_index: Arc<AtomicU64>,
    /// 与解码器共享, 计入运行报告的丢帧数
    dropped: Arc<AtomicU64>,
    count: u64,
    current_fps: f64,
    last: Instant,
}

impl DecodeFilter {
    pub fn new(
        tx: Sender<Result<VideoFrame>>,
        next_index: Arc<AtomicU64>,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        Self {
            tx,
            next_index,
            dropped,
            count: 0,
            current_fps: 0.0,
            last: Instant::now(),
        }
    }

    fn drop_frame(&mut self, index: u64, reason: std::fmt::Arguments<'_>) {
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if dropped <= DROP_LOG_LIMIT {
            log::warn!("⚠️  丢弃帧 #{}: {}", index, reason);
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> std::result::Result<(), String> {
        log::debug!("解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> std::result::Result<Option<Frame>, String> {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);

        unsafe {
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                self.drop_frame(index, format_args!("空帧/损坏帧"));
                return Ok(None);
            }

            let raw = &*frame.as_ptr();
            let (w, h) = (raw.width as usize, raw.height as usize);
            if w == 0 || h == 0 {
                self.drop_frame(index, format_args!("非法分辨率 {}x{}", w, h));
                return Ok(None);
            }

            let (y_stride, uv_stride) = (raw.linesize[0] as usize, raw.linesize[1] as usize);
            if raw.data[..3].iter().any(|p| p.is_null()) {
                self.drop_frame(index, format_args!("YUV指针为空"));
                return Ok(None);
            }
            if y_stride < w || uv_stride < w.div_ceil(2) {
                self.drop_frame(
                    index,
                    format_args!("步长异常 y_stride={} uv_stride={}", y_stride, uv_stride),
                );
                return Ok(None);
            }

            let chroma_rows = h.div_ceil(2);
            let planes = Yuv420Planes {
                luma: std::slice::from_raw_parts(raw.data[0], y_stride * h),
                cb: std::slice::from_raw_parts(raw.data[1], uv_stride * chroma_rows),
                cr: std::slice::from_raw_parts(raw.data[2], uv_stride * chroma_rows),
                y_stride,
                uv_stride,
            };
            let rgb = planes.to_rgb24(w, h);

            self.count += 1;
            if self.last.elapsed().as_secs_f64() >= 5.0 {
                self.current_fps = self.count as f64 / self.last.elapsed().as_secs_f64();
                log::debug!(
                    "📺 解码统计: {:.1}fps | 源帧 {} | 丢弃 {}",
                    self.current_fps,
                    index + 1,
                    self.dropped.load(Ordering::Relaxed)
                );
                self.last = Instant::now();
                self.count = 0;
            }

            let decoded = VideoFrame::rgb(index, w as u32, h as u32, rgb);
            // 接收端已关闭 (取消/提前结束), 停止解码
            if self.tx.send(Ok(decoded)).is_err() {
                return Err("frame receiver closed".to_string());
            }
        }

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        log::debug!("解码线程退出 (丢弃 {} 帧)", self.dropped.load(Ordering::Relaxed));
    }
}

/// 借用的 YUV420P 三个平面
struct Yuv420Planes<'a> {
    luma: &'a [u8],
    cb: &'a [u8],
    cr: &'a [u8],
    y_stride: usize,
    uv_stride: usize,
}

impl Yuv420Planes<'_> {
    /// BT.601 定点系数 (x/128)
    fn to_rgb24(&self, width: usize, height: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(width * height * 3);
        for row in 0..height {
            let luma = &self.luma[row * self.y_stride..][..width];
            let chroma = (row / 2) * self.uv_stride;
            for (col, &l) in luma.iter().enumerate() {
                let l = i32::from(l);
                let cb = i32::from(self.cb[chroma + col / 2]) - 128;
                let cr = i32::from(self.cr[chroma + col / 2]) - 128;
                out.push(clamp_u8(l + ((cr * 179) >> 7)));
                out.push(clamp_u8(l - ((cb * 44) >> 7) - ((cr * 91) >> 7)));
                out.push(clamp_u8(l + ((cb * 227) >> 7)));
            }
        }
        out
    }
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}
