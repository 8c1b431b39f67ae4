//! 帧缓冲与尺寸归一化
//! 写入编码器前统一为目标分辨率的 RGB24

use fast_image_resize as fr;
use image::RgbImage;

use crate::config::Resolution;
use crate::error::{Error, Result};

/// 原始像素布局
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    Rgb24,
    Rgba32,
    Gray8,
}

impl PixelLayout {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelLayout::Rgb24 => 3,
            PixelLayout::Rgba32 => 4,
            PixelLayout::Gray8 => 1,
        }
    }
}

/// 一帧原始图像 (紧密排列, 无行填充)
#[derive(Clone, Debug)]
pub struct VideoFrame {
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub data: Vec<u8>,
}

impl VideoFrame {
    pub fn rgb(index: u64, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            index,
            width,
            height,
            layout: PixelLayout::Rgb24,
            data,
        }
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.layout.bytes_per_pixel()
    }
}

/// 尺寸/颜色归一化器 (复用 Resizer 内部缓冲)
pub struct FrameNormalizer {
    target: Resolution,
    resizer: fr::Resizer,
}

impl FrameNormalizer {
    pub fn new(target: Resolution) -> Self {
        Self {
            target,
            resizer: fr::Resizer::new(),
        }
    }

    /// 转为目标分辨率的RGB图像
    pub fn normalize(&mut self, frame: VideoFrame) -> Result<RgbImage> {
        if frame.data.len() != frame.expected_len() {
            return Err(Error::frame_write(format!(
                "frame {} buffer has {} bytes, expected {} for {}x{}",
                frame.index,
                frame.data.len(),
                frame.expected_len(),
                frame.width,
                frame.height
            )));
        }
        let rgb = to_rgb24(frame.layout, frame.data);
        let image = RgbImage::from_raw(frame.width, frame.height, rgb)
            .ok_or_else(|| Error::frame_write(format!("frame {} is empty", frame.index)))?;
        self.fit(image)
    }

    /// 已是RGB图像时只做缩放
    pub fn fit(&mut self, image: RgbImage) -> Result<RgbImage> {
        let (w, h) = image.dimensions();
        if w == self.target.width && h == self.target.height {
            return Ok(image);
        }
        if w == 0 || h == 0 {
            return Err(Error::frame_write("cannot resize an empty frame"));
        }

        let src = fr::images::Image::from_vec_u8(w, h, image.into_raw(), fr::PixelType::U8x3)
            .map_err(|e| Error::frame_write(format!("source buffer: {e}")))?;
        let mut dst = fr::images::Image::new(
            self.target.width,
            self.target.height,
            fr::PixelType::U8x3,
        );
        self.resizer
            .resize(
                &src,
                &mut dst,
                &fr::ResizeOptions::new()
                    .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
            )
            .map_err(|e| Error::frame_write(format!("resize: {e}")))?;

        RgbImage::from_raw(self.target.width, self.target.height, dst.into_vec())
            .ok_or_else(|| Error::frame_write("resized buffer has the wrong size"))
    }
}

fn to_rgb24(layout: PixelLayout, data: Vec<u8>) -> Vec<u8> {
    match layout {
        PixelLayout::Rgb24 => data,
        PixelLayout::Rgba32 => {
            let mut rgb = Vec::with_capacity(data.len() / 4 * 3);
            for chunk in data.chunks_exact(4) {
                rgb.extend_from_slice(&chunk[..3]); // 丢弃 Alpha
            }
            rgb
        }
        PixelLayout::Gray8 => {
            let mut rgb = Vec::with_capacity(data.len() * 3);
            for &v in &data {
                rgb.extend_from_slice(&[v, v, v]);
            }
            rgb
        }
    }
}
