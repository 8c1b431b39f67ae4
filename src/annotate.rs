//! 画面标注 (Annotation)
//!
//! 停止线、信号灯、统计条、跟踪框以及违章闪烁框,全部用 imageproc 绘制。

use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;

use crate::detection::BBox;
use crate::violation::{FrameOverlay, TrackOverlay};

// ========== 颜色 ==========

const RED: Rgb<u8> = Rgb([230, 30, 30]);
const GREEN: Rgb<u8> = Rgb([40, 200, 60]);
const PANEL: Rgb<u8> = Rgb([24, 24, 24]);
const DIM: Rgb<u8> = Rgb([70, 70, 70]);

/// 标注层接口 (在编码前修改合成帧)
pub trait Annotator {
    fn annotate(&mut self, image: &mut RgbImage, overlay: &FrameOverlay);
}

/// 默认叠加层
#[derive(Clone, Debug)]
pub struct OverlayAnnotator {
    /// 闪烁周期 (帧), 0 表示常亮
    pub blink_period: u32,
    pub box_thickness: u32,
    pub flash_thickness: u32,
}

impl Default for OverlayAnnotator {
    fn default() -> Self {
        Self {
            blink_period: 2,
            box_thickness: 2,
            flash_thickness: 5,
        }
    }
}

impl OverlayAnnotator {
    pub fn new(blink_period: u32) -> Self {
        Self {
            blink_period,
            ..Self::default()
        }
    }

    /// 闪烁窗口内当前帧是否点亮
    pub fn blink_on(&self, flash_elapsed: u32) -> bool {
        self.blink_period == 0 || (flash_elapsed / self.blink_period) % 2 == 0
    }

    fn draw_stop_line(&self, image: &mut RgbImage, overlay: &FrameOverlay) {
        let color = if overlay.ctx.red_light_active { RED } else { GREEN };
        let width = image.width() as f32;
        for dy in -1..=1 {
            let y = overlay.ctx.line_y + dy as f32;
            draw_line_segment_mut(image, (0.0, y), (width, y), color);
        }
    }

    /// 右上角信号灯
    fn draw_light(&self, image: &mut RgbImage, red: bool) {
        let (w, _) = image.dimensions();
        if w < 60 {
            return;
        }
        let x = w as i32 - 50;
        draw_filled_rect_mut(image, Rect::at(x, 10).of_size(40, 70), PANEL);
        let (top, bottom) = if red { (RED, DIM) } else { (DIM, GREEN) };
        draw_filled_circle_mut(image, (x + 20, 28), 12, top);
        draw_filled_circle_mut(image, (x + 20, 62), 12, bottom);
    }

    /// 左上角统计条: 每个违章一个红块, 每个在场目标一个灰块
    fn draw_stats(&self, image: &mut RgbImage, overlay: &FrameOverlay) {
        let (w, h) = image.dimensions();
        if w < 40 || h < 40 {
            return;
        }
        let slots = ((w / 2).saturating_sub(20) / 12).clamp(1, 40);
        draw_filled_rect_mut(image, Rect::at(10, 10).of_size(slots * 12 + 8, 36), PANEL);
        for (row, (count, color)) in [(overlay.violations_total, RED), (overlay.tracks.len(), DIM)]
            .into_iter()
            .enumerate()
        {
            for i in 0..(count as u32).min(slots) {
                let rect = Rect::at(14 + (i * 12) as i32, 14 + row as i32 * 16).of_size(10, 12);
                draw_filled_rect_mut(image, rect, color);
            }
        }
    }

    fn draw_track(&self, image: &mut RgbImage, track: &TrackOverlay) {
        let color = if track.violated {
            RED
        } else {
            let (r, g, b) = id_to_color(track.id);
            Rgb([r, g, b])
        };
        let thickness = if track.flashing && self.blink_on(track.flash_elapsed) {
            self.flash_thickness
        } else {
            self.box_thickness
        };
        for inset in 0..thickness {
            if let Some(rect) = clamp_rect(&track.bbox, inset as f32, image.dimensions()) {
                draw_hollow_rect_mut(image, rect, color);
            }
        }
        let (cx, cy) = track.bbox.bottom_center();
        draw_filled_circle_mut(image, (cx as i32, cy as i32), 3, color);
    }
}

impl Annotator for OverlayAnnotator {
    fn annotate(&mut self, image: &mut RgbImage, overlay: &FrameOverlay) {
        self.draw_stop_line(image, overlay);
        for track in &overlay.tracks {
            self.draw_track(image, track);
        }
        self.draw_light(image, overlay.ctx.red_light_active);
        self.draw_stats(image, overlay);
    }
}

/// 检测框 (外扩 `pad` 像素) 与画面求交, 空交集返回None
fn clamp_rect(bbox: &BBox, pad: f32, (w, h): (u32, u32)) -> Option<Rect> {
    let x1 = (bbox.x - pad).floor().max(0.0);
    let y1 = (bbox.y - pad).floor().max(0.0);
    let x2 = (bbox.right() + pad).ceil().min(w as f32);
    let y2 = (bbox.bottom() + pad).ceil().min(h as f32);
    if !(x2 - x1 >= 1.0 && y2 - y1 >= 1.0) {
        return None;
    }
    Some(Rect::at(x1 as i32, y1 as i32).of_size((x2 - x1) as u32, (y2 - y1) as u32))
}

/// 违章截图: 检测框外扩 `margin` 像素后裁剪 (超出画面部分截断)
pub fn crop_violation(image: &RgbImage, bbox: &BBox, margin: u32) -> Option<RgbImage> {
    let rect = clamp_rect(bbox, margin as f32, image.dimensions())?;
    Some(
        imageops::crop_imm(
            image,
            rect.left() as u32,
            rect.top() as u32,
            rect.width(),
            rect.height(),
        )
        .to_image(),
    )
}

/// 根据ID生成不同颜色
pub fn id_to_color(id: u32) -> (u8, u8, u8) {
    let hue = (id as f32 * 137.508) % 360.0; // 黄金角度采样
    hsv_to_rgb(hue, 0.8, 0.9)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match h {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}
