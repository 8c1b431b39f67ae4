/// 检测数据结构定义
/// Data structures for per-frame detections emitted by an external tracker
use serde::{Deserialize, Serialize};

/// 外部跟踪器分配的持久ID
pub type TrackId = u32;

// ========== 枚举类型 ==========

/// 目标类别 (COCO 子集)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassLabel {
    Person,
    Bicycle,
    Car,
    Motorcycle,
    Bus,
    Truck,
    Other,
}

impl ClassLabel {
    /// COCO类别ID → 类别
    pub fn from_coco_id(id: u32) -> Self {
        match id {
            0 => ClassLabel::Person,
            1 => ClassLabel::Bicycle,
            2 => ClassLabel::Car,
            3 => ClassLabel::Motorcycle,
            5 => ClassLabel::Bus,
            7 => ClassLabel::Truck,
            _ => ClassLabel::Other,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClassLabel::Person => "person",
            ClassLabel::Bicycle => "bicycle",
            ClassLabel::Car => "car",
            ClassLabel::Motorcycle => "motorcycle",
            ClassLabel::Bus => "bus",
            ClassLabel::Truck => "truck",
            ClassLabel::Other => "other",
        }
    }
}

// ========== 数据结构 ==========

/// 检测框 (左上角 + 宽高, 像素坐标)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 由 (x1, y1, x2, y2) 构造
    pub fn from_xyxy(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1.min(x2),
            y: y1.min(y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// 底边中点 (越线判定的参考点)
    pub fn bottom_center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.bottom())
    }
}

/// 单个检测结果 (外部跟踪器输出)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub track_id: TrackId,
    #[serde(alias = "class_label")]
    pub class: ClassLabel,
    pub bbox: BBox,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

fn full_confidence() -> f32 {
    1.0
}

impl Detection {
    pub fn new(track_id: TrackId, class: ClassLabel, bbox: BBox, confidence: f32) -> Self {
        Self {
            track_id,
            class,
            bbox,
            confidence,
        }
    }
}

/// 一帧的全部检测 (JSON Lines 中的一行)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameDetections {
    pub frame_index: u64,
    #[serde(default)]
    pub detections: Vec<Detection>,
}
