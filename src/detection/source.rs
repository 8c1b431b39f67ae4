//! 检测来源 (Detection source)
//! 外部检测/跟踪模型的输出,按帧号查询

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::types::{Detection, FrameDetections};
use crate::error::Result;

/// 逐帧检测结果提供者
pub trait DetectionSource {
    /// 返回指定源帧的检测 (无检测时返回空)
    fn detections_for(&mut self, frame_index: u64) -> Result<Vec<Detection>>;
}

/// JSON Lines 检测文件: 每行一个 `FrameDetections`
#[derive(Debug, Default, Clone)]
pub struct JsonLinesDetections {
    frames: BTreeMap<u64, Vec<Detection>>,
}

impl JsonLinesDetections {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let source = Self::from_reader(BufReader::new(file))?;
        log::info!(
            "✅ 检测结果已从 {} 加载 ({} 帧)",
            path.as_ref().display(),
            source.frames.len()
        );
        Ok(source)
    }

    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut frames: BTreeMap<u64, Vec<Detection>> = BTreeMap::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let frame: FrameDetections = serde_json::from_str(line)?;
            // 同一帧出现多行时合并
            frames
                .entry(frame.frame_index)
                .or_default()
                .extend(frame.detections);
        }
        Ok(Self { frames })
    }

    pub fn from_frames(frames: impl IntoIterator<Item = FrameDetections>) -> Self {
        let mut map: BTreeMap<u64, Vec<Detection>> = BTreeMap::new();
        for frame in frames {
            map.entry(frame.frame_index)
                .or_default()
                .extend(frame.detections);
        }
        Self { frames: map }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn last_frame(&self) -> Option<u64> {
        self.frames.keys().next_back().copied()
    }
}

impl DetectionSource for JsonLinesDetections {
    fn detections_for(&mut self, frame_index: u64) -> Result<Vec<Detection>> {
        // 每帧只查询一次,取出后释放内存
        Ok(self.frames.remove(&frame_index).unwrap_or_default())
    }
}

impl<F> DetectionSource for F
where
    F: FnMut(u64) -> Result<Vec<Detection>>,
{
    fn detections_for(&mut self, frame_index: u64) -> Result<Vec<Detection>> {
        self(frame_index)
    }
}

/// 过滤低置信度与非目标类别的检测
pub fn filter_detections(
    detections: Vec<Detection>,
    confidence_threshold: f32,
    classes: &[super::ClassLabel],
) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.confidence >= confidence_threshold)
        .filter(|d| classes.is_empty() || classes.contains(&d.class))
        .collect()
}
