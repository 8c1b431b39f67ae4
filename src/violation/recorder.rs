//! 违章记录 (Violation recorder)

use serde::{Deserialize, Serialize};

use super::registry::Track;
use super::timeline::FrameContext;
use crate::detection::{BBox, ClassLabel, TrackId};

/// 违章事件 (创建后不可变)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub track_id: TrackId,
    pub class: ClassLabel,
    pub frame_index: u64,
    pub timestamp: f64,
    /// 越线时刻的检测框
    pub bbox: BBox,
}

impl ViolationEvent {
    /// 截图文件名 `vehicle_{id}_{timestamp}.jpg`
    pub fn crop_file_name(&self) -> String {
        format!("vehicle_{}_{:.2}.jpg", self.track_id, self.timestamp)
    }
}

/// 按检测顺序累积本次运行的违章事件
#[derive(Debug, Default)]
pub struct ViolationRecorder {
    events: Vec<ViolationEvent>,
}

impl ViolationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, track: &Track, ctx: &FrameContext) -> ViolationEvent {
        let event = ViolationEvent {
            track_id: track.id,
            class: track.class,
            frame_index: ctx.frame_index,
            timestamp: ctx.timestamp,
            bbox: track.bbox,
        };
        self.events.push(event.clone());
        event
    }

    pub fn events(&self) -> &[ViolationEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<ViolationEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Detection;
    use crate::violation::registry::TrackRegistry;

    #[test]
    fn events_keep_detection_order() {
        let mut registry = TrackRegistry::new();
        let mut recorder = ViolationRecorder::new();
        for (id, frame) in [(9, 40u64), (2, 41)] {
            let det = Detection::new(id, ClassLabel::Bus, BBox::new(0.0, 0.0, 5.0, 5.0), 1.0);
            let track = registry.observe(&det, frame, 0.0).clone();
            let ctx = FrameContext {
                frame_index: frame,
                timestamp: frame as f64 / 10.0,
                red_light_active: true,
                line_y: 3.0,
            };
            recorder.record(&track, &ctx);
        }
        let ids: Vec<_> = recorder.events().iter().map(|e| e.track_id).collect();
        assert_eq!(ids, vec![9, 2]);
        assert_eq!(recorder.events()[1].timestamp, 4.1);
    }

    #[test]
    fn crop_name_uses_id_and_timestamp() {
        let event = ViolationEvent {
            track_id: 7,
            class: ClassLabel::Car,
            frame_index: 301,
            timestamp: 12.04,
            bbox: BBox::default(),
        };
        assert_eq!(event.crop_file_name(), "vehicle_7_12.04.jpg");
    }
}
