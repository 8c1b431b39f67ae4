//! 违章闪烁调度 (Flash scheduler)
//!
//! 计数器只在轨迹被观测到的帧递减,轨迹消失期间保持不变。

use std::collections::BTreeSet;

use super::registry::{Track, TrackRegistry, TrackState};
use crate::detection::TrackId;

#[derive(Debug)]
pub struct FlashScheduler {
    duration: u32,
    /// 仍在闪烁窗口内的轨迹
    active: BTreeSet<TrackId>,
}

impl FlashScheduler {
    pub fn new(duration: u32) -> Self {
        Self {
            duration,
            active: BTreeSet::new(),
        }
    }

    /// 违章发生: 进入 Violated 并开始倒计时
    pub fn start(&mut self, track: &mut Track, frame_index: u64) {
        track.state = TrackState::Violated;
        track.violation_frame = Some(frame_index);
        track.flash_remaining = Some(self.duration);
        self.active.insert(track.id);
    }

    pub fn is_flashing(track: &Track) -> bool {
        track.state == TrackState::Violated && track.flash_remaining.is_some_and(|n| n > 0)
    }

    /// 帧结束时递减本帧出现过的闪烁轨迹 (违章当帧不递减)
    ///
    /// 返回本帧转为 Settled 的轨迹
    pub fn end_frame(&mut self, registry: &mut TrackRegistry, frame_index: u64) -> Vec<TrackId> {
        let mut settled = Vec::new();
        for &id in &self.active {
            let Some(track) = registry.get_mut(id) else {
                continue;
            };
            if !track.seen_at(frame_index) || track.violation_frame == Some(frame_index) {
                continue;
            }
            let remaining = track.flash_remaining.unwrap_or(0).saturating_sub(1);
            track.flash_remaining = Some(remaining);
            if remaining == 0 {
                track.state = TrackState::Settled;
                settled.push(id);
            }
        }
        for id in &settled {
            self.active.remove(id);
        }
        settled
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BBox, ClassLabel, Detection};

    fn observe(registry: &mut TrackRegistry, frame: u64) {
        let det = Detection::new(1, ClassLabel::Car, BBox::new(0.0, 0.0, 10.0, 10.0), 1.0);
        registry.observe(&det, frame, 0.0);
    }

    fn flashing(registry: &TrackRegistry) -> bool {
        registry.get(1).map(FlashScheduler::is_flashing).unwrap_or(false)
    }

    #[test]
    fn flashes_for_violation_frame_plus_duration() {
        let mut registry = TrackRegistry::new();
        let mut flash = FlashScheduler::new(3);

        observe(&mut registry, 10);
        if let Some(t) = registry.get_mut(1) {
            flash.start(t, 10);
        }
        assert!(flashing(&registry));
        flash.end_frame(&mut registry, 10);

        for frame in 11..=13 {
            observe(&mut registry, frame);
            assert!(flashing(&registry), "frame {frame}");
            flash.end_frame(&mut registry, frame);
        }

        observe(&mut registry, 14);
        assert!(!flashing(&registry));
        assert_eq!(registry.get(1).map(|t| t.state), Some(TrackState::Settled));
        assert_eq!(flash.active_count(), 0);
    }

    #[test]
    fn absence_pauses_the_countdown() {
        let mut registry = TrackRegistry::new();
        let mut flash = FlashScheduler::new(2);

        observe(&mut registry, 0);
        if let Some(t) = registry.get_mut(1) {
            flash.start(t, 0);
        }
        flash.end_frame(&mut registry, 0);

        observe(&mut registry, 1);
        flash.end_frame(&mut registry, 1);
        assert_eq!(registry.get(1).and_then(|t| t.flash_remaining), Some(1));

        // 轨迹在 2..=20 帧消失
        for frame in 2..=20 {
            flash.end_frame(&mut registry, frame);
        }
        assert_eq!(registry.get(1).and_then(|t| t.flash_remaining), Some(1));

        observe(&mut registry, 21);
        assert!(flashing(&registry));
        let settled = flash.end_frame(&mut registry, 21);
        assert_eq!(settled, vec![1]);
    }
}
