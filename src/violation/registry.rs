//! 轨迹登记表 (Track registry)
//!
//! 每个外部跟踪ID对应一条状态记录,运行期间从不删除。

use std::collections::BTreeMap;

use crate::detection::{BBox, ClassLabel, Detection, TrackId};

/// 轨迹违章状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackState {
    /// 尚未违章,每帧参与越线判定
    Tracking,
    /// 已违章,闪烁倒计时中
    Violated,
    /// 闪烁结束,仍记为违章但不再判定、不再闪烁
    Settled,
}

impl TrackState {
    pub fn has_violated(&self) -> bool {
        !matches!(self, TrackState::Tracking)
    }
}

/// 单条轨迹记录
#[derive(Clone, Debug)]
pub struct Track {
    pub id: TrackId,
    pub class: ClassLabel,

    /// 最近一次的检测框
    pub bbox: BBox,

    /// 当前参考点Y (底边 - 偏移)
    pub reference_y: f32,

    /// 上一次出现时的参考点Y (首帧为None)
    pub prev_reference_y: Option<f32>,

    pub state: TrackState,
    pub violation_frame: Option<u64>,

    /// 剩余闪烁帧数 (仅在违章后有值)
    pub flash_remaining: Option<u32>,

    pub first_seen_frame: u64,
    pub last_seen_frame: u64,
    pub frames_seen: u64,
}

impl Track {
    fn new(det: &Detection, frame_index: u64, reference_y: f32) -> Self {
        Self {
            id: det.track_id,
            class: det.class,
            bbox: det.bbox,
            reference_y,
            prev_reference_y: None,
            state: TrackState::Tracking,
            violation_frame: None,
            flash_remaining: None,
            first_seen_frame: frame_index,
            last_seen_frame: frame_index,
            frames_seen: 1,
        }
    }

    /// 是否在指定帧被观测到
    pub fn seen_at(&self, frame_index: u64) -> bool {
        self.last_seen_frame == frame_index
    }
}

/// 轨迹登记表
#[derive(Debug, Default)]
pub struct TrackRegistry {
    tracks: BTreeMap<TrackId, Track>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用一条检测更新轨迹,返回更新后的记录
    ///
    /// 同一帧内重复出现的ID只覆盖当前样本,不移动上一帧位置
    pub fn observe(&mut self, det: &Detection, frame_index: u64, reference_offset: f32) -> &Track {
        let reference_y = det.bbox.bottom() - reference_offset;
        self.tracks
            .entry(det.track_id)
            .and_modify(|t| {
                if t.last_seen_frame != frame_index {
                    t.prev_reference_y = Some(t.reference_y);
                    t.last_seen_frame = frame_index;
                    t.frames_seen += 1;
                }
                t.class = det.class;
                t.bbox = det.bbox;
                t.reference_y = reference_y;
            })
            .or_insert_with(|| Track::new(det, frame_index, reference_y))
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(&id)
    }

    /// 按ID顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    /// 指定帧中被观测到的轨迹
    pub fn observed_at(&self, frame_index: u64) -> impl Iterator<Item = &Track> {
        self.tracks.values().filter(move |t| t.seen_at(frame_index))
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(id: TrackId, bottom: f32) -> Detection {
        Detection::new(id, ClassLabel::Car, BBox::new(10.0, bottom - 40.0, 30.0, 40.0), 0.9)
    }

    #[test]
    fn first_sighting_has_no_previous_sample() {
        let mut registry = TrackRegistry::new();
        let track = registry.observe(&det(7, 300.0), 299, 0.0);
        assert_eq!(track.prev_reference_y, None);
        assert_eq!(track.reference_y, 300.0);
        assert_eq!(track.state, TrackState::Tracking);
    }

    #[test]
    fn later_sighting_shifts_previous_sample() {
        let mut registry = TrackRegistry::new();
        registry.observe(&det(7, 300.0), 299, 0.0);
        let track = registry.observe(&det(7, 315.0), 301, 0.0);
        assert_eq!(track.prev_reference_y, Some(300.0));
        assert_eq!(track.reference_y, 315.0);
        assert_eq!(track.frames_seen, 2);
        assert_eq!(track.first_seen_frame, 299);
    }

    #[test]
    fn duplicate_id_in_same_frame_overwrites_current_sample() {
        let mut registry = TrackRegistry::new();
        registry.observe(&det(1, 100.0), 0, 0.0);
        registry.observe(&det(1, 200.0), 1, 0.0);
        let track = registry.observe(&det(1, 210.0), 1, 0.0);
        assert_eq!(track.prev_reference_y, Some(100.0));
        assert_eq!(track.reference_y, 210.0);
        assert_eq!(track.frames_seen, 2);
    }

    #[test]
    fn reference_offset_raises_the_reference_point() {
        let mut registry = TrackRegistry::new();
        let track = registry.observe(&det(3, 300.0), 0, 20.0);
        assert_eq!(track.reference_y, 280.0);
    }

    #[test]
    fn observed_at_lists_only_current_frame() {
        let mut registry = TrackRegistry::new();
        registry.observe(&det(1, 100.0), 0, 0.0);
        registry.observe(&det(2, 100.0), 1, 0.0);
        let ids: Vec<_> = registry.observed_at(1).map(|t| t.id).collect();
        assert_eq!(ids, vec![2]);
        assert_eq!(registry.len(), 2);
    }
}
