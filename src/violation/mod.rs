/// 闯红灯判定核心 (Violation core)
///
/// 每帧流程: 时间轴 → 登记表更新 → 越线判定 → 记录违章 + 开始闪烁 → 叠加层快照 → 闪烁递减
/// - timeline: 帧号 → 时间戳/红灯状态
/// - registry: 轨迹状态记录
/// - crossing: 越线判定
/// - recorder: 违章事件
/// - flash:    闪烁窗口
pub mod crossing;
pub mod flash;
pub mod recorder;
pub mod registry;
pub mod timeline;

pub use crossing::{classify, crosses_line, Crossing};
pub use flash::FlashScheduler;
pub use recorder::{ViolationEvent, ViolationRecorder};
pub use registry::{Track, TrackRegistry, TrackState};
pub use timeline::{FrameContext, FrameTimeline};

use std::collections::HashSet;

use crate::config::RunConfig;
use crate::detection::{BBox, ClassLabel, Detection, TrackId};

/// 叠加层中的一条轨迹 (供标注层使用)
#[derive(Clone, Debug, PartialEq)]
pub struct TrackOverlay {
    pub id: TrackId,
    pub class: ClassLabel,
    pub bbox: BBox,
    pub flashing: bool,
    pub violated: bool,
    /// 违章后经过的观测帧数 (用于闪烁节奏)
    pub flash_elapsed: u32,
}

/// 单帧叠加层快照
#[derive(Clone, Debug, PartialEq)]
pub struct FrameOverlay {
    pub ctx: FrameContext,
    pub tracks: Vec<TrackOverlay>,
    pub violations_total: usize,
}

/// 单帧处理结果
#[derive(Clone, Debug)]
pub struct FrameOutcome {
    pub overlay: FrameOverlay,
    /// 本帧新产生的违章
    pub violations: Vec<ViolationEvent>,
    pub legal_crossings: usize,
}

/// 运行级判定引擎: 持有登记表、记录器与闪烁调度
#[derive(Debug)]
pub struct ViolationEngine {
    timeline: FrameTimeline,
    registry: TrackRegistry,
    recorder: ViolationRecorder,
    flash: FlashScheduler,
    flash_duration: u32,
    reference_offset: f32,
}

impl ViolationEngine {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            timeline: FrameTimeline::new(
                config.frame_rate,
                config.red_light_start_time,
                config.line_y,
            ),
            registry: TrackRegistry::new(),
            recorder: ViolationRecorder::new(),
            flash: FlashScheduler::new(config.flash_duration_frames),
            flash_duration: config.flash_duration_frames,
            reference_offset: config.reference_offset,
        }
    }

    /// 处理一帧检测结果 (帧号为源视频帧号)
    pub fn process_frame(&mut self, frame_index: u64, detections: &[Detection]) -> FrameOutcome {
        let ctx = self.timeline.advance(frame_index);

        for det in detections {
            self.registry.observe(det, frame_index, self.reference_offset);
        }

        // 每条轨迹每帧只判定一次
        let mut seen = HashSet::new();
        let ids: Vec<TrackId> = detections
            .iter()
            .map(|d| d.track_id)
            .filter(|id| seen.insert(*id))
            .collect();

        let mut violations = Vec::new();
        let mut legal_crossings = 0;
        for id in ids {
            let Some(track) = self.registry.get_mut(id) else {
                continue;
            };
            match classify(track, &ctx) {
                Crossing::Violation => {
                    self.flash.start(track, frame_index);
                    let event = self.recorder.record(track, &ctx);
                    log::info!(
                        "🚨 违章: 车辆 {} ({}) 帧 {} 时间 {:.2}s",
                        event.track_id,
                        event.class.name(),
                        event.frame_index,
                        event.timestamp
                    );
                    violations.push(event);
                }
                Crossing::Legal => {
                    legal_crossings += 1;
                    log::debug!("车辆 {} 在绿灯期间越线 (帧 {})", id, frame_index);
                }
                Crossing::None => {}
            }
        }

        let overlay = self.snapshot(ctx);
        self.flash.end_frame(&mut self.registry, frame_index);

        FrameOutcome {
            overlay,
            violations,
            legal_crossings,
        }
    }

    fn snapshot(&self, ctx: FrameContext) -> FrameOverlay {
        let tracks = self
            .registry
            .observed_at(ctx.frame_index)
            .map(|t| TrackOverlay {
                id: t.id,
                class: t.class,
                bbox: t.bbox,
                flashing: FlashScheduler::is_flashing(t),
                violated: t.state.has_violated(),
                flash_elapsed: t
                    .flash_remaining
                    .map(|n| self.flash_duration.saturating_sub(n))
                    .unwrap_or(0),
            })
            .collect();
        FrameOverlay {
            ctx,
            tracks,
            violations_total: self.recorder.len(),
        }
    }

    /// 帧结束后的闪烁状态: 即该轨迹下一次被观测时是否仍闪烁。
    /// 当前帧的显示状态以 `FrameOverlay` 为准 (窗口最后一帧两者不同)。
    pub fn is_flashing(&self, id: TrackId) -> bool {
        self.registry
            .get(id)
            .map(FlashScheduler::is_flashing)
            .unwrap_or(false)
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    pub fn events(&self) -> &[ViolationEvent] {
        self.recorder.events()
    }

    pub fn into_events(self) -> Vec<ViolationEvent> {
        self.recorder.into_events()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolution;

    fn engine(flash: u32) -> ViolationEngine {
        let config = RunConfig::new(
            25.0,
            12.0,
            310.0,
            flash,
            Resolution::new(640, 480),
            vec!["mp4v".into()],
        );
        ViolationEngine::new(&config)
    }

    fn car(id: TrackId, bottom: f32) -> Detection {
        Detection::new(id, ClassLabel::Car, BBox::new(100.0, bottom - 60.0, 80.0, 60.0), 0.9)
    }

    #[test]
    fn concrete_red_light_scenario() {
        let mut engine = engine(10);
        let out = engine.process_frame(299, &[car(7, 300.0)]);
        assert!(out.violations.is_empty());
        assert!(!out.overlay.ctx.red_light_active);

        let out = engine.process_frame(301, &[car(7, 315.0)]);
        assert_eq!(out.violations.len(), 1);
        let event = &out.violations[0];
        assert_eq!(event.track_id, 7);
        assert_eq!(event.frame_index, 301);
        assert!((event.timestamp - 12.04).abs() < 1e-9);
        assert_eq!(event.bbox, car(7, 315.0).bbox);
        assert!(out.overlay.tracks[0].flashing);
        assert_eq!(engine.events().len(), 1);
    }

    #[test]
    fn oscillation_yields_a_single_event() {
        let mut engine = engine(2);
        let positions = [300.0, 315.0, 300.0, 320.0, 305.0, 330.0, 309.0, 310.0];
        let mut total = 0;
        for (i, y) in positions.iter().enumerate() {
            total += engine.process_frame(400 + i as u64, &[car(3, *y)]).violations.len();
        }
        assert_eq!(total, 1);
        assert_eq!(engine.registry().get(3).map(|t| t.state), Some(TrackState::Settled));
    }

    #[test]
    fn green_crossing_needs_fresh_approach_once_red() {
        let mut engine = engine(5);
        // 绿灯期间越线
        let out = engine.process_frame(100, &[car(1, 300.0)]);
        assert_eq!(out.legal_crossings, 0);
        let out = engine.process_frame(101, &[car(1, 320.0)]);
        assert_eq!(out.legal_crossings, 1);

        // 红灯后仍在线下: 没有新的接近过程
        assert!(engine.process_frame(350, &[car(1, 330.0)]).violations.is_empty());
        assert!(engine.process_frame(351, &[car(1, 340.0)]).violations.is_empty());

        // 退回线上再越线
        assert!(engine.process_frame(352, &[car(1, 305.0)]).violations.is_empty());
        assert_eq!(engine.process_frame(353, &[car(1, 312.0)]).violations.len(), 1);
    }

    #[test]
    fn flash_lasts_for_configured_observed_frames() {
        let mut engine = engine(3);
        engine.process_frame(400, &[car(5, 300.0)]);
        let out = engine.process_frame(401, &[car(5, 311.0)]);
        assert!(out.overlay.tracks[0].flashing);

        // 消失的帧不计数
        engine.process_frame(402, &[]);
        engine.process_frame(403, &[]);

        let mut flags = Vec::new();
        for frame in 404..410 {
            let out = engine.process_frame(frame, &[car(5, 330.0)]);
            flags.push(out.overlay.tracks[0].flashing);
        }
        assert_eq!(flags, vec![true, true, true, false, false, false]);
        assert!(!engine.is_flashing(5));
        assert!(engine.registry().get(5).map(|t| t.state.has_violated()).unwrap_or(false));
    }

    #[test]
    fn duplicate_detection_in_one_frame_is_classified_once() {
        let mut engine = engine(3);
        engine.process_frame(400, &[car(8, 300.0)]);
        let out = engine.process_frame(401, &[car(8, 312.0), car(8, 314.0)]);
        assert_eq!(out.violations.len(), 1);
        assert_eq!(out.overlay.tracks.len(), 1);
    }

    #[test]
    fn flashing_query_reports_post_frame_state() {
        let mut engine = engine(1);
        engine.process_frame(400, &[car(4, 300.0)]);
        let out = engine.process_frame(401, &[car(4, 312.0)]);
        assert!(out.overlay.tracks[0].flashing);
        assert!(engine.is_flashing(4));

        // 窗口最后一帧: 本帧画面仍闪烁, 帧结束后不再闪烁
        let out = engine.process_frame(402, &[car(4, 320.0)]);
        assert!(out.overlay.tracks[0].flashing);
        assert!(!engine.is_flashing(4));
        assert_eq!(engine.registry().get(4).map(|t| t.state), Some(TrackState::Settled));
    }

    #[test]
    fn same_frame_violations_keep_detection_order() {
        let mut engine = engine(3);
        engine.process_frame(400, &[car(9, 300.0), car(2, 300.0)]);
        let out = engine.process_frame(401, &[car(9, 312.0), car(2, 312.0)]);
        let ids: Vec<TrackId> = out.violations.iter().map(|e| e.track_id).collect();
        assert_eq!(ids, vec![9, 2]);
        assert_eq!(engine.events()[0].track_id, 9);
    }
}
