//! 帧时间轴 (Frame timeline)
//! 帧号 → 时间戳 + 红灯状态

/// 单帧上下文 (每帧重建, 不持久化)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameContext {
    pub frame_index: u64,
    pub timestamp: f64, // 秒
    pub red_light_active: bool,
    pub line_y: f32,
}

/// 帧时间轴
///
/// 帧率在配置阶段已校验为正数,这里不再检查
#[derive(Clone, Copy, Debug)]
pub struct FrameTimeline {
    frame_rate: f64,
    red_light_start_time: f64,
    line_y: f32,
}

impl FrameTimeline {
    pub fn new(frame_rate: f64, red_light_start_time: f64, line_y: f32) -> Self {
        Self {
            frame_rate,
            red_light_start_time,
            line_y,
        }
    }

    /// 计算指定源帧的上下文
    pub fn advance(&self, frame_index: u64) -> FrameContext {
        let timestamp = frame_index as f64 / self.frame_rate;
        FrameContext {
            frame_index,
            timestamp,
            // 红灯开始时刻本身不算红灯
            red_light_active: timestamp > self.red_light_start_time,
            line_y: self.line_y,
        }
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_follows_frame_rate() {
        let timeline = FrameTimeline::new(25.0, 12.0, 310.0);
        let ctx = timeline.advance(301);
        assert!((ctx.timestamp - 12.04).abs() < 1e-9);
        assert!(ctx.red_light_active);
        assert_eq!(ctx.line_y, 310.0);

        let before = timeline.advance(299);
        assert!((before.timestamp - 11.96).abs() < 1e-9);
        assert!(!before.red_light_active);
    }

    #[test]
    fn red_light_boundary_is_exclusive() {
        let timeline = FrameTimeline::new(25.0, 12.0, 310.0);
        // 300 / 25 == 12.0 exactly
        assert!(!timeline.advance(300).red_light_active);
        assert!(timeline.advance(301).red_light_active);
    }

    #[test]
    fn zero_start_means_red_after_first_frame() {
        let timeline = FrameTimeline::new(30.0, 0.0, 100.0);
        assert!(!timeline.advance(0).red_light_active);
        assert!(timeline.advance(1).red_light_active);
    }
}
