//! 越线判定 (Line-crossing classifier)

use super::registry::{Track, TrackState};
use super::timeline::FrameContext;

/// 单帧判定结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Crossing {
    /// 未越线 (或无需判定)
    None,
    /// 越线但非红灯,属正常通行
    Legal,
    /// 红灯越线
    Violation,
}

/// 从上方接近并到达/越过停止线: `y_prev < line_y <= y_cur`
///
/// 半开区间保证连续两帧恰好压线时不会重复触发
pub fn crosses_line(y_prev: f32, y_cur: f32, line_y: f32) -> bool {
    y_prev < line_y && line_y <= y_cur
}

/// 判定一条轨迹在当前帧是否构成违章
pub fn classify(track: &Track, ctx: &FrameContext) -> Crossing {
    if track.state != TrackState::Tracking || track.violation_frame.is_some() {
        return Crossing::None;
    }
    // 本帧未出现的轨迹不判定
    if track.last_seen_frame != ctx.frame_index {
        return Crossing::None;
    }
    let Some(y_prev) = track.prev_reference_y else {
        return Crossing::None;
    };
    if !crosses_line(y_prev, track.reference_y, ctx.line_y) {
        return Crossing::None;
    }
    if ctx.red_light_active {
        Crossing::Violation
    } else {
        Crossing::Legal
    }
}
