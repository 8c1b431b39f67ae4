//! 处理速度与剩余时间估计 (Progress estimator)

use serde::Serialize;
use std::time::Instant;

/// 一次进度采样
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ProgressSample {
    pub frames_done: u64,
    pub frames_total: Option<u64>,
    /// 耗时为0时未定义
    pub speed_fps: Option<f64>,
    /// 速度未定义或总帧数未知时未定义
    pub eta_seconds: Option<f64>,
}

impl ProgressSample {
    /// 完成百分比 (总帧数未知时为None)
    pub fn percent(&self) -> Option<f64> {
        match self.frames_total {
            Some(total) if total > 0 => {
                Some((self.frames_done as f64 / total as f64 * 100.0).min(100.0))
            }
            _ => None,
        }
    }
}

/// 纯计算: 吞吐量与ETA
pub fn sample(frames_done: u64, frames_total: Option<u64>, elapsed_seconds: f64) -> ProgressSample {
    let speed_fps = if elapsed_seconds > 0.0 {
        Some(frames_done as f64 / elapsed_seconds)
    } else {
        None
    };
    let eta_seconds = match (speed_fps, frames_total) {
        (Some(speed), Some(total)) if speed > 0.0 => {
            Some(total.saturating_sub(frames_done) as f64 / speed)
        }
        _ => None,
    };
    ProgressSample {
        frames_done,
        frames_total,
        speed_fps,
        eta_seconds,
    }
}

/// 按固定帧间隔采样的进度计时器
#[derive(Debug)]
pub struct ProgressClock {
    started: Instant,
    every: u64,
    next_at: u64,
    frames_total: Option<u64>,
}

impl ProgressClock {
    pub fn new(every: u64, frames_total: Option<u64>) -> Self {
        Self {
            started: Instant::now(),
            every: every.max(1),
            next_at: every.max(1),
            frames_total,
        }
    }

    /// 越过下一个采样点时返回一次采样 (跳帧时调用序列可能不连续)
    pub fn tick(&mut self, frames_done: u64) -> Option<ProgressSample> {
        if frames_done < self.next_at {
            return None;
        }
        self.next_at = (frames_done / self.every + 1) * self.every;
        Some(self.now(frames_done))
    }

    /// 立即采样
    pub fn now(&self, frames_done: u64) -> ProgressSample {
        sample(
            frames_done,
            self.frames_total,
            self.started.elapsed().as_secs_f64(),
        )
    }
}

/// 形如 `01:05` / `1:02:03` 的时长
pub fn format_eta(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, total % 3600 / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_and_eta() {
        let s = sample(50, Some(200), 10.0);
        assert_eq!(s.speed_fps, Some(5.0));
        assert_eq!(s.eta_seconds, Some(30.0));
        assert_eq!(s.percent(), Some(25.0));
    }

    #[test]
    fn zero_elapsed_leaves_speed_undefined() {
        let s = sample(10, Some(100), 0.0);
        assert_eq!(s.speed_fps, None);
        assert_eq!(s.eta_seconds, None);
    }

    #[test]
    fn zero_speed_or_unknown_total_leaves_eta_undefined() {
        assert_eq!(sample(0, Some(100), 3.0).eta_seconds, None);
        let s = sample(30, None, 3.0);
        assert_eq!(s.speed_fps, Some(10.0));
        assert_eq!(s.eta_seconds, None);
        assert_eq!(s.percent(), None);
    }

    #[test]
    fn clock_samples_on_cadence() {
        let mut clock = ProgressClock::new(30, Some(300));
        assert!(clock.tick(0).is_none());
        assert!(clock.tick(29).is_none());
        assert!(clock.tick(30).is_some());
        assert!(clock.tick(31).is_none());
        // 跳过了 60 也会在下一次调用时采样
        let s = clock.tick(61).unwrap();
        assert_eq!(s.frames_done, 61);
        assert_eq!(s.frames_total, Some(300));
        assert!(clock.tick(89).is_none());
        assert!(clock.tick(90).is_some());
    }

    #[test]
    fn eta_formatting() {
        assert_eq!(format_eta(65.0), "01:05");
        assert_eq!(format_eta(3723.4), "1:02:03");
    }
}
