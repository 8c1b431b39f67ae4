#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod annotate; // 画面标注与违章截图
pub mod config; // 运行配置参数
pub mod detection; // 检测输入 (外部跟踪器输出)
pub mod error; // 错误类型与原因码
pub mod input; // 视频输入系统
pub mod output; // 视频输出系统
pub mod pipeline; // 运行驱动
pub mod progress; // 进度与ETA
pub mod violation; // 闯红灯判定核心

pub use crate::annotate::{crop_violation, Annotator, OverlayAnnotator};
pub use crate::config::{Resolution, RunConfig};
pub use crate::detection::{BBox, ClassLabel, Detection, DetectionSource, JsonLinesDetections};
pub use crate::error::{Error, Result};
pub use crate::input::FrameSource;
pub use crate::output::{EncoderSession, FinalizedVideo, VideoBackend, VideoFrame};
pub use crate::pipeline::{CancelToken, RunReport, RunStatus, ViolationRun};
pub use crate::progress::ProgressSample;
pub use crate::violation::{TrackState, ViolationEngine, ViolationEvent};

/// 当前本地时间字符串, 各字段之间用 `delimiter` 分隔
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}
