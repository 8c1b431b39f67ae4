/// 检测输入 (Detection Input)
///
/// 检测/跟踪模型属于外部协作者,这里只定义其输出格式
/// - types:  检测框、类别、逐帧检测
/// - source: 按帧号提供检测结果 (JSON Lines / 闭包)
pub mod source;
pub mod types;

pub use source::{filter_detections, DetectionSource, JsonLinesDetections};
pub use types::{BBox, ClassLabel, Detection, FrameDetections, TrackId};
