//! 运行驱动 (Run driver)
//!
//! 一次运行独占一个轨迹登记表和一个编码会话,不共享任何全局状态。
//! 顺序模式: 解码 → 判定 → 标注 → 编码, 单线程按帧号顺序执行。
//! 流水线模式: 生产线程 (解码 + 判定) 与当前线程 (标注 + 编码) 之间用有界通道衔接,
//! 队列满时阻塞生产端, 不丢帧。

use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Sender};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::annotate::Annotator;
use crate::config::RunConfig;
use crate::detection::{filter_detections, DetectionSource};
use crate::error::{Error, Result};
use crate::input::FrameSource;
use crate::output::{EncoderSession, EncoderSettings, FrameNormalizer, VideoBackend, VideoFrame};
use crate::progress::{format_eta, ProgressClock, ProgressSample};
use crate::violation::{FrameOutcome, ViolationEngine, ViolationEvent};

// ========== 取消信号 ==========

/// 外部取消信号, 在帧与帧之间检查
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ========== 运行报告 ==========

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// 正常完成
    Clean,
    /// 完成但有丢帧或输入提前结束
    DroppedFrames,
    /// 失败 (无可用输出)
    Failed,
}

/// 运行报告 (可序列化为JSON)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    /// 机器可读原因码
    pub reason: String,
    pub message: Option<String>,
    pub started_at: DateTime<Local>,
    pub frames_read: u64,
    pub frames_processed: u64,
    pub frames_written: u64,
    /// 编码阶段与解码阶段丢帧之和
    pub frames_dropped: u64,
    #[serde(default)]
    pub frames_dropped_at_decode: u64,
    /// 输入提前结束时的原因码
    #[serde(default)]
    pub input_error: Option<String>,
    pub codec_used: Option<String>,
    pub output_path: PathBuf,
    pub violations: Vec<ViolationEvent>,
    pub processing_seconds: f64,
    pub average_fps: Option<f64>,
    pub cancelled: bool,
}

impl RunReport {
    fn begin(output_path: &Path) -> Self {
        Self {
            run_id: crate::gen_time_string(""),
            status: RunStatus::Failed,
            reason: String::new(),
            message: None,
            started_at: Local::now(),
            frames_read: 0,
            frames_processed: 0,
            frames_written: 0,
            frames_dropped: 0,
            frames_dropped_at_decode: 0,
            input_error: None,
            codec_used: None,
            output_path: output_path.to_path_buf(),
            violations: Vec::new(),
            processing_seconds: 0.0,
            average_fps: None,
            cancelled: false,
        }
    }

    fn fail(mut self, err: &Error, started: Instant) -> Self {
        self.status = RunStatus::Failed;
        self.reason = err.reason_code().to_string();
        self.message = Some(err.to_string());
        self.processing_seconds = started.elapsed().as_secs_f64();
        self
    }

    pub fn is_success(&self) -> bool {
        self.status != RunStatus::Failed
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        log::info!("💾 运行报告已保存到 {}", path.as_ref().display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn log_summary(&self) {
        match self.status {
            RunStatus::Failed => log::error!(
                "❌ 运行失败 [{}]: {}",
                self.reason,
                self.message.as_deref().unwrap_or("")
            ),
            _ => log::info!(
                "✅ 运行完成 [{}]: 写入 {} 帧, 丢弃 {} 帧, 编码器 {}",
                self.reason,
                self.frames_written,
                self.frames_dropped,
                self.codec_used.as_deref().unwrap_or("-")
            ),
        }
        log::info!(
            "🚨 违章 {} 起 | 读取 {} 帧 | 处理 {} 帧 | 耗时 {:.1}s",
            self.violations.len(),
            self.frames_read,
            self.frames_processed,
            self.processing_seconds
        );
    }
}

// ========== 运行上下文 ==========

/// 输入阶段汇总
#[derive(Debug, Default)]
struct InputSummary {
    frames_read: u64,
    /// 来源内部丢弃的帧
    source_dropped: u64,
    error: Option<Error>,
    cancelled: bool,
}

/// 流水线中传递的一帧
struct Work {
    frame: VideoFrame,
    outcome: FrameOutcome,
    frames_read: u64,
}

/// 一次闯红灯检测运行 (调用方持有的运行上下文)
pub struct ViolationRun<'c> {
    config: RunConfig,
    annotator: Option<Box<dyn Annotator + 'c>>,
    on_progress: Option<Box<dyn FnMut(&ProgressSample) + 'c>>,
    on_violation: Option<Box<dyn FnMut(&ViolationEvent, &RgbImage) + 'c>>,
    cancel: CancelToken,
}

impl<'c> ViolationRun<'c> {
    /// 校验配置; 非法配置在处理任何帧之前报错
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        config.log_summary();
        Ok(Self {
            config,
            annotator: None,
            on_progress: None,
            on_violation: None,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_annotator(mut self, annotator: impl Annotator + 'c) -> Self {
        self.annotator = Some(Box::new(annotator));
        self
    }

    /// 进度回调, 按 `progress_every` 节奏调用 (也可用于让出控制权)
    pub fn on_progress(mut self, callback: impl FnMut(&ProgressSample) + 'c) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// 违章回调, 携带未标注的当前帧 (用于截图)
    pub fn on_violation(mut self, callback: impl FnMut(&ViolationEvent, &RgbImage) + 'c) -> Self {
        self.on_violation = Some(Box::new(callback));
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    fn encoder_settings(&self, output: &Path) -> EncoderSettings {
        EncoderSettings {
            path: output.to_path_buf(),
            resolution: self.config.output_resolution,
            fps: self.config.output_fps(),
            min_output_bytes: self.config.min_output_bytes,
        }
    }

    /// 单线程顺序运行
    pub fn run<S, D>(
        &mut self,
        source: &mut S,
        detections: &mut D,
        backend: &mut dyn VideoBackend,
        output: impl AsRef<Path>,
    ) -> RunReport
    where
        S: FrameSource + ?Sized,
        D: DetectionSource + ?Sized,
    {
        let output = output.as_ref();
        let started = Instant::now();
        let mut report = RunReport::begin(output);

        let mut session = EncoderSession::new(
            backend,
            self.encoder_settings(output),
            self.config.codec_candidates.clone(),
        );
        if let Err(e) = session.open() {
            return report.fail(&e, started);
        }

        let mut engine = ViolationEngine::new(&self.config);
        let mut normalizer = FrameNormalizer::new(self.config.output_resolution);
        let mut clock = ProgressClock::new(self.config.progress_every, source.total_frames());
        let mut input = InputSummary::default();

        loop {
            if self.cancel.is_cancelled() {
                log::warn!("🛑 收到取消信号, 停止读取");
                input.cancelled = true;
                break;
            }
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    log::error!("❌ 读取帧失败: {}", e);
                    input.error = Some(e);
                    break;
                }
            };
            input.frames_read += 1;

            if self.config.is_sampled(frame.index) {
                let outcome =
                    match classify_frame(&self.config, &mut engine, detections, frame.index) {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            log::error!("❌ 读取检测结果失败: {}", e);
                            input.error = Some(e);
                            break;
                        }
                    };
                self.emit(&mut session, &mut normalizer, frame, &outcome);
                report.frames_processed += 1;
            }
            self.tick(&mut clock, input.frames_read);
        }
        input.source_dropped = source.dropped_frames();

        finish(report, session, input, engine.into_events(), started)
    }

    /// 双线程流水线运行: 生产线程解码+判定, 当前线程标注+编码
    pub fn run_pipelined<S, D>(
        &mut self,
        source: &mut S,
        detections: &mut D,
        backend: &mut dyn VideoBackend,
        output: impl AsRef<Path>,
    ) -> RunReport
    where
        S: FrameSource + Send + ?Sized,
        D: DetectionSource + Send + ?Sized,
    {
        let output = output.as_ref();
        let started = Instant::now();
        let mut report = RunReport::begin(output);

        let mut session = EncoderSession::new(
            backend,
            self.encoder_settings(output),
            self.config.codec_candidates.clone(),
        );
        if let Err(e) = session.open() {
            return report.fail(&e, started);
        }

        let mut normalizer = FrameNormalizer::new(self.config.output_resolution);
        let mut clock = ProgressClock::new(self.config.progress_every, source.total_frames());
        let (tx, rx) = bounded::<Work>(self.config.queue_depth);
        let config = self.config.clone();
        let cancel = self.cancel.clone();

        let produced = thread::scope(|s| {
            let producer = s.spawn(move || produce(config, cancel, source, detections, tx));

            // 生产端退出并释放发送端后迭代结束
            for work in rx.iter() {
                self.emit(&mut session, &mut normalizer, work.frame, &work.outcome);
                report.frames_processed += 1;
                self.tick(&mut clock, work.frames_read);
            }
            producer.join()
        });

        let (events, input) = match produced {
            Ok(result) => result,
            Err(_) => {
                log::error!("❌ 生产线程异常退出");
                let input = InputSummary {
                    error: Some(Error::Decode {
                        frame_index: 0,
                        reason: "producer thread panicked".into(),
                    }),
                    ..InputSummary::default()
                };
                (Vec::new(), input)
            }
        };

        finish(report, session, input, events, started)
    }

    /// 截图回调 → 标注 → 编码
    fn emit(
        &mut self,
        session: &mut EncoderSession<'_>,
        normalizer: &mut FrameNormalizer,
        frame: VideoFrame,
        outcome: &FrameOutcome,
    ) -> bool {
        let index = frame.index;
        let mut image = match normalizer.normalize(frame) {
            Ok(image) => image,
            Err(e) => {
                session.skip_frame(index, e);
                return false;
            }
        };
        if let Some(callback) = self.on_violation.as_mut() {
            for event in &outcome.violations {
                callback(event, &image);
            }
        }
        if let Some(annotator) = self.annotator.as_mut() {
            annotator.annotate(&mut image, &outcome.overlay);
        }
        session.write_image(index, image)
    }

    fn tick(&mut self, clock: &mut ProgressClock, frames_read: u64) {
        let Some(sample) = clock.tick(frames_read) else {
            return;
        };
        log::info!(
            "⏱️  进度: {} / {} 帧 | {} | 剩余 {}",
            sample.frames_done,
            sample
                .frames_total
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".into()),
            sample
                .speed_fps
                .map(|fps| format!("{fps:.1} fps"))
                .unwrap_or_else(|| "- fps".into()),
            sample.eta_seconds.map(format_eta).unwrap_or_else(|| "--:--".into())
        );
        if let Some(callback) = self.on_progress.as_mut() {
            callback(&sample);
        }
    }
}

/// 取检测 → 过滤 → 判定
fn classify_frame<D>(
    config: &RunConfig,
    engine: &mut ViolationEngine,
    detections: &mut D,
    frame_index: u64,
) -> Result<FrameOutcome>
where
    D: DetectionSource + ?Sized,
{
    let raw = detections.detections_for(frame_index)?;
    let kept = filter_detections(raw, config.confidence_threshold, &config.classes);
    Ok(engine.process_frame(frame_index, &kept))
}

/// 生产线程: 解码 + 判定, 按帧号顺序送入有界队列
fn produce<S, D>(
    config: RunConfig,
    cancel: CancelToken,
    source: &mut S,
    detections: &mut D,
    tx: Sender<Work>,
) -> (Vec<ViolationEvent>, InputSummary)
where
    S: FrameSource + ?Sized,
    D: DetectionSource + ?Sized,
{
    let mut engine = ViolationEngine::new(&config);
    let mut input = InputSummary::default();

    loop {
        if cancel.is_cancelled() {
            log::warn!("🛑 收到取消信号, 停止读取");
            input.cancelled = true;
            break;
        }
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                log::error!("❌ 读取帧失败: {}", e);
                input.error = Some(e);
                break;
            }
        };
        input.frames_read += 1;
        if !config.is_sampled(frame.index) {
            continue;
        }

        let outcome = match classify_frame(&config, &mut engine, detections, frame.index) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("❌ 读取检测结果失败: {}", e);
                input.error = Some(e);
                break;
            }
        };
        let work = Work {
            frame,
            outcome,
            frames_read: input.frames_read,
        };
        // 消费端已退出
        if tx.send(work).is_err() {
            break;
        }
    }
    input.source_dropped = source.dropped_frames();

    (engine.into_events(), input)
}

/// 收尾: 无论输入如何结束, 编码会话都会关闭并校验
fn finish(
    mut report: RunReport,
    mut session: EncoderSession<'_>,
    input: InputSummary,
    events: Vec<ViolationEvent>,
    started: Instant,
) -> RunReport {
    let finalized = session.finalize();

    report.frames_read = input.frames_read;
    report.frames_written = session.frames_written();
    report.frames_dropped = session.frames_dropped() + input.source_dropped;
    report.frames_dropped_at_decode = input.source_dropped;
    report.input_error = input.error.as_ref().map(|e| e.reason_code().to_string());
    report.codec_used = session.codec().map(str::to_string);
    report.violations = events;
    report.cancelled = input.cancelled;
    report.processing_seconds = started.elapsed().as_secs_f64();
    report.average_fps = if report.processing_seconds > 0.0 {
        Some(report.frames_processed as f64 / report.processing_seconds)
    } else {
        None
    };

    match finalized {
        Ok(video) => {
            report.output_path = video.path;
            // 取消只是标记, 丢帧优先于取消
            let (status, reason) = match (&input.error, report.frames_dropped, input.cancelled) {
                (Some(e), _, _) => (RunStatus::DroppedFrames, e.reason_code()),
                (None, n, _) if n > 0 => (RunStatus::DroppedFrames, "frames_dropped"),
                (None, _, true) => (RunStatus::Clean, "cancelled"),
                _ => (RunStatus::Clean, "clean"),
            };
            report.status = status;
            report.reason = reason.to_string();
            report.message = input.error.as_ref().map(|e| e.to_string());
        }
        Err(e) => {
            report.status = RunStatus::Failed;
            // 输入没有产出任何帧时, 校验失败归因于输入
            let reason = match &input.error {
                Some(input_err) if report.frames_written == 0 => input_err.reason_code(),
                _ => e.reason_code(),
            };
            report.reason = reason.to_string();
            report.message = Some(match &input.error {
                Some(input_err) => format!("{e} (input ended early: {input_err})"),
                None => e.to_string(),
            });
        }
    }

    report.log_summary();
    report
}
