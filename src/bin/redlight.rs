/// 闯红灯检测 (Red-light violation detector)
///
/// 输入: 视频文件 + 外部跟踪器导出的逐帧检测 (JSON Lines)
/// 输出: 标注视频、违章截图、运行报告
///
/// 系统架构:
/// 1. 解码线程: FFmpeg 软件解码, 缩放到输出分辨率
/// 2. 判定:     越线 + 红灯 → 违章事件
/// 3. 编码:     候选编码器依次尝试, 输出校验通过才算成功
use anyhow::{bail, Context};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

use redlight_rs::annotate::{crop_violation, OverlayAnnotator};
use redlight_rs::input::VideoDecoder;
use redlight_rs::output::FfmpegBackend;
use redlight_rs::{CancelToken, JsonLinesDetections, RunConfig, RunReport, ViolationRun};

/// 闯红灯检测参数
#[derive(Parser, Debug)]
#[command(author, version, about = "闯红灯检测 - 停止线越线判定与视频标注", long_about = None)]
struct Args {
    /// 输入视频
    #[arg(long)]
    video: String,

    /// 逐帧检测结果 (JSON Lines)
    #[arg(long)]
    detections: PathBuf,

    /// 运行配置 (JSON)
    #[arg(long)]
    config: PathBuf,

    /// 输出视频
    #[arg(short, long, default_value = "output.mp4")]
    output: PathBuf,

    /// 运行报告路径
    #[arg(long)]
    report: Option<PathBuf>,

    /// 违章截图目录
    #[arg(long, default_value = "violations")]
    violations_dir: PathBuf,

    /// 解码/判定与标注/编码分两个线程
    #[arg(long, default_value_t = false)]
    pipelined: bool,

    /// 覆盖配置中的编码器候选 (可重复)
    #[arg(long = "codec")]
    codecs: Vec<String>,

    /// 覆盖配置中的跳帧间隔
    #[arg(long)]
    frame_stride: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = RunConfig::load(&args.config)
        .with_context(|| format!("加载配置失败: {}", args.config.display()))?;
    if !args.codecs.is_empty() {
        config.codec_candidates = args.codecs.clone();
    }
    if let Some(stride) = args.frame_stride {
        config.frame_stride = stride;
    }

    // Ctrl-C 只发出取消信号, 由运行收尾并校验已写出的视频
    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || {
        log::warn!("🛑 收到中断信号, 正在收尾输出视频...");
        on_signal.cancel();
    })
    .context("无法注册 Ctrl-C 处理函数")?;

    fs::create_dir_all(&args.violations_dir)
        .with_context(|| format!("无法创建截图目录: {}", args.violations_dir.display()))?;

    // 输出校验失败时, 去掉失败的编码器后整体重跑
    let mut candidates = config.codec_candidates.clone();
    let report = loop {
        let mut attempt = config.clone();
        attempt.codec_candidates = candidates.clone();
        let report = run_once(&args, attempt, cancel.clone())?;

        // 只有输入完整读完时, 校验失败才归咎于编码器
        let retryable = report.reason == "validation_failed"
            && report.input_error.is_none()
            && !report.cancelled
            && candidates.len() > 1;
        if !retryable {
            break report;
        }
        let Some(failed) = report.codec_used.clone() else {
            break report;
        };
        candidates.retain(|c| *c != failed);
        log::warn!("🔄 编码器 {} 输出校验失败, 改用: {}", failed, candidates.join(", "));
    };

    if let Some(path) = &args.report {
        report.save(path)?;
    }

    if !report.is_success() {
        bail!(
            "运行失败 [{}]: {}",
            report.reason,
            report.message.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn run_once(args: &Args, config: RunConfig, cancel: CancelToken) -> anyhow::Result<RunReport> {
    let crop_margin = config.crop_margin;
    let blink_period = config.blink_period;
    let resolution = config.output_resolution;
    let violations_dir = args.violations_dir.clone();

    let mut run = ViolationRun::new(config)?
        .with_annotator(OverlayAnnotator::new(blink_period))
        .with_cancel_token(cancel)
        .on_violation(move |event, frame| {
            let Some(crop) = crop_violation(frame, &event.bbox, crop_margin) else {
                log::warn!("⚠️  车辆 {} 的检测框不在画面内, 跳过截图", event.track_id);
                return;
            };
            save_crop(&violations_dir, &event.crop_file_name(), &crop);
        });

    let mut source = VideoDecoder::open(&args.video, resolution)?;
    let mut detections = JsonLinesDetections::load(&args.detections)
        .with_context(|| format!("加载检测结果失败: {}", args.detections.display()))?;
    let mut backend = FfmpegBackend::new();

    let report = if args.pipelined {
        run.run_pipelined(&mut source, &mut detections, &mut backend, &args.output)
    } else {
        run.run(&mut source, &mut detections, &mut backend, &args.output)
    };
    Ok(report)
}

fn save_crop(dir: &Path, name: &str, crop: &image::RgbImage) {
    let path = dir.join(name);
    match crop.save(&path) {
        Ok(()) => log::info!("📸 违章截图已保存: {}", path.display()),
        Err(e) => log::error!("❌ 保存截图失败 {}: {}", path.display(), e),
    }
}
