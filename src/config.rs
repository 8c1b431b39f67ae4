//! 运行配置 - 通过JSON文件加载,启动时一次性校验
//!
//! 必填字段缺失即为 `Error::Config`,不会静默替换为默认值;
//! 可选字段有明确的默认值。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::detection::ClassLabel;
use crate::error::{Error, Result};

/// 输出分辨率 (JSON 中写作 `[width, height]`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// RGB24 一帧的字节数
    pub fn rgb_frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl From<Resolution> for (u32, u32) {
    fn from(r: Resolution) -> Self {
        (r.width, r.height)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// 闯红灯检测运行参数
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    // === 必填参数 ===
    pub frame_rate: f64,           // 源视频帧率 (>0)
    pub red_light_start_time: f64, // 红灯开始时间(秒, >=0)
    pub line_y: f32,               // 停止线Y坐标(像素, 输出分辨率坐标系)
    pub flash_duration_frames: u32, // 违章闪烁帧数 (>0)
    pub output_resolution: Resolution,
    pub codec_candidates: Vec<String>, // 编码器候选 (按优先级)

    // === 可选参数 ===
    #[serde(default = "default_frame_stride")]
    pub frame_stride: u32, // 每N帧处理一帧
    #[serde(default)]
    pub reference_offset: f32, // 参考点相对底边的上移量(像素)
    #[serde(default = "default_min_output_bytes")]
    pub min_output_bytes: u64, // 输出文件最小字节数
    #[serde(default = "default_progress_every")]
    pub progress_every: u64, // 进度采样间隔(帧)
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize, // 流水线队列深度
    #[serde(default = "default_crop_margin")]
    pub crop_margin: u32, // 违章截图外扩像素
    #[serde(default)]
    pub confidence_threshold: f32, // 检测置信度阈值
    #[serde(default)]
    pub classes: Vec<ClassLabel>, // 参与判定的类别 (空=全部)
    #[serde(default = "default_blink_period")]
    pub blink_period: u32, // 闪烁周期(帧, 0=常亮)
}

fn default_frame_stride() -> u32 {
    1
}

fn default_min_output_bytes() -> u64 {
    1024
}

fn default_progress_every() -> u64 {
    30
}

fn default_queue_depth() -> usize {
    8
}

fn default_crop_margin() -> u32 {
    5
}

fn default_blink_period() -> u32 {
    2
}

impl RunConfig {
    /// 用必填参数构造,可选参数取默认值
    pub fn new(
        frame_rate: f64,
        red_light_start_time: f64,
        line_y: f32,
        flash_duration_frames: u32,
        output_resolution: Resolution,
        codec_candidates: Vec<String>,
    ) -> Self {
        Self {
            frame_rate,
            red_light_start_time,
            line_y,
            flash_duration_frames,
            output_resolution,
            codec_candidates,
            frame_stride: default_frame_stride(),
            reference_offset: 0.0,
            min_output_bytes: default_min_output_bytes(),
            progress_every: default_progress_every(),
            queue_depth: default_queue_depth(),
            crop_margin: default_crop_margin(),
            confidence_threshold: 0.0,
            classes: Vec::new(),
            blink_period: default_blink_period(),
        }
    }

    /// 从JSON文件加载并校验
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_json_str(&json)?;
        log::info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        log::info!("💾 配置已保存到 {}", path.as_ref().display());
        Ok(())
    }

    /// 校验所有参数范围
    pub fn validate(&self) -> Result<()> {
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(Error::config(format!(
                "frame_rate must be positive, got {}",
                self.frame_rate
            )));
        }
        if !self.red_light_start_time.is_finite() || self.red_light_start_time < 0.0 {
            return Err(Error::config(format!(
                "red_light_start_time must be non-negative, got {}",
                self.red_light_start_time
            )));
        }
        if self.flash_duration_frames == 0 {
            return Err(Error::config("flash_duration_frames must be positive"));
        }
        let Resolution { width, height } = self.output_resolution;
        if width == 0 || height == 0 {
            return Err(Error::config(format!(
                "output_resolution must be positive, got {}",
                self.output_resolution
            )));
        }
        if !self.line_y.is_finite() || self.line_y < 0.0 || self.line_y > height as f32 {
            return Err(Error::config(format!(
                "line_y {} is outside the frame height {}",
                self.line_y, height
            )));
        }
        if self.codec_candidates.is_empty() {
            return Err(Error::config("codec_candidates must not be empty"));
        }
        if self.codec_candidates.iter().any(|c| c.trim().is_empty()) {
            return Err(Error::config("codec_candidates contains a blank entry"));
        }
        if self.frame_stride == 0 {
            return Err(Error::config("frame_stride must be at least 1"));
        }
        if self.progress_every == 0 {
            return Err(Error::config("progress_every must be at least 1"));
        }
        if self.queue_depth == 0 {
            return Err(Error::config("queue_depth must be at least 1"));
        }
        if !self.reference_offset.is_finite() {
            return Err(Error::config("reference_offset must be finite"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::config(format!(
                "confidence_threshold must be within 0..=1, got {}",
                self.confidence_threshold
            )));
        }
        if width % 2 != 0 || height % 2 != 0 {
            log::warn!(
                "⚠️  输出分辨率 {} 含奇数边,部分编码器(yuv420p)可能拒绝",
                self.output_resolution
            );
        }
        Ok(())
    }

    /// 输出视频帧率 (跳帧后, 至少 1fps)
    pub fn output_fps(&self) -> f64 {
        (self.frame_rate / self.frame_stride as f64).max(1.0)
    }

    /// 该源帧是否参与处理
    pub fn is_sampled(&self, frame_index: u64) -> bool {
        frame_index % self.frame_stride as u64 == 0
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        log::info!("🎛️  当前运行配置:");
        log::info!("  帧率: {:.2} (每{}帧处理一帧)", self.frame_rate, self.frame_stride);
        log::info!("  红灯开始: {:.2}s", self.red_light_start_time);
        log::info!("  停止线Y: {}", self.line_y);
        log::info!("  闪烁帧数: {}", self.flash_duration_frames);
        log::info!("  输出分辨率: {} @ {:.2}fps", self.output_resolution, self.output_fps());
        log::info!("  编码器候选: {}", self.codec_candidates.join(" → "));
    }
}
