//! 容错视频编码会话 (Resilient encoder session)
//!
//! Init → SelectingCodec → Opened → Writing → Validating → Finalized
//! 候选编码器全部失败或输出校验失败时进入 Failed。

use image::RgbImage;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use super::frame::{FrameNormalizer, VideoFrame};
use crate::config::Resolution;
use crate::error::{Error, Result};

/// 单帧写入失败时逐条打印的上限
const DROP_LOG_LIMIT: u64 = 10;

// ========== 后端接口 ==========

/// 已打开的写入句柄
pub trait FrameWriter {
    /// 写入一帧 (已归一化为目标分辨率的RGB24)
    fn write(&mut self, frame: &RgbImage) -> Result<()>;

    /// 释放句柄并刷新文件
    fn close(&mut self) -> Result<()>;
}

/// 输出文件探测结果
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProbeInfo {
    pub frame_count: u64,
}

/// 视频后端: 按编码器名打开写入句柄,并能只读探测产物
pub trait VideoBackend {
    fn open(
        &mut self,
        codec: &str,
        path: &Path,
        resolution: Resolution,
        fps: f64,
    ) -> Result<Box<dyn FrameWriter>>;

    fn probe(&self, path: &Path) -> Result<ProbeInfo>;
}

// ========== 会话 ==========

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Init,
    SelectingCodec,
    Opened,
    Writing,
    Validating,
    Finalized,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "init",
            SessionState::SelectingCodec => "selecting_codec",
            SessionState::Opened => "opened",
            SessionState::Writing => "writing",
            SessionState::Validating => "validating",
            SessionState::Finalized => "finalized",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// 会话参数
#[derive(Clone, Debug)]
pub struct EncoderSettings {
    pub path: PathBuf,
    pub resolution: Resolution,
    pub fps: f64,
    /// 输出文件必须超过的字节数
    pub min_output_bytes: u64,
}

/// 成功收尾的视频
#[derive(Clone, Debug, PartialEq)]
pub struct FinalizedVideo {
    pub path: PathBuf,
    pub codec_used: String,
    pub frames_written: u64,
    pub frames_dropped: u64,
    pub probed_frames: u64,
    pub file_size: u64,
}

/// 一个输出视频对应一个会话; 同一时刻最多持有一个写入句柄
pub struct EncoderSession<'a> {
    backend: &'a mut dyn VideoBackend,
    settings: EncoderSettings,
    candidates: Vec<String>,
    tried: Vec<String>,
    codec: Option<String>,
    writer: Option<Box<dyn FrameWriter + 'a>>,
    normalizer: FrameNormalizer,
    state: SessionState,
    frames_written: u64,
    frames_dropped: u64,
}

impl<'a> EncoderSession<'a> {
    pub fn new(
        backend: &'a mut dyn VideoBackend,
        settings: EncoderSettings,
        candidates: Vec<String>,
    ) -> Self {
        let normalizer = FrameNormalizer::new(settings.resolution);
        Self {
            backend,
            settings,
            candidates,
            tried: Vec::new(),
            codec: None,
            writer: None,
            normalizer,
            state: SessionState::Init,
            frames_written: 0,
            frames_dropped: 0,
        }
    }

    /// 按顺序尝试候选编码器,直到成功打开
    pub fn open(&mut self) -> Result<&str> {
        if self.writer.is_some() {
            return Err(Error::EncoderInit {
                tried: self.tried.clone(),
            });
        }
        self.state = SessionState::SelectingCodec;

        for codec in &self.candidates {
            self.tried.push(codec.clone());
            match self.backend.open(
                codec,
                &self.settings.path,
                self.settings.resolution,
                self.settings.fps,
            ) {
                Ok(writer) => {
                    log::info!(
                        "🎞️  编码器已打开: {} ({} @ {:.2}fps) → {}",
                        codec,
                        self.settings.resolution,
                        self.settings.fps,
                        self.settings.path.display()
                    );
                    self.writer = Some(writer);
                    self.codec = Some(codec.clone());
                    self.state = SessionState::Opened;
                    return Ok(codec.as_str());
                }
                Err(e) => {
                    log::warn!("⚠️  编码器 {} 不可用: {}", codec, e);
                }
            }
        }

        self.state = SessionState::Failed;
        log::error!("❌ 所有编码器候选均失败: {}", self.tried.join(", "));
        Err(Error::EncoderInit {
            tried: self.tried.clone(),
        })
    }

    /// 写入原始帧 (先归一化); 失败时跳过并计入丢帧, 返回是否写入
    pub fn write_frame(&mut self, frame: VideoFrame) -> bool {
        let index = frame.index;
        let result = self
            .normalizer
            .normalize(frame)
            .and_then(|image| self.write_normalized(&image));
        self.account(index, result)
    }

    /// 写入已合成的RGB图像
    pub fn write_image(&mut self, index: u64, image: RgbImage) -> bool {
        let result = self
            .normalizer
            .fit(image)
            .and_then(|image| self.write_normalized(&image));
        self.account(index, result)
    }

    /// 上游无法生成该帧时计入丢帧
    pub fn skip_frame(&mut self, index: u64, reason: Error) {
        self.account(index, Err(reason));
    }

    fn write_normalized(&mut self, image: &RgbImage) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::frame_write(format!("session is {}", self.state)))?;
        writer.write(image)?;
        self.state = SessionState::Writing;
        Ok(())
    }

    fn account(&mut self, index: u64, result: Result<()>) -> bool {
        match result {
            Ok(()) => {
                self.frames_written += 1;
                true
            }
            Err(e) => {
                self.frames_dropped += 1;
                if self.frames_dropped <= DROP_LOG_LIMIT {
                    log::warn!("⚠️  丢弃帧 #{}: {}", index, e);
                } else if self.frames_dropped % 100 == 0 {
                    log::warn!("⚠️  已丢弃 {} 帧", self.frames_dropped);
                }
                false
            }
        }
    }

    /// 释放写入句柄 (幂等)
    pub fn close(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        if let Err(e) = writer.close() {
            log::warn!("⚠️  关闭编码器时出错: {}", e);
        }
        if self.state != SessionState::Failed {
            self.state = SessionState::Validating;
        }
    }

    /// 关闭并校验输出文件
    pub fn finalize(&mut self) -> Result<FinalizedVideo> {
        self.close();

        let Some(codec) = self.codec.clone() else {
            self.state = SessionState::Failed;
            return Err(Error::EncoderInit {
                tried: self.tried.clone(),
            });
        };
        if self.state == SessionState::Finalized {
            return Err(Error::validation(
                &self.settings.path,
                "session was already finalized",
            ));
        }
        self.state = SessionState::Validating;

        match self.validate() {
            Ok((probed_frames, file_size)) => {
                self.state = SessionState::Finalized;
                log::info!(
                    "✅ 输出视频通过校验: {} ({} 帧, {} 字节, 编码器 {})",
                    self.settings.path.display(),
                    probed_frames,
                    file_size,
                    codec
                );
                Ok(FinalizedVideo {
                    path: self.settings.path.clone(),
                    codec_used: codec,
                    frames_written: self.frames_written,
                    frames_dropped: self.frames_dropped,
                    probed_frames,
                    file_size,
                })
            }
            Err(e) => {
                self.state = SessionState::Failed;
                log::error!("❌ 输出视频校验失败: {}", e);
                Err(e)
            }
        }
    }

    fn validate(&self) -> Result<(u64, u64)> {
        let path = &self.settings.path;
        let file_size = fs::metadata(path)
            .map_err(|e| Error::validation(path, format!("cannot stat output: {e}")))?
            .len();
        let info = self
            .backend
            .probe(path)
            .map_err(|e| Error::validation(path, format!("cannot reopen output: {e}")))?;
        if info.frame_count == 0 {
            return Err(Error::validation(path, "output reports zero frames"));
        }
        if file_size <= self.settings.min_output_bytes {
            return Err(Error::validation(
                path,
                format!(
                    "output is {} bytes, expected more than {}",
                    file_size, self.settings.min_output_bytes
                ),
            ));
        }
        Ok((info.frame_count, file_size))
    }

    /// 用新的候选顺序重新开始会话 (校验失败后由调用方决定)
    pub fn retry_with(&mut self, candidates: Vec<String>) -> Result<&str> {
        self.close();
        log::info!("🔄 以新的编码器顺序重试: {}", candidates.join(", "));
        self.candidates = candidates;
        self.tried.clear();
        self.codec = None;
        self.frames_written = 0;
        self.frames_dropped = 0;
        self.state = SessionState::Init;
        self.open()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn codec(&self) -> Option<&str> {
        self.codec.as_deref()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

impl Drop for EncoderSession<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        opened: Vec<String>,
        frames: u64,
        closes: u32,
    }

    /// 把帧字节写入真实文件,探测时返回写入帧数
    struct FakeBackend {
        working: Vec<&'static str>,
        log: Rc<RefCell<Log>>,
        report_frames: Option<u64>,
    }

    struct FakeWriter {
        file: Option<fs::File>,
        log: Rc<RefCell<Log>>,
        fail_on: Option<u64>,
    }

    impl FrameWriter for FakeWriter {
        fn write(&mut self, frame: &RgbImage) -> Result<()> {
            let n = self.log.borrow().frames;
            if self.fail_on == Some(n) {
                self.fail_on = None;
                return Err(Error::frame_write("injected"));
            }
            let file = self.file.as_mut().ok_or_else(|| Error::frame_write("closed"))?;
            file.write_all(frame.as_raw())?;
            self.log.borrow_mut().frames += 1;
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.file = None;
            self.log.borrow_mut().closes += 1;
            Ok(())
        }
    }

    impl VideoBackend for FakeBackend {
        fn open(
            &mut self,
            codec: &str,
            path: &Path,
            _resolution: Resolution,
            _fps: f64,
        ) -> Result<Box<dyn FrameWriter>> {
            if !self.working.contains(&codec) {
                return Err(Error::config(format!("{codec} missing")));
            }
            self.log.borrow_mut().opened.push(codec.to_string());
            Ok(Box::new(FakeWriter {
                file: Some(fs::File::create(path)?),
                log: Rc::clone(&self.log),
                fail_on: Some(1),
            }))
        }

        fn probe(&self, _path: &Path) -> Result<ProbeInfo> {
            Ok(ProbeInfo {
                frame_count: self.report_frames.unwrap_or(self.log.borrow().frames),
            })
        }
    }

    fn settings(dir: &Path) -> EncoderSettings {
        EncoderSettings {
            path: dir.join("out.mp4"),
            resolution: Resolution::new(16, 16),
            fps: 25.0,
            min_output_bytes: 100,
        }
    }

    fn backend(working: Vec<&'static str>) -> FakeBackend {
        FakeBackend {
            working,
            log: Rc::new(RefCell::new(Log::default())),
            report_frames: None,
        }
    }

    #[test]
    fn falls_back_to_next_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(vec!["b"]);
        let log = Rc::clone(&backend.log);
        let mut session =
            EncoderSession::new(&mut backend, settings(dir.path()), vec!["a".into(), "b".into()]);
        assert_eq!(session.open().unwrap(), "b");
        for i in 0..4 {
            session.write_frame(VideoFrame::rgb(i, 32, 32, vec![0; 32 * 32 * 3]));
        }
        let video = session.finalize().unwrap();
        assert_eq!(video.codec_used, "b");
        assert_eq!(video.frames_written, 3);
        assert_eq!(video.frames_dropped, 1);
        assert_eq!(session.state(), SessionState::Finalized);
        drop(session);
        assert_eq!(log.borrow().opened, vec!["b".to_string()]);
        assert_eq!(log.borrow().closes, 1);
    }

    #[test]
    fn exhausted_candidates_fail_init() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(vec![]);
        let mut session =
            EncoderSession::new(&mut backend, settings(dir.path()), vec!["a".into(), "b".into()]);
        let err = session.open().unwrap_err();
        assert!(matches!(err, Error::EncoderInit { ref tried } if tried.len() == 2));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(!dir.path().join("out.mp4").exists());
    }

    #[test]
    fn zero_frame_output_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(vec!["a"]);
        let mut session = EncoderSession::new(&mut backend, settings(dir.path()), vec!["a".into()]);
        session.open().unwrap();
        let err = session.finalize().unwrap_err();
        assert_eq!(err.reason_code(), "validation_failed");
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn tiny_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(vec!["a"]);
        backend.report_frames = Some(1);
        let mut s = settings(dir.path());
        s.min_output_bytes = 1_000_000;
        let mut session = EncoderSession::new(&mut backend, s, vec!["a".into()]);
        session.open().unwrap();
        session.write_frame(VideoFrame::rgb(0, 16, 16, vec![1; 16 * 16 * 3]));
        assert!(matches!(session.finalize(), Err(Error::Validation { .. })));
    }

    #[test]
    fn close_is_idempotent_and_runs_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(vec!["a"]);
        let log = Rc::clone(&backend.log);
        {
            let mut session =
                EncoderSession::new(&mut backend, settings(dir.path()), vec!["a".into()]);
            session.open().unwrap();
            session.close();
            session.close();
            assert!(!session.is_open());
        }
        assert_eq!(log.borrow().closes, 1);

        {
            let mut session =
                EncoderSession::new(&mut backend, settings(dir.path()), vec!["a".into()]);
            session.open().unwrap();
        }
        assert_eq!(log.borrow().closes, 2);
    }

    #[test]
    fn retry_with_reopens_using_new_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(vec!["a", "b"]);
        backend.report_frames = Some(0);
        let mut session =
            EncoderSession::new(&mut backend, settings(dir.path()), vec!["a".into(), "b".into()]);
        session.open().unwrap();
        assert!(session.finalize().is_err());

        assert_eq!(session.retry_with(vec!["b".into()]).unwrap(), "b");
        assert_eq!(session.state(), SessionState::Opened);
        assert_eq!(session.frames_written(), 0);
    }

    #[test]
    fn writing_before_open_counts_as_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(vec!["a"]);
        let mut session = EncoderSession::new(&mut backend, settings(dir.path()), vec!["a".into()]);
        assert!(!session.write_image(0, RgbImage::new(16, 16)));
        assert_eq!(session.frames_dropped(), 1);
    }
}
