// Frame acquisition backends
//
// The reference source pipes packed RGB24 video out of an ffmpeg child
// process, which owns all camera driver details; a synthetic source
// generates deterministic frames for tests and dry runs.

use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::Duration;

/// Error type for frame source operations
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to spawn capture process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("capture process exited during startup ({0})")]
    Startup(String),

    #[error("frame read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("frame stream ended")]
    Eof,

    #[error("source is not open")]
    NotOpen,

    #[error("no fallback acquisition mode for this source")]
    NoFallback,
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// Capture parameters negotiated with the device, queried back after `open`.
/// These drive ring sizing and the eventual encode rate, not the request.
#[derive(Debug, Clone, Copy)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// A device or stream that produces frames on demand.
pub trait FrameSource: Send {
    /// Acquire the device and negotiate geometry and rate.
    fn open(&mut self) -> Result<SourceInfo>;

    /// Alternate acquisition mode, tried once when `open` fails.
    fn open_fallback(&mut self) -> Result<SourceInfo> {
        Err(SourceError::NoFallback)
    }

    /// Pull exactly one frame of packed RGB24 pixels. Blocking with the
    /// source's own short timeout is acceptable.
    fn read(&mut self) -> Result<Vec<u8>>;

    /// Release the device. Idempotent; called on every capture exit path.
    fn close(&mut self);
}

/// Requested camera parameters. Actual values come back in [`SourceInfo`].
#[derive(Debug, Clone, Copy)]
pub struct CameraRequest {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Camera source reading packed RGB24 frames from an ffmpeg child process.
///
/// ffmpeg rescales to the requested geometry, so the negotiated values equal
/// the request and every read returns exactly one frame's worth of bytes.
/// The fallback acquisition mode forces MJPEG off the device (the usual fix
/// for V4L2 cameras that refuse raw capture at the requested size).
pub struct FfmpegCameraSource {
    request: CameraRequest,
    binary: String,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    frame_len: usize,
}

impl FfmpegCameraSource {
    pub fn new(request: CameraRequest) -> Self {
        Self {
            request,
            binary: "ffmpeg".into(),
            child: None,
            stdout: None,
            frame_len: 0,
        }
    }

    /// Use a specific ffmpeg binary instead of the one on PATH.
    pub fn with_binary(request: CameraRequest, binary: impl Into<String>) -> Self {
        Self {
            request,
            binary: binary.into(),
            child: None,
            stdout: None,
            frame_len: 0,
        }
    }

    fn spawn(&mut self, force_mjpeg: bool) -> Result<SourceInfo> {
        self.close_child();

        let req = self.request;
        let size = format!("{}x{}", req.width, req.height);
        let rate = format!("{}", req.fps);

        let mut cmd = Command::new(&self.binary);
        cmd.args(["-hide_banner", "-loglevel", "error"]);
        input_args(&mut cmd, &req, &size, &rate, force_mjpeg);
        cmd.args(["-vf", &format!("scale={}", size)])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(SourceError::Spawn)?;

        // A missing or busy device makes ffmpeg exit almost immediately.
        // Give it a moment so open failures surface here, where the caller
        // can still try the fallback mode, rather than on the first read.
        std::thread::sleep(Duration::from_millis(200));
        match child.try_wait() {
            Ok(Some(status)) => {
                return Err(SourceError::Startup(status.to_string()));
            }
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SourceError::Read(e));
            }
        }

        let stdout = child.stdout.take().ok_or(SourceError::NotOpen)?;
        self.child = Some(child);
        self.stdout = Some(stdout);
        self.frame_len = crate::capture::Frame::expected_len(req.width, req.height);

        log::info!(
            "camera {} open ({}{}, {} @ {} fps)",
            req.index,
            input_format_name(),
            if force_mjpeg { ", mjpeg" } else { "" },
            size,
            rate,
        );

        Ok(SourceInfo {
            width: req.width,
            height: req.height,
            fps: req.fps,
        })
    }

    fn close_child(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl FrameSource for FfmpegCameraSource {
    fn open(&mut self) -> Result<SourceInfo> {
        self.spawn(false)
    }

    fn open_fallback(&mut self) -> Result<SourceInfo> {
        self.spawn(true)
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        let stdout = self.stdout.as_mut().ok_or(SourceError::NotOpen)?;
        let mut buf = vec![0u8; self.frame_len];
        match stdout.read_exact(&mut buf) {
            Ok(()) => Ok(buf),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(SourceError::Eof),
            Err(e) => Err(SourceError::Read(e)),
        }
    }

    fn close(&mut self) {
        self.close_child();
    }
}

impl Drop for FfmpegCameraSource {
    fn drop(&mut self) {
        self.close_child();
    }
}

#[cfg(target_os = "linux")]
fn input_args(cmd: &mut Command, req: &CameraRequest, size: &str, rate: &str, force_mjpeg: bool) {
    cmd.args(["-f", "v4l2"]);
    if force_mjpeg {
        cmd.args(["-input_format", "mjpeg"]);
    }
    cmd.args(["-framerate", rate])
        .args(["-video_size", size])
        .args(["-i", &format!("/dev/video{}", req.index)]);
}

#[cfg(target_os = "macos")]
fn input_args(cmd: &mut Command, req: &CameraRequest, size: &str, rate: &str, _force_mjpeg: bool) {
    cmd.args(["-f", "avfoundation"])
        .args(["-framerate", rate])
        .args(["-video_size", size])
        .args(["-i", &format!("{}", req.index)]);
}

// dshow addresses devices by name; vfwcap is the one Windows input that
// takes a numeric index, which is all the configuration surface carries.
#[cfg(target_os = "windows")]
fn input_args(cmd: &mut Command, req: &CameraRequest, size: &str, rate: &str, _force_mjpeg: bool) {
    cmd.args(["-f", "vfwcap"])
        .args(["-framerate", rate])
        .args(["-video_size", size])
        .args(["-i", &format!("{}", req.index)]);
}

#[cfg(target_os = "linux")]
fn input_format_name() -> &'static str {
    "v4l2"
}
#[cfg(target_os = "macos")]
fn input_format_name() -> &'static str {
    "avfoundation"
}
#[cfg(target_os = "windows")]
fn input_format_name() -> &'static str {
    "vfwcap"
}

/// Deterministic frame generator for tests and dry runs.
///
/// Every frame is filled with its 1-based read number modulo 256, so tests
/// can identify a frame by any of its bytes. An optional limit makes reads
/// report end-of-stream afterwards.
pub struct SyntheticSource {
    info: SourceInfo,
    produced: u64,
    limit: Option<u64>,
    open: bool,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            info: SourceInfo { width, height, fps },
            produced: 0,
            limit: None,
            open: false,
        }
    }

    /// Stop producing after `limit` frames.
    pub fn with_limit(width: u32, height: u32, fps: f64, limit: u64) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new(width, height, fps)
        }
    }
}

impl FrameSource for SyntheticSource {
    fn open(&mut self) -> Result<SourceInfo> {
        self.open = true;
        Ok(self.info)
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        if !self.open {
            return Err(SourceError::NotOpen);
        }
        if let Some(limit) = self.limit {
            if self.produced >= limit {
                return Err(SourceError::Eof);
            }
        }
        self.produced += 1;
        let len = crate::capture::Frame::expected_len(self.info.width, self.info.height);
        Ok(vec![(self.produced % 256) as u8; len])
    }

    fn close(&mut self) {
        self.open = false;
    }
}
