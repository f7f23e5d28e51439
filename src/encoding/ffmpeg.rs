// ffmpeg-based clip encoder
//
// Frames are piped as packed RGB24 into an ffmpeg child process, which owns
// all codec and container details. This module only manages the child's
// lifecycle: spawn, feed, wait, and reap on failure.

use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::capture::Frame;

use super::{ClipCodec, ClipEncoder, EncoderError, Result};

/// Reference encoder shelling out to ffmpeg.
pub struct FfmpegEncoder {
    codec: ClipCodec,
    binary: String,
}

impl FfmpegEncoder {
    pub fn new(codec: ClipCodec) -> Self {
        Self {
            codec,
            binary: "ffmpeg".into(),
        }
    }

    /// Use a specific ffmpeg binary instead of the one on PATH.
    pub fn with_binary(codec: ClipCodec, binary: impl Into<String>) -> Self {
        Self {
            codec,
            binary: binary.into(),
        }
    }

    fn feed_frames(child: &mut Child, frames: &[Frame], expected_len: usize) -> Result<()> {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EncoderError::Failed("encoder stdin unavailable".into()))?;

        for frame in frames {
            debug_assert_eq!(frame.data.len(), expected_len);
            stdin.write_all(&frame.data).map_err(EncoderError::Write)?;
        }

        // Dropping stdin closes the pipe and lets ffmpeg finalize the file
        Ok(())
    }
}

impl ClipEncoder for FfmpegEncoder {
    fn encode(&self, frames: &[Frame], path: &Path, fps: f64, size: (u32, u32)) -> Result<()> {
        if frames.is_empty() {
            return Err(EncoderError::Empty);
        }

        let (width, height) = size;
        let dims = format!("{}x{}", width, height);
        let rate = format!("{:.3}", fps);

        log::debug!(
            "encoding {} frames to {} ({} @ {} fps)",
            frames.len(),
            path.display(),
            self.codec.display_name(),
            rate,
        );

        let mut child = Command::new(&self.binary)
            .arg("-y")
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-video_size", &dims])
            .args(["-framerate", &rate])
            .args(["-i", "pipe:0"])
            .args(["-c:v", self.codec.ffmpeg_encoder()])
            .args(["-pix_fmt", self.codec.ffmpeg_pix_fmt()])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(EncoderError::Spawn)?;

        let expected_len = Frame::expected_len(width, height);
        if let Err(e) = Self::feed_frames(&mut child, frames, expected_len) {
            // A broken pipe here usually means ffmpeg already died; reap it
            // so the error carries its exit status instead of an io error.
            let _ = child.kill();
            if let Ok(status) = child.wait() {
                if !status.success() {
                    return Err(EncoderError::Failed(status.to_string()));
                }
            }
            return Err(e);
        }

        let status = child.wait().map_err(EncoderError::Write)?;
        if !status.success() {
            return Err(EncoderError::Failed(status.to_string()));
        }
        Ok(())
    }
}
