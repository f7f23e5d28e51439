// Clip encoding - codec table and the encoder contract
//
// This module defines supported clip codecs and their container mappings.
// To add a new codec:
// 1. Add variant to ClipCodec enum
// 2. Add container mapping in container()
// 3. Add ffmpeg encoder and pixel format names below
//
// The encoder itself is a collaborator behind the ClipEncoder trait; the
// reference implementation lives in ffmpeg.rs.

pub mod ffmpeg;

pub use ffmpeg::FfmpegEncoder;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::capture::Frame;

/// Supported clip codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipCodec {
    /// H.264/AVC - widely compatible, good compression
    H264,
    /// VP9 - royalty-free, excellent compression
    Vp9,
    /// Motion JPEG - every frame standalone, cheapest to encode
    Mjpeg,
}

impl ClipCodec {
    /// All supported codecs (for iteration)
    pub const ALL: &'static [ClipCodec] = &[ClipCodec::H264, ClipCodec::Vp9, ClipCodec::Mjpeg];

    /// Get the appropriate container format for this codec
    pub fn container(&self) -> ContainerFormat {
        match self {
            ClipCodec::H264 => ContainerFormat::Mp4,
            ClipCodec::Vp9 => ContainerFormat::WebM,
            ClipCodec::Mjpeg => ContainerFormat::Mkv,
        }
    }

    /// ffmpeg encoder name for this codec
    pub fn ffmpeg_encoder(&self) -> &'static str {
        match self {
            ClipCodec::H264 => "libx264",
            ClipCodec::Vp9 => "libvpx-vp9",
            ClipCodec::Mjpeg => "mjpeg",
        }
    }

    /// Output pixel format the encoder expects
    pub fn ffmpeg_pix_fmt(&self) -> &'static str {
        match self {
            ClipCodec::H264 => "yuv420p",
            ClipCodec::Vp9 => "yuv420p",
            // mjpeg wants full-range JPEG chroma
            ClipCodec::Mjpeg => "yuvj420p",
        }
    }

    /// Human-readable display name
    pub fn display_name(&self) -> &'static str {
        match self {
            ClipCodec::H264 => "H.264",
            ClipCodec::Vp9 => "VP9",
            ClipCodec::Mjpeg => "MJPEG",
        }
    }
}

/// Supported container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// MP4 (.mp4) - widely compatible, good for H.264
    Mp4,
    /// WebM (.webm) - web-optimized, good for VP9
    WebM,
    /// Matroska (.mkv) - flexible, supports any codec
    Mkv,
}

impl ContainerFormat {
    /// Get the file extension for this container
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::WebM => "webm",
            ContainerFormat::Mkv => "mkv",
        }
    }
}

/// Error type for encoder operations
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("failed to spawn encoder process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to feed encoder: {0}")]
    Write(#[source] std::io::Error),

    #[error("encoder exited with {0}")]
    Failed(String),

    #[error("no frames to encode")]
    Empty,
}

pub type Result<T> = std::result::Result<T, EncoderError>;

/// Serializes an ordered frame sequence to a container file at the given
/// rate and geometry.
pub trait ClipEncoder: Send {
    fn encode(&self, frames: &[Frame], path: &Path, fps: f64, size: (u32, u32)) -> Result<()>;
}
