// Configuration management for Hindsight

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::encoding::ClipCodec;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory where captured clips are stored
    pub storage_path: PathBuf,

    /// Target capture rate in frames per second
    #[serde(default = "default_fps")]
    pub fps: f64,

    /// Length of the replay window in seconds; together with the negotiated
    /// rate this sizes the ring buffer
    #[serde(default = "default_buffer_secs")]
    pub buffer_secs: f64,

    /// Requested frame width (best effort; the source reports back what it
    /// actually delivers)
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,

    /// Requested frame height
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,

    /// Camera index, translated to a platform device by the frame source
    #[serde(default)]
    pub camera_index: u32,

    /// Codec for saved clips
    #[serde(default = "default_codec")]
    pub codec: ClipCodec,

    /// Key that stops the daemon when read from stdin
    #[serde(default = "default_stop_key")]
    pub stop_key: char,

    /// Frames discarded after opening while the sensor stabilizes
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,

    /// Consecutive failed reads tolerated before capture aborts
    #[serde(default = "default_max_read_failures")]
    pub max_read_failures: u32,

    /// Seconds between buffer status log lines (0 disables them)
    #[serde(default = "default_status_log_secs")]
    pub status_log_secs: u64,

    /// Optional webhook receiving artifact metadata after each save
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: get_default_storage_path(),
            fps: default_fps(),
            buffer_secs: default_buffer_secs(),
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
            camera_index: 0,
            codec: default_codec(),
            stop_key: default_stop_key(),
            warmup_frames: default_warmup_frames(),
            max_read_failures: default_max_read_failures(),
            status_log_secs: default_status_log_secs(),
            webhook_url: None,
        }
    }
}

impl Config {
    /// Load config from `path` (or the default location) or return defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(get_default_config_path);

        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => {
                        log::warn!("failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    log::warn!("failed to read config file: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Save config to disk
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        Ok(())
    }

    /// Ring capacity implied by the requested rate and window.
    pub fn capacity(&self) -> usize {
        (self.fps * self.buffer_secs).round() as usize
    }

    /// Reject configurations that would produce a zero-capacity buffer or
    /// degenerate frames.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.fps > 0.0) {
            anyhow::bail!("fps must be positive");
        }
        if !(self.buffer_secs > 0.0) {
            anyhow::bail!("buffer_secs must be positive");
        }
        if self.capacity() == 0 {
            anyhow::bail!("fps x buffer_secs must cover at least one frame");
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            anyhow::bail!("frame dimensions must be positive");
        }
        Ok(())
    }
}

/// Get the default storage path for clips
fn get_default_storage_path() -> PathBuf {
    dirs::video_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Videos")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Hindsight")
}

/// Get the default config file path
pub fn get_default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hindsight")
        .join("config.toml")
}

/// Default capture rate (for serde)
fn default_fps() -> f64 {
    30.0
}

/// Default replay window (for serde)
fn default_buffer_secs() -> f64 {
    15.0
}

fn default_frame_width() -> u32 {
    640
}

fn default_frame_height() -> u32 {
    480
}

fn default_codec() -> ClipCodec {
    ClipCodec::H264
}

fn default_stop_key() -> char {
    'q'
}

/// Default warm-up frame count (for serde)
fn default_warmup_frames() -> u32 {
    30
}

fn default_max_read_failures() -> u32 {
    50
}

fn default_status_log_secs() -> u64 {
    5
}
