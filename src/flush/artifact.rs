// Artifact naming and metadata

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::encoding::ClipCodec;

/// Metadata for one persisted clip, handed to the notifier.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    /// Wall-clock time of the trigger that produced the clip
    pub capture_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub frame_count: usize,
}

/// Allocates collision-resistant clip paths inside a storage directory.
///
/// Names carry wall-clock time to millisecond precision plus a
/// process-monotonic counter, so repeated triggers within the same
/// millisecond still get distinct paths.
pub struct ArtifactNamer {
    dir: PathBuf,
    codec: ClipCodec,
    counter: AtomicU64,
}

impl ArtifactNamer {
    pub fn new(dir: PathBuf, codec: ClipCodec) -> Self {
        Self {
            dir,
            codec,
            counter: AtomicU64::new(0),
        }
    }

    /// Next clip path for a flush requested at `at`.
    pub fn next(&self, at: DateTime<Utc>) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let stamp = at.format("%Y%m%d_%H%M%S_%3f");
        let ext = self.codec.container().extension();
        self.dir.join(format!("clip_{stamp}_{n:03}.{ext}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_instant_yields_distinct_paths() {
        let namer = ArtifactNamer::new(PathBuf::from("/clips"), ClipCodec::H264);
        let at = Utc::now();
        let first = namer.next(at);
        let second = namer.next(at);
        assert_ne!(first, second);
    }

    #[test]
    fn names_carry_timestamp_and_extension() {
        let namer = ArtifactNamer::new(PathBuf::from("/clips"), ClipCodec::Vp9);
        let at = "2026-02-21T14:32:45.678Z".parse().unwrap();
        let path = namer.next(at);
        assert_eq!(
            path,
            PathBuf::from("/clips/clip_20260221_143245_678_000.webm")
        );
    }

    #[test]
    fn counter_is_monotonic() {
        let namer = ArtifactNamer::new(PathBuf::from("/clips"), ClipCodec::Mjpeg);
        let at = Utc::now();
        let names: Vec<_> = (0..3).map(|_| namer.next(at)).collect();
        for pair in names.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert!(names[0].to_string_lossy().ends_with(".mkv"));
    }
}
