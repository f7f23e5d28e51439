// Flush pipeline - snapshot handoff, encode, notify
//
// The worker owns the encoder and notifier; the capture loop only claims
// the in-flight slot and moves a snapshot into the channel. Flush outcomes
// are observational: nothing here feeds back into capture state, and a
// failed flush leaves the ring buffer untouched.

pub mod artifact;

pub use artifact::{ArtifactInfo, ArtifactNamer};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::capture::Frame;
use crate::encoding::{ClipCodec, ClipEncoder, EncoderError};
use crate::notify::Notifier;

/// Error type for flush operations
#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    #[error("encode failed: {0}")]
    Encode(#[from] EncoderError),

    #[error("flush worker is not running")]
    WorkerGone,

    #[error("failed to prepare storage directory: {0}")]
    Storage(#[source] std::io::Error),

    #[error("failed to spawn flush worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// One snapshot handed from the capture loop to the worker, by value.
pub struct FlushJob {
    pub frames: Vec<Frame>,
    /// Rate the source negotiated; used when the snapshot is too short to
    /// measure the delivered rate
    pub nominal_fps: f64,
    pub width: u32,
    pub height: u32,
    /// Wall-clock time of the trigger
    pub requested_at: DateTime<Utc>,
}

/// Result of a single flush attempt.
#[derive(Debug)]
pub enum FlushOutcome {
    /// Clip persisted; the notifier was informed (delivery may still have
    /// failed, which is logged and non-fatal)
    Saved(ArtifactInfo),
    /// The buffer was empty - nothing to persist, not an error
    NothingToSave,
    /// The flush failed; capture is unaffected
    Failed(FlushError),
}

/// Report emitted for every accepted trigger.
#[derive(Debug)]
pub struct FlushReport {
    pub requested_at: DateTime<Utc>,
    pub outcome: FlushOutcome,
}

impl FlushReport {
    fn log(&self) {
        match &self.outcome {
            FlushOutcome::Saved(artifact) => log::info!(
                "flush complete: {} ({} frames, {:.2}s)",
                artifact.path.display(),
                artifact.frame_count,
                artifact.duration_seconds,
            ),
            FlushOutcome::NothingToSave => {
                log::info!("flush skipped: buffer empty, nothing to save")
            }
            FlushOutcome::Failed(e) => log::error!("flush failed: {e}"),
        }
    }
}

enum WorkerMessage {
    Flush(FlushJob),
    Shutdown,
}

/// Cloneable handle the capture loop uses to start flushes.
#[derive(Clone)]
pub struct FlushHandle {
    tx: Sender<WorkerMessage>,
    in_flight: Arc<AtomicBool>,
}

impl FlushHandle {
    /// Claim the single in-flight flush slot. Returns false when a flush is
    /// already running; the caller drops the trigger.
    pub fn try_begin(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Hand a claimed snapshot to the worker. Releases the slot again if
    /// the worker has shut down.
    pub fn submit(&self, job: FlushJob) -> std::result::Result<(), FlushError> {
        self.tx.send(WorkerMessage::Flush(job)).map_err(|_| {
            self.in_flight.store(false, Ordering::Release);
            FlushError::WorkerGone
        })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Background thread that runs the flush stages one job at a time.
///
/// Same shape as an async encoder worker: bounded channel in, named thread,
/// explicit shutdown that drains the in-flight job before joining.
pub struct FlushWorker {
    tx: Sender<WorkerMessage>,
    in_flight: Arc<AtomicBool>,
    reports: Receiver<FlushReport>,
    thread: Option<JoinHandle<()>>,
}

impl FlushWorker {
    /// Spawn the worker. The storage directory is created up front so the
    /// first trigger doesn't pay for it.
    pub fn spawn(
        storage_path: PathBuf,
        codec: ClipCodec,
        encoder: Box<dyn ClipEncoder>,
        notifier: Box<dyn Notifier>,
    ) -> std::result::Result<Self, FlushError> {
        std::fs::create_dir_all(&storage_path).map_err(FlushError::Storage)?;

        let (tx, rx) = bounded::<WorkerMessage>(1);
        let (report_tx, report_rx) = unbounded();
        let in_flight = Arc::new(AtomicBool::new(false));
        let guard = in_flight.clone();
        let namer = ArtifactNamer::new(storage_path, codec);

        let thread = std::thread::Builder::new()
            .name("hindsight-flush".into())
            .spawn(move || worker_main(rx, report_tx, guard, namer, encoder, notifier))
            .map_err(FlushError::Spawn)?;

        Ok(Self {
            tx,
            in_flight,
            reports: report_rx,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> FlushHandle {
        FlushHandle {
            tx: self.tx.clone(),
            in_flight: self.in_flight.clone(),
        }
    }

    /// Receiver of per-flush reports, one per accepted trigger.
    pub fn reports(&self) -> Receiver<FlushReport> {
        self.reports.clone()
    }

    /// Stop the worker, letting any in-flight flush finish first.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.tx.send(WorkerMessage::Shutdown);
            if thread.join().is_err() {
                log::error!("flush worker panicked during shutdown");
            }
        }
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

fn worker_main(
    rx: Receiver<WorkerMessage>,
    reports: Sender<FlushReport>,
    in_flight: Arc<AtomicBool>,
    namer: ArtifactNamer,
    encoder: Box<dyn ClipEncoder>,
    notifier: Box<dyn Notifier>,
) {
    loop {
        match rx.recv() {
            Ok(WorkerMessage::Flush(job)) => {
                let requested_at = job.requested_at;
                let outcome = flush_clip(&namer, encoder.as_ref(), notifier.as_ref(), job);
                let report = FlushReport {
                    requested_at,
                    outcome,
                };
                report.log();
                let _ = reports.send(report);
                // Released last: the slot stays claimed until the report is
                // out, so a re-trigger during notify is still dropped.
                in_flight.store(false, Ordering::Release);
            }
            Ok(WorkerMessage::Shutdown) | Err(_) => break,
        }
    }
}

/// Run the flush stages for one snapshot.
fn flush_clip(
    namer: &ArtifactNamer,
    encoder: &dyn ClipEncoder,
    notifier: &dyn Notifier,
    job: FlushJob,
) -> FlushOutcome {
    if job.frames.is_empty() {
        return FlushOutcome::NothingToSave;
    }

    let path = namer.next(job.requested_at);
    let fps = effective_fps(&job.frames, job.nominal_fps);

    if let Err(e) = encoder.encode(&job.frames, &path, fps, (job.width, job.height)) {
        return FlushOutcome::Failed(FlushError::Encode(e));
    }

    let artifact = ArtifactInfo {
        path,
        capture_time: job.requested_at,
        duration_seconds: job.frames.len() as f64 / fps,
        frame_count: job.frames.len(),
    };

    if let Err(e) = notifier.notify(&artifact) {
        // The clip is already on disk; delivery failure never rolls it back.
        log::warn!("notification failed for {}: {e}", artifact.path.display());
    }

    FlushOutcome::Saved(artifact)
}

/// Encode rate derived from actual inter-frame spacing, falling back to the
/// nominal rate when the snapshot is too short to measure.
fn effective_fps(frames: &[Frame], nominal: f64) -> f64 {
    if frames.len() < 2 {
        return nominal;
    }
    let span = frames
        .last()
        .unwrap()
        .captured_at
        .duration_since(frames[0].captured_at)
        .as_secs_f64();
    if span > 0.0 {
        (frames.len() - 1) as f64 / span
    } else {
        nominal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::EncoderError;
    use crate::notify::NotifyError;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    struct RecordingEncoder {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl ClipEncoder for RecordingEncoder {
        fn encode(&self, _: &[Frame], _: &Path, _: f64, _: (u32, u32)) -> crate::encoding::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(EncoderError::Failed("forced fault".into()))
            } else {
                Ok(())
            }
        }
    }

    struct RecordingNotifier {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, _: &ArtifactInfo) -> crate::notify::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotifyError::Http("forced fault".into()))
            } else {
                Ok(())
            }
        }
    }

    fn frames_spaced(n: u64, spacing: Duration) -> Vec<Frame> {
        let base = Instant::now();
        (1..=n)
            .map(|seq| Frame {
                seq,
                width: 4,
                height: 4,
                data: vec![0; Frame::expected_len(4, 4)],
                captured_at: base + spacing * (seq as u32 - 1),
            })
            .collect()
    }

    fn job(frames: Vec<Frame>) -> FlushJob {
        FlushJob {
            frames,
            nominal_fps: 30.0,
            width: 4,
            height: 4,
            requested_at: Utc::now(),
        }
    }

    #[test]
    fn effective_fps_measures_spacing() {
        let frames = frames_spaced(11, Duration::from_millis(10));
        let fps = effective_fps(&frames, 30.0);
        assert!((fps - 100.0).abs() < 1.0, "expected ~100 fps, got {fps}");
    }

    #[test]
    fn effective_fps_falls_back_for_short_snapshots() {
        assert_eq!(effective_fps(&[], 30.0), 30.0);
        assert_eq!(effective_fps(&frames_spaced(1, Duration::ZERO), 30.0), 30.0);
        // identical instants cannot be measured either
        let mut frames = frames_spaced(2, Duration::ZERO);
        frames[1].captured_at = frames[0].captured_at;
        assert_eq!(effective_fps(&frames, 30.0), 30.0);
    }

    #[test]
    fn empty_snapshot_is_nothing_to_save() {
        let calls = Arc::new(AtomicUsize::new(0));
        let encoder = RecordingEncoder {
            calls: calls.clone(),
            fail: false,
        };
        let notifier = RecordingNotifier {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: false,
        };
        let namer = ArtifactNamer::new(PathBuf::from("/clips"), ClipCodec::H264);

        let outcome = flush_clip(&namer, &encoder, &notifier, job(Vec::new()));
        assert!(matches!(outcome, FlushOutcome::NothingToSave));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "encoder must not run");
    }

    #[test]
    fn encode_failure_is_reported_not_propagated() {
        let encoder = RecordingEncoder {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: true,
        };
        let notify_calls = Arc::new(AtomicUsize::new(0));
        let notifier = RecordingNotifier {
            calls: notify_calls.clone(),
            fail: false,
        };
        let namer = ArtifactNamer::new(PathBuf::from("/clips"), ClipCodec::H264);

        let outcome = flush_clip(&namer, &encoder, &notifier, job(frames_spaced(5, Duration::from_millis(1))));
        assert!(matches!(
            outcome,
            FlushOutcome::Failed(FlushError::Encode(_))
        ));
        assert_eq!(notify_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn notify_failure_keeps_the_artifact() {
        let encoder = RecordingEncoder {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: false,
        };
        let notify_calls = Arc::new(AtomicUsize::new(0));
        let notifier = RecordingNotifier {
            calls: notify_calls.clone(),
            fail: true,
        };
        let namer = ArtifactNamer::new(PathBuf::from("/clips"), ClipCodec::H264);

        let outcome = flush_clip(&namer, &encoder, &notifier, job(frames_spaced(5, Duration::from_millis(1))));
        match outcome {
            FlushOutcome::Saved(artifact) => assert_eq!(artifact.frame_count, 5),
            other => panic!("expected Saved, got {other:?}"),
        }
        assert_eq!(notify_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_claims_are_exclusive() {
        let (tx, _rx) = bounded(1);
        let handle = FlushHandle {
            tx,
            in_flight: Arc::new(AtomicBool::new(false)),
        };

        assert!(handle.try_begin());
        assert!(!handle.try_begin(), "second claim must lose");
        assert!(handle.is_in_flight());

        handle.in_flight.store(false, Ordering::Release);
        assert!(handle.try_begin());
    }

    #[test]
    fn submit_to_a_dead_worker_releases_the_slot() {
        let (tx, rx) = bounded(1);
        drop(rx);
        let handle = FlushHandle {
            tx,
            in_flight: Arc::new(AtomicBool::new(false)),
        };

        assert!(handle.try_begin());
        let result = handle.submit(job(Vec::new()));
        assert!(matches!(result, Err(FlushError::WorkerGone)));
        assert!(!handle.is_in_flight(), "slot must be released on failure");
    }
}
