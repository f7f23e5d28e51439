// Capture loop - cadenced frame acquisition with trigger polling
//
// Owns the ring buffer and the capture state machine. On a trigger edge the
// ring contents are snapshotted under the lock and moved into the flush
// worker's channel; capture itself never blocks on encoding and keeps
// filling the window while a flush runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::Config;
use crate::flush::{FlushHandle, FlushJob};
use crate::trigger::TriggerSource;

use super::frame::Frame;
use super::ring::FrameRing;
use super::source::{FrameSource, SourceInfo};
use super::{CaptureError, CaptureStatus, Result};

/// Delay between retries after a failed frame read
const READ_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Counters describing one capture run
#[derive(Debug, Clone, Default)]
pub struct CaptureStats {
    /// Frames appended to the ring (warm-up reads excluded)
    pub frames_captured: u64,
    /// Warm-up reads discarded while the sensor stabilized
    pub frames_discarded: u64,
    /// Total failed reads, transient or not
    pub read_failures: u64,
    /// Trigger edges observed
    pub triggers_fired: u64,
    /// Trigger edges dropped because a flush was already in flight
    pub triggers_dropped: u64,
    /// Delivered rate measured over the whole run
    pub measured_fps: f64,
}

/// Runs the capture state machine: Idle -> Opening -> Capturing -> Draining
/// -> Closed. The source is released on every exit path.
pub struct CaptureService {
    config: Config,
    stop: Arc<AtomicBool>,
    status: CaptureStatus,
    ring: Option<Arc<Mutex<FrameRing>>>,
}

impl CaptureService {
    pub fn new(config: Config, stop: Arc<AtomicBool>) -> Self {
        Self {
            config,
            stop,
            status: CaptureStatus::Idle,
            ring: None,
        }
    }

    pub fn status(&self) -> CaptureStatus {
        self.status
    }

    /// Handle to the ring buffer while capture is running.
    pub fn ring(&self) -> Option<Arc<Mutex<FrameRing>>> {
        self.ring.clone()
    }

    /// Run until the stop flag is raised or capture fails fatally.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        trigger: &mut dyn TriggerSource,
        flush: FlushHandle,
    ) -> Result<CaptureStats> {
        self.transition(CaptureStatus::Opening);

        let info = match source.open() {
            Ok(info) => info,
            Err(first) => {
                log::warn!("source open failed ({first}), trying fallback acquisition mode");
                match source.open_fallback() {
                    Ok(info) => info,
                    Err(second) => {
                        log::error!("fallback acquisition failed: {second}");
                        source.close();
                        self.transition(CaptureStatus::Closed);
                        return Err(CaptureError::SourceUnavailable(first));
                    }
                }
            }
        };

        let ring = match FrameRing::for_window(info.fps, self.config.buffer_secs) {
            Ok(ring) => Arc::new(Mutex::new(ring)),
            Err(e) => {
                source.close();
                self.transition(CaptureStatus::Closed);
                return Err(e);
            }
        };

        log::info!(
            "capturing {}x{} @ {} fps, window {:.1}s ({} frames)",
            info.width,
            info.height,
            info.fps,
            self.config.buffer_secs,
            ring.lock().capacity(),
        );

        self.ring = Some(ring.clone());
        self.transition(CaptureStatus::Capturing);

        let result = self.capture_frames(source, trigger, &ring, &flush, info);

        self.transition(CaptureStatus::Draining);
        source.close();
        self.ring = None;
        self.transition(CaptureStatus::Closed);

        result
    }

    /// Steady-state loop: one frame per cycle, trigger polled per cycle,
    /// stop flag observed within one cycle.
    fn capture_frames(
        &mut self,
        source: &mut dyn FrameSource,
        trigger: &mut dyn TriggerSource,
        ring: &Arc<Mutex<FrameRing>>,
        flush: &FlushHandle,
        info: SourceInfo,
    ) -> Result<CaptureStats> {
        let period = Duration::from_secs_f64(1.0 / info.fps);
        let status_log_every = Duration::from_secs(self.config.status_log_secs);

        let mut stats = CaptureStats::default();
        let mut seq = 0u64;
        let mut consecutive_failures = 0u32;
        let mut first_frame_at: Option<Instant> = None;
        let mut last_frame_at = Instant::now();
        let mut last_status_log = Instant::now();

        while !self.stop.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();

            let pixels = match source.read() {
                Ok(pixels) => {
                    consecutive_failures = 0;
                    pixels
                }
                Err(e) => {
                    consecutive_failures += 1;
                    stats.read_failures += 1;
                    log::warn!(
                        "frame read failed ({e}), attempt {consecutive_failures}/{}",
                        self.config.max_read_failures
                    );
                    if consecutive_failures >= self.config.max_read_failures {
                        return Err(CaptureError::ReadStalled {
                            failures: consecutive_failures,
                        });
                    }
                    std::thread::sleep(READ_RETRY_BACKOFF);
                    continue;
                }
            };

            // Sensor warm-up: these reads never enter the buffer and never
            // receive a sequence number.
            if stats.frames_discarded < self.config.warmup_frames as u64 {
                stats.frames_discarded += 1;
                continue;
            }

            seq += 1;
            let now = Instant::now();
            first_frame_at.get_or_insert(now);
            last_frame_at = now;

            let frame = Frame {
                seq,
                width: info.width,
                height: info.height,
                data: pixels,
                captured_at: now,
            };

            let fired = trigger.poll(&frame);
            ring.lock().append(frame);
            stats.frames_captured += 1;

            if fired {
                stats.triggers_fired += 1;
                if !self.request_flush(ring, flush, info) {
                    stats.triggers_dropped += 1;
                }
            }

            if self.config.status_log_secs > 0 && last_status_log.elapsed() >= status_log_every {
                let (len, cap, ratio) = {
                    let r = ring.lock();
                    (r.len(), r.capacity(), r.fill_ratio())
                };
                log::info!(
                    "buffer {len}/{cap} frames ({:.0}%), {} captured total",
                    ratio * 100.0,
                    stats.frames_captured
                );
                last_status_log = Instant::now();
            }

            let elapsed = cycle_start.elapsed();
            if elapsed < period {
                std::thread::sleep(period - elapsed);
            }
        }

        stats.measured_fps = match first_frame_at {
            Some(first) if stats.frames_captured > 1 => {
                let span = last_frame_at.duration_since(first).as_secs_f64();
                if span > 0.0 {
                    (stats.frames_captured - 1) as f64 / span
                } else {
                    info.fps
                }
            }
            _ => info.fps,
        };

        Ok(stats)
    }

    /// Claim the in-flight slot and hand a snapshot to the flush worker.
    /// Returns false when a flush is already running; the trigger is
    /// dropped, never queued.
    fn request_flush(
        &self,
        ring: &Arc<Mutex<FrameRing>>,
        flush: &FlushHandle,
        info: SourceInfo,
    ) -> bool {
        if !flush.try_begin() {
            log::info!("flush already in flight, trigger dropped");
            return false;
        }

        let frames = ring.lock().snapshot();
        log::info!("trigger accepted, flushing {} buffered frames", frames.len());

        let job = FlushJob {
            frames,
            nominal_fps: info.fps,
            width: info.width,
            height: info.height,
            requested_at: chrono::Utc::now(),
        };

        if let Err(e) = flush.submit(job) {
            log::error!("flush handoff failed: {e}");
            return false;
        }
        true
    }

    fn transition(&mut self, next: CaptureStatus) {
        log::debug!("capture state: {} -> {}", self.status.as_str(), next.as_str());
        self.status = next;
    }
}
