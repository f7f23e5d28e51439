// Hindsight - replay-buffer camera daemon
// Main library entry point

pub mod capture;
pub mod config;
pub mod encoding;
pub mod flush;
pub mod notify;
pub mod trigger;

pub use capture::{CaptureService, CaptureStats, CaptureStatus};
pub use config::Config;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use capture::source::FrameSource;
use encoding::ClipEncoder;
use flush::FlushWorker;
use notify::Notifier;
use trigger::TriggerSource;

/// Wire the capture loop, flush worker, encoder and notifier together and
/// run until the stop flag is raised or capture fails fatally.
///
/// The flush worker is always shut down before returning - waiting out any
/// in-flight flush - regardless of how the capture loop exited.
pub fn run_pipeline(
    config: &Config,
    mut source: Box<dyn FrameSource>,
    mut trigger: Box<dyn TriggerSource>,
    encoder: Box<dyn ClipEncoder>,
    notifier: Box<dyn Notifier>,
    stop: Arc<AtomicBool>,
) -> anyhow::Result<CaptureStats> {
    let worker = FlushWorker::spawn(
        config.storage_path.clone(),
        config.codec,
        encoder,
        notifier,
    )?;

    let mut service = CaptureService::new(config.clone(), stop);
    let result = service.run(source.as_mut(), trigger.as_mut(), worker.handle());

    worker.shutdown();

    Ok(result?)
}
