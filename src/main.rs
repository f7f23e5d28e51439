// Hindsight - replay-buffer camera daemon
//
// Keeps the last few seconds of camera video in memory. ENTER on stdin
// saves the buffered window as a clip; the stop key or Ctrl-C shuts down
// cleanly, letting an in-flight save finish.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hindsight::capture::source::{CameraRequest, FfmpegCameraSource, FrameSource, SyntheticSource};
use hindsight::encoding::FfmpegEncoder;
use hindsight::notify::{LogNotifier, Notifier, WebhookNotifier};
use hindsight::trigger::{FlagTrigger, TriggerHandle};
use hindsight::Config;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut config_path: Option<PathBuf> = None;
    let mut synthetic = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = args.next().map(PathBuf::from),
            "--synthetic" => synthetic = true,
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other => anyhow::bail!("unknown argument: {other} (try --help)"),
        }
    }

    let config = Config::load_or_default(config_path.as_deref());
    config.validate()?;

    let stop = Arc::new(AtomicBool::new(false));
    let (trigger, trigger_handle) = FlagTrigger::new();

    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
        })?;
    }

    spawn_stdin_reader(trigger_handle, stop.clone(), config.stop_key);

    println!(
        "hindsight: replay buffer @ {} fps, {:.0}s window, clips in {}",
        config.fps,
        config.buffer_secs,
        config.storage_path.display()
    );
    println!(
        "press ENTER to save a clip, '{}' then ENTER (or Ctrl-C) to quit",
        config.stop_key
    );

    let source: Box<dyn FrameSource> = if synthetic {
        Box::new(SyntheticSource::new(
            config.frame_width,
            config.frame_height,
            config.fps,
        ))
    } else {
        Box::new(FfmpegCameraSource::new(CameraRequest {
            index: config.camera_index,
            width: config.frame_width,
            height: config.frame_height,
            fps: config.fps,
        }))
    };

    let encoder = Box::new(FfmpegEncoder::new(config.codec));
    let notifier: Box<dyn Notifier> = match &config.webhook_url {
        Some(url) => Box::new(WebhookNotifier::new(url.clone())),
        None => Box::new(LogNotifier),
    };

    let stats = hindsight::run_pipeline(
        &config,
        source,
        Box::new(trigger),
        encoder,
        notifier,
        stop,
    )?;

    println!(
        "captured {} frames ({:.1} fps measured), {} trigger(s), {} dropped",
        stats.frames_captured, stats.measured_fps, stats.triggers_fired, stats.triggers_dropped
    );

    Ok(())
}

/// ENTER fires the trigger; a line starting with the stop key quits.
fn spawn_stdin_reader(trigger: TriggerHandle, stop: Arc<AtomicBool>, stop_key: char) {
    std::thread::Builder::new()
        .name("hindsight-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    trigger.fire();
                } else if trimmed.chars().next() == Some(stop_key) {
                    stop.store(true, Ordering::Relaxed);
                    break;
                }
            }
        })
        .expect("failed to spawn stdin reader");
}

fn print_usage() {
    println!("usage: hindsight [--config <path>] [--synthetic]");
    println!("  --config <path>  read configuration from <path>");
    println!("  --synthetic      use the synthetic frame source instead of a camera");
}
