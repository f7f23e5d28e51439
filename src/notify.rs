// Completion notifiers
//
// A notifier is told about each persisted clip. Delivery failures are the
// caller's to log; they never undo the artifact and never affect capture.

use std::time::Duration;

use crate::flush::ArtifactInfo;

/// Error type for notification delivery
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook delivery failed: {0}")]
    Http(String),
}

pub type Result<T> = std::result::Result<T, NotifyError>;

/// Downstream collaborator informed of each completed artifact.
pub trait Notifier: Send {
    fn notify(&self, artifact: &ArtifactInfo) -> Result<()>;
}

/// Notifier that records the artifact in the application log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, artifact: &ArtifactInfo) -> Result<()> {
        log::info!(
            "clip saved: {} ({:.2}s, {} frames, captured {})",
            artifact.path.display(),
            artifact.duration_seconds,
            artifact.frame_count,
            artifact.capture_time.to_rfc3339(),
        );
        Ok(())
    }
}

/// Notifier that POSTs artifact metadata to a webhook as JSON.
///
/// The payload carries when the clip was captured, how long it is, and
/// where it lives.
pub struct WebhookNotifier {
    url: String,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, artifact: &ArtifactInfo) -> Result<()> {
        let payload = serde_json::json!({
            "artifact_path": artifact.path,
            "capture_time": artifact.capture_time.to_rfc3339(),
            "duration_seconds": artifact.duration_seconds,
            "frame_count": artifact.frame_count,
        });
        let body =
            serde_json::to_string(&payload).map_err(|e| NotifyError::Http(e.to_string()))?;

        ureq::post(&self.url)
            .timeout(self.timeout)
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(|e| NotifyError::Http(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn artifact() -> ArtifactInfo {
        ArtifactInfo {
            path: PathBuf::from("/clips/clip_20260221_143245_678_000.mp4"),
            capture_time: Utc::now(),
            duration_seconds: 15.0,
            frame_count: 450,
        }
    }

    #[test]
    fn log_notifier_always_succeeds() {
        assert!(LogNotifier.notify(&artifact()).is_ok());
    }

    #[test]
    fn unreachable_webhook_reports_http_error() {
        // Reserved TEST-NET address; nothing listens there
        let notifier =
            WebhookNotifier::with_timeout("http://192.0.2.1:9/hook", Duration::from_millis(100));
        assert!(matches!(
            notifier.notify(&artifact()),
            Err(NotifyError::Http(_))
        ));
    }

    #[test]
    fn artifact_metadata_serializes_for_the_payload() {
        let json = serde_json::to_value(artifact()).unwrap();
        assert!(json["path"].is_string());
        assert_eq!(json["frame_count"], 450);
    }
}
