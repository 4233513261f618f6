//! Licensing events and the observer they are reported to.
//!
//! The licensing core never configures logging itself. Components receive
//! an [`Observer`] handle; the default [`TracingObserver`] forwards events
//! to whatever `tracing` subscriber the host application installed.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, info_span, warn};

/// Licensing lifecycle event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    /// A hardware profile was collected and hashed
    FingerprintCollected,
    /// A single hardware probe produced no value
    ProbeFailed,
    /// A new shared secret was generated and written to disk
    SecretGenerated,
    /// A license record was created and signed
    Issued,
    /// A signed record was sealed to disk
    Sealed,
    /// A sealed license was read and unsealed
    Loaded,
    /// Validation passed every check
    Validated,
    /// Validation stopped at a failing check
    ValidationFailed,
    /// A debugger or tracer is attached to the process
    TracerDetected,
}

impl fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LicenseEvent::FingerprintCollected => "fingerprint_collected",
            LicenseEvent::ProbeFailed => "probe_failed",
            LicenseEvent::SecretGenerated => "secret_generated",
            LicenseEvent::Issued => "issued",
            LicenseEvent::Sealed => "sealed",
            LicenseEvent::Loaded => "loaded",
            LicenseEvent::Validated => "validated",
            LicenseEvent::ValidationFailed => "validation_failed",
            LicenseEvent::TracerDetected => "tracer_detected",
        };
        write!(f, "{}", s)
    }
}

/// Receives licensing events.
///
/// `subject` identifies what the event is about (a hardware id, a file
/// path, a probe name). Implementations must never be handed key
/// material or signatures, and must not panic.
pub trait LicenseObserver: Send + Sync {
    fn on_event(&self, event: LicenseEvent, subject: &str, details: Option<&str>);
}

/// Shared observer handle passed to collectors, issuers and validators.
pub type Observer = Arc<dyn LicenseObserver>;

/// Structured `tracing` output, one span per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LicenseObserver for TracingObserver {
    fn on_event(&self, event: LicenseEvent, subject: &str, details: Option<&str>) {
        let span = info_span!("license_event", event = %event, subject = %subject);
        let _enter = span.enter();

        match event {
            LicenseEvent::ProbeFailed => {
                debug!(details = details.unwrap_or(""), "Hardware probe returned nothing");
            }
            LicenseEvent::ValidationFailed | LicenseEvent::TracerDetected => {
                if let Some(d) = details {
                    warn!(reason = %d, "License event occurred");
                } else {
                    warn!("License event occurred");
                }
            }
            _ => {
                if let Some(d) = details {
                    info!(details = %d, "License event occurred");
                } else {
                    info!("License event occurred");
                }
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl LicenseObserver for NoopObserver {
    fn on_event(&self, _event: LicenseEvent, _subject: &str, _details: Option<&str>) {}
}

/// The default observer handle.
pub fn tracing_observer() -> Observer {
    Arc::new(TracingObserver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<(LicenseEvent, String)>>);

    impl LicenseObserver for Recording {
        fn on_event(&self, event: LicenseEvent, subject: &str, _details: Option<&str>) {
            self.0.lock().unwrap().push((event, subject.to_string()));
        }
    }

    #[test]
    fn event_names_are_snake_case() {
        assert_eq!(LicenseEvent::ValidationFailed.to_string(), "validation_failed");
        assert_eq!(LicenseEvent::FingerprintCollected.to_string(), "fingerprint_collected");
    }

    #[test]
    fn observers_are_object_safe_and_shareable() {
        let recording = Arc::new(Recording::default());
        let observer: Observer = recording.clone();
        observer.on_event(LicenseEvent::Issued, "abc123", None);

        let seen = recording.0.lock().unwrap();
        assert_eq!(seen.as_slice(), &[(LicenseEvent::Issued, "abc123".to_string())]);
    }

    #[test]
    fn tracing_observer_without_subscriber_is_silent() {
        TracingObserver.on_event(LicenseEvent::ValidationFailed, "x", Some("expired"));
        NoopObserver.on_event(LicenseEvent::Validated, "x", None);
    }
}
