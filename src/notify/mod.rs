//! Operator alerting.
//!
//! # Data Flow
//! ```text
//! ClassifiedError (operational)
//!     → gate.rs (per-kind cooldown, stamp under lock)
//!     → alert.rs (render Alert, pure)
//!     → Notifier (slack.rs webhook, or LogNotifier)
//! ```
//!
//! # Design Decisions
//! - Delivery failures are logged, never surfaced to the HTTP caller
//! - Suppression only throttles the operator channel, never the response

pub mod alert;
pub mod gate;
pub mod slack;

use async_trait::async_trait;
use thiserror::Error;

pub use alert::{render_alert, Alert, AlertContext, AlertField};
pub use gate::{NotificationGate, NotifyOutcome};
pub use slack::SlackNotifier;

/// Alert delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Request(String),

    #[error("webhook returned status {0}")]
    Status(u16),
}

/// Delivers alerts to operators.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Notifier that only writes alerts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let fields = alert
            .fields
            .iter()
            .map(|f| format!("{}={}", f.label, f.value))
            .collect::<Vec<_>>()
            .join("; ");
        tracing::warn!(header = %alert.header, context = %alert.context, fields = %fields, "Operator alert");
        Ok(())
    }
}
