//! Per-kind alert throttling.
//!
//! At most one alert per [`ErrorKind`] is forwarded in any cooldown interval.
//! The timestamp is stamped before delivery, so a failed delivery still
//! counts and a flapping webhook cannot cause an alert storm.
//!
//! Delivery runs on its own task. The caller never waits for the webhook;
//! [`NotificationGate::flush`] waits for whatever is still in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;

use crate::clock::{Clock, Millis};
use crate::errors::{ClassifiedError, ErrorKind};
use crate::notify::{render_alert, AlertContext, Notifier};
use crate::observability::metrics;

/// Whether an alert was forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    Suppressed,
}

pub struct NotificationGate {
    notifier: Arc<dyn Notifier>,
    context: AlertContext,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
    last_sent: Mutex<HashMap<ErrorKind, Millis>>,
    deliveries: Mutex<JoinSet<()>>,
}

impl NotificationGate {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        context: AlertContext,
        cooldown: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            notifier,
            context,
            cooldown,
            clock,
            last_sent: Mutex::new(HashMap::new()),
            deliveries: Mutex::new(JoinSet::new()),
        }
    }

    /// When an alert of `kind` was last forwarded.
    pub fn last_sent(&self, kind: ErrorKind) -> Option<Millis> {
        self.last_sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .copied()
    }

    /// Forward `error` to operators unless its kind was alerted recently.
    ///
    /// `Sent` means delivery was started; its result is only logged.
    pub fn maybe_notify(&self, error: &ClassifiedError) -> NotifyOutcome {
        let kind = error.kind();
        let now = self.clock.now_ms();
        let cooldown_ms = self.cooldown.as_millis() as Millis;

        {
            let mut last_sent = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(&last) = last_sent.get(&kind) {
                if now.saturating_sub(last) < cooldown_ms {
                    tracing::debug!(kind = kind.as_str(), "Alert suppressed");
                    metrics::record_alert(kind.as_str(), "suppressed");
                    return NotifyOutcome::Suppressed;
                }
            }
            last_sent.insert(kind, now);
        }

        let alert = render_alert(error, &self.context);
        let notifier = self.notifier.clone();
        let delivery = async move {
            match notifier.send(&alert).await {
                Ok(()) => {
                    tracing::info!(kind = kind.as_str(), "Alert sent");
                    metrics::record_alert(kind.as_str(), "sent");
                }
                Err(e) => {
                    tracing::error!(kind = kind.as_str(), error = %e, "Alert delivery failed");
                    metrics::record_alert(kind.as_str(), "failed");
                }
            }
        };

        let mut deliveries = self.deliveries.lock().unwrap_or_else(PoisonError::into_inner);
        while deliveries.try_join_next().is_some() {}
        deliveries.spawn(delivery);
        NotifyOutcome::Sent
    }

    /// Wait until every started delivery has finished.
    pub async fn flush(&self) {
        let mut pending = std::mem::take(
            &mut *self.deliveries.lock().unwrap_or_else(PoisonError::into_inner),
        );
        while pending.join_next().await.is_some() {}
    }
}
