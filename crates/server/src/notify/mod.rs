//! Notification delivery.
//!
//! ## Submodules
//!
//! - `email` - SMTP delivery with HTML and plain-text bodies

pub mod email;

use std::future::Future;

use crate::error::NotifyError;
use crate::notification::Notification;

pub use email::{SmtpNotifier, UnsubscribeHeader, compose_message, email_links};

/// Delivers composed notifications.
pub trait Notifier: Sync {
    fn send(
        &self,
        notification: &Notification,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;

    /// Sends every notification in order; one failure does not stop the rest.
    fn send_batch<'a>(
        &'a self,
        notifications: &'a [Notification],
    ) -> impl Future<Output = Vec<Result<(), NotifyError>>> + Send + 'a {
        async move {
            let mut results = Vec::with_capacity(notifications.len());
            for notification in notifications {
                results.push(self.send(notification).await);
            }
            results
        }
    }
}

/// Logs notifications instead of sending them. Used for dry runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            name = "weather.notify.dry_run",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            recipient = %notification.recipient,
            fingerprint = %notification.fingerprint,
            kind = notification.kind.as_str(),
            message = "Would send notification"
        );
        Ok(())
    }
}
