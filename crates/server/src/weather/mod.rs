//! The periodic weather run.
//!
//! One run refreshes the relay table from the directory, evaluates every
//! subscription, hands the queued notifications to a [`Notifier`] and logs
//! what was delivered.
//!
//! ## Submodules
//!
//! - `reconcile` - relay table refresh and welcome notifications
//! - `checks` - per-kind subscription rules

pub mod checks;
pub mod reconcile;

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::AppResources;
use crate::directory::{OnionooClient, RelayDirectory};
use crate::error::{NotifyError, StoreError};
use crate::notification::Notification;
use crate::notify::Notifier;
use crate::store::Store;

pub use checks::{
    check_all_subs, check_dns_failure, check_low_bandwidth, check_node_down, check_version,
};
pub use reconcile::update_all_routers;

/// A per-record failure. The run carries on past these and reports them at the end.
#[derive(Debug, Error)]
pub enum RunFailure {
    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },
    #[error("delivering {kind} notification to {recipient}: {source}")]
    Delivery {
        recipient: String,
        kind: &'static str,
        #[source]
        source: NotifyError,
    },
}

impl RunFailure {
    pub fn store(context: impl Into<String>, source: StoreError) -> Self {
        RunFailure::Store {
            context: context.into(),
            source,
        }
    }
}

/// Everything one run did.
#[derive(Debug, Default)]
pub struct RunReport {
    pub notifications: Vec<Notification>,
    pub delivered: usize,
    pub routers_created: usize,
    pub routers_marked_down: usize,
    pub routers_deleted: usize,
    pub failures: Vec<RunFailure>,
}

impl RunReport {
    pub fn record(&mut self, failure: RunFailure) {
        tracing::warn!(
            name = "weather.run.record_failed",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            error = %failure,
            message = "Record failed, continuing"
        );
        self.failures.push(failure);
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Logs a one-line summary plus every failure.
    pub fn log_summary(&self) {
        tracing::info!(
            name = "weather.run.finished",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            notifications = self.notifications.len(),
            delivered = self.delivered,
            routers_created = self.routers_created,
            routers_marked_down = self.routers_marked_down,
            routers_deleted = self.routers_deleted,
            failures = self.failures.len(),
            message = "Weather run finished"
        );
        for failure in &self.failures {
            tracing::error!(
                name = "weather.run.failure",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %failure,
                message = "Record failed during run"
            );
        }
    }
}

/// Reconciles relays and evaluates subscriptions without delivering anything.
pub async fn evaluate<D: RelayDirectory>(
    resources: &AppResources,
    directory: &D,
    now: OffsetDateTime,
) -> RunReport {
    let mut report = RunReport::default();
    update_all_routers(
        &resources.store,
        directory,
        &resources.config.weather,
        &mut report,
        now,
    )
    .await;
    check_all_subs(&resources.store, directory, &mut report, now).await;
    report
}

/// Hands queued notifications to the notifier and logs the ones that went out.
pub async fn deliver<N: Notifier>(
    store: &Store,
    notifier: &N,
    report: &mut RunReport,
    now: OffsetDateTime,
) {
    let results = notifier.send_batch(&report.notifications).await;
    let mut failures = Vec::new();

    for (notification, result) in report.notifications.iter().zip(results) {
        match result {
            Ok(()) => {
                report.delivered += 1;
                if let Err(e) = store.log_email(notification, now).await {
                    failures.push(RunFailure::store(
                        format!("log email to {}", notification.recipient),
                        e,
                    ));
                }
            }
            Err(source) => failures.push(RunFailure::Delivery {
                recipient: notification.recipient.clone(),
                kind: notification.kind.as_str(),
                source,
            }),
        }
    }

    for failure in failures {
        report.record(failure);
    }
}

/// One complete run, serialised against any other run sharing `resources`.
#[tracing::instrument(skip_all, fields(now = %now))]
pub async fn run_once<D: RelayDirectory, N: Notifier>(
    resources: &AppResources,
    directory: &D,
    notifier: &N,
    now: OffsetDateTime,
) -> RunReport {
    let _guard = resources.run_lock.lock().await;
    let mut report = evaluate(resources, directory, now).await;
    deliver(&resources.store, notifier, &mut report, now).await;
    report
}

/// Fetches the directory and runs forever on the configured interval.
///
/// A failed directory fetch skips that run; stored state is left as it was.
#[tracing::instrument(skip_all)]
pub async fn recurring_weather_checks<N: Notifier>(
    resources: Arc<AppResources>,
    client: OnionooClient,
    notifier: N,
) {
    let mut ticker = interval(Duration::from_secs(
        resources.config.weather.check_interval_secs,
    ));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        run_with_fresh_directory(&resources, &client, &notifier).await;
    }
}

/// Fetches a snapshot and performs one run with it.
pub async fn run_with_fresh_directory<N: Notifier>(
    resources: &AppResources,
    client: &OnionooClient,
    notifier: &N,
) -> Option<RunReport> {
    match client.fetch_snapshot().await {
        Ok(snapshot) => {
            let report = run_once(resources, &snapshot, notifier, OffsetDateTime::now_utc()).await;
            report.log_summary();
            Some(report)
        }
        Err(e) if e.is_retryable() => {
            tracing::warn!(
                name = "weather.run.directory_unavailable",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Relay directory unavailable, skipping this run"
            );
            None
        }
        Err(e) => {
            tracing::error!(
                name = "weather.run.directory_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Failed to fetch relay directory, skipping this run"
            );
            None
        }
    }
}
