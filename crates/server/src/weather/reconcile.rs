//! Relay table reconciliation.
//!
//! Diffs the directory snapshot against the `router` table: forgets relays
//! unseen for too long, marks the rest of the unseen ones down, refreshes the
//! seen ones and welcomes newly stable relays.

use std::collections::HashSet;

use time::{Duration, OffsetDateTime};

use super::{RunFailure, RunReport};
use crate::config::WeatherConfig;
use crate::directory::RelayDirectory;
use crate::entity::router;
use crate::notification::Notification;
use crate::store::{Lookup, Store};

/// Whether the deployment grace window has passed.
pub fn is_fully_deployed(deployed: OffsetDateTime, now: OffsetDateTime, grace: Duration) -> bool {
    now - deployed >= grace
}

/// Whether a relay last seen at `last_seen` should be deleted.
pub fn is_expired(last_seen: OffsetDateTime, now: OffsetDateTime, retention: Duration) -> bool {
    now - last_seen > retention
}

/// Refreshes the relay table from the directory and queues welcome notifications.
#[tracing::instrument(skip_all)]
pub async fn update_all_routers<D: RelayDirectory>(
    store: &Store,
    directory: &D,
    config: &WeatherConfig,
    report: &mut RunReport,
    now: OffsetDateTime,
) {
    let fully_deployed = match store.deployed_at_or_init(now).await {
        Ok(deployed) => {
            is_fully_deployed(deployed, now, Duration::hours(config.deploy_grace_hours))
        }
        Err(e) => {
            // Without the deployment stamp we cannot tell whether welcoming is safe.
            report.record(RunFailure::store("deployment record", e));
            false
        }
    };

    let seen: Vec<(String, String)> = directory
        .list_known_relays()
        .into_iter()
        .filter(|(fingerprint, _)| directory.is_up_or_hibernating(fingerprint))
        .collect();
    let seen_fingerprints: HashSet<&str> = seen.iter().map(|(fp, _)| fp.as_str()).collect();

    age_unseen_routers(store, &seen_fingerprints, config, report, now).await;

    for (fingerprint, name) in &seen {
        if let Err(failure) =
            refresh_router(store, directory, fingerprint, name, fully_deployed, report, now).await
        {
            report.record(failure);
        }
    }
}

async fn age_unseen_routers(
    store: &Store,
    seen: &HashSet<&str>,
    config: &WeatherConfig,
    report: &mut RunReport,
    now: OffsetDateTime,
) {
    let routers = match store.all_routers().await {
        Ok(routers) => routers,
        Err(e) => {
            report.record(RunFailure::store("router scan", e));
            return;
        }
    };
    let retention = Duration::days(config.relay_retention_days);

    for router in routers {
        if seen.contains(router.fingerprint.as_str()) {
            continue;
        }

        if is_expired(router.last_seen, now, retention) {
            match store.delete_router(&router.fingerprint).await {
                Ok(()) => {
                    report.routers_deleted += 1;
                    tracing::info!(
                        name = "weather.reconcile.router_deleted",
                        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                        fingerprint = %router.fingerprint,
                        last_seen = %router.last_seen,
                        message = "Forgot relay unseen past retention"
                    );
                }
                Err(e) => report.record(RunFailure::store(
                    format!("delete router {}", router.fingerprint),
                    e,
                )),
            }
        } else if router.up {
            match store.mark_router_down(&router.fingerprint).await {
                Ok(()) => report.routers_marked_down += 1,
                Err(e) => report.record(RunFailure::store(
                    format!("mark router {} down", router.fingerprint),
                    e,
                )),
            }
        }
    }
}

async fn refresh_router<D: RelayDirectory>(
    store: &Store,
    directory: &D,
    fingerprint: &str,
    name: &str,
    fully_deployed: bool,
    report: &mut RunReport,
    now: OffsetDateTime,
) -> Result<(), RunFailure> {
    let mut created = false;
    let mut router = match store
        .find_router(fingerprint)
        .await
        .map_err(|e| RunFailure::store(format!("look up router {fingerprint}"), e))?
    {
        Lookup::Found(router) => router,
        Lookup::NotFound => {
            created = true;
            // Relays already running when the service is first deployed are
            // treated as welcomed so the first runs do not mail everyone.
            router::Model {
                fingerprint: fingerprint.to_string(),
                name: name.to_string(),
                welcomed: !fully_deployed,
                last_seen: now,
                up: true,
                exit: false,
                subscriber_id: None,
            }
        }
    };

    router.last_seen = now;
    router.name = name.to_string();
    router.up = true;
    router.exit = directory.is_exit(fingerprint);

    let mut welcome = None;
    if !router.welcomed && directory.is_stable(fingerprint) {
        match directory.contact_email(fingerprint) {
            Some(recipient) => {
                welcome = Some(Notification::welcome(
                    &recipient,
                    fingerprint,
                    name,
                    router.exit,
                ));
            }
            None => tracing::debug!(
                name = "weather.reconcile.no_contact",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                fingerprint = %fingerprint,
                message = "Stable relay has no usable contact address, skipping welcome"
            ),
        }
        router.welcomed = true;
    }

    store
        .upsert_router(&router)
        .await
        .map_err(|e| RunFailure::store(format!("save router {fingerprint}"), e))?;

    if created {
        report.routers_created += 1;
    }
    // Only queue the welcome once the welcomed flag is durable.
    if let Some(notification) = welcome {
        report.notifications.push(notification);
    }
    Ok(())
}
