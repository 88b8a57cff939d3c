//! Per-kind subscription evaluation.
//!
//! Every check follows the same shape: load the subscriptions of its kind,
//! resolve the subscriber and relay, evaluate the rule, queue a notification
//! on a fresh transition and write the rule state back.

use time::OffsetDateTime;

use super::{RunFailure, RunReport};
use crate::directory::{RelayDirectory, VersionStatus};
use crate::entity::{router, subscriber};
use crate::notification::{Notification, NotificationKind};
use crate::store::{Lookup, Store};
use crate::subscription::{NodeDownTransition, Subscription, SubscriptionKind, SubscriptionRule};

/// Outcome of a level-triggered rule (bandwidth, version) for one run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Edge {
    /// Condition present and not yet reported.
    Notify,
    /// Condition present, already reported.
    Suppressed,
    /// Condition absent; reporting is re-armed.
    Cleared,
}

/// Applies the emailed-flag bookkeeping shared by level-triggered rules.
pub fn level_edge(emailed: &mut bool, condition: bool) -> Edge {
    match (condition, *emailed) {
        (true, false) => {
            *emailed = true;
            Edge::Notify
        }
        (true, true) => Edge::Suppressed,
        (false, _) => {
            *emailed = false;
            Edge::Cleared
        }
    }
}

/// Loads the subscriptions of one kind, recording unreadable rows.
async fn load(store: &Store, kind: SubscriptionKind, report: &mut RunReport) -> Vec<Subscription> {
    match store.subscriptions_of_kind(kind).await {
        Ok((subs, invalid)) => {
            for e in invalid {
                report.record(RunFailure::store(format!("load {} row", kind.tag()), e));
            }
            subs
        }
        Err(e) => {
            report.record(RunFailure::store(format!("load {}", kind.tag()), e));
            Vec::new()
        }
    }
}

/// Resolves the subscriber and relay a subscription points at.
///
/// Returns `Ok(None)` when either is missing or the subscriber has not
/// confirmed their address; such subscriptions are left untouched.
async fn resolve(
    store: &Store,
    sub: &Subscription,
) -> Result<Option<(subscriber::Model, router::Model)>, RunFailure> {
    let subscriber = match store
        .find_subscriber(&sub.subscriber_id)
        .await
        .map_err(|e| RunFailure::store(format!("look up subscriber of {}", sub.id), e))?
    {
        Lookup::Found(subscriber) => subscriber,
        Lookup::NotFound => {
            tracing::warn!(
                name = "weather.checks.orphaned_subscription",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                subscription_id = %sub.id,
                message = "Subscription references a missing subscriber"
            );
            return Ok(None);
        }
    };

    if !subscriber.confirmed {
        return Ok(None);
    }

    match store
        .find_router(&sub.router_id)
        .await
        .map_err(|e| RunFailure::store(format!("look up router of {}", sub.id), e))?
    {
        Lookup::Found(router) => Ok(Some((subscriber, router))),
        Lookup::NotFound => {
            tracing::warn!(
                name = "weather.checks.missing_router",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                subscription_id = %sub.id,
                fingerprint = %sub.router_id,
                message = "Subscription references a relay that is no longer stored"
            );
            Ok(None)
        }
    }
}

async fn persist(store: &Store, sub: &Subscription) -> Result<(), RunFailure> {
    store
        .update_subscription(sub)
        .await
        .map_err(|e| RunFailure::store(format!("save subscription {}", sub.id), e))
}

/// Node-down rule: notify once the relay has been down for the grace period.
#[tracing::instrument(skip_all)]
pub async fn check_node_down(store: &Store, report: &mut RunReport, now: OffsetDateTime) {
    for mut sub in load(store, SubscriptionKind::NodeDown, report).await {
        if let Err(failure) = evaluate_node_down(store, &mut sub, report, now).await {
            report.record(failure);
        }
    }
}

async fn evaluate_node_down(
    store: &Store,
    sub: &mut Subscription,
    report: &mut RunReport,
    now: OffsetDateTime,
) -> Result<(), RunFailure> {
    let Some((subscriber, router)) = resolve(store, sub).await? else {
        return Ok(());
    };
    let SubscriptionRule::NodeDown(rule) = &mut sub.rule else {
        return Ok(());
    };

    let grace_pd_hours = rule.grace_pd_hours;
    let transition = rule.advance(&mut sub.emailed, router.up, now);
    if matches!(
        transition,
        NodeDownTransition::Idle | NodeDownTransition::Waiting
    ) {
        return Ok(());
    }

    persist(store, sub).await?;

    match transition {
        NodeDownTransition::Notify => {
            tracing::info!(
                name = "weather.checks.node_down",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                fingerprint = %router.fingerprint,
                subscription_id = %sub.id,
                message = "Relay down past grace period"
            );
            report.notifications.push(Notification::for_subscriber(
                &subscriber,
                &router,
                NotificationKind::NodeDown { grace_pd_hours },
            ));
        }
        NodeDownTransition::Recovered => tracing::info!(
            name = "weather.checks.node_recovered",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            fingerprint = %router.fingerprint,
            subscription_id = %sub.id,
            message = "Relay is back up"
        ),
        _ => {}
    }
    Ok(())
}

/// Version rule: notify when the directory classifies the relay's Tor version
/// as the subscription's notify type.
#[tracing::instrument(skip_all)]
pub async fn check_version<D: RelayDirectory>(store: &Store, directory: &D, report: &mut RunReport) {
    for mut sub in load(store, SubscriptionKind::OutdatedVersion, report).await {
        if let Err(failure) = evaluate_version(store, directory, &mut sub, report).await {
            report.record(failure);
        }
    }
}

async fn evaluate_version<D: RelayDirectory>(
    store: &Store,
    directory: &D,
    sub: &mut Subscription,
    report: &mut RunReport,
) -> Result<(), RunFailure> {
    let Some((subscriber, router)) = resolve(store, sub).await? else {
        return Ok(());
    };
    let SubscriptionRule::OutdatedVersion { notify_type } = &sub.rule else {
        return Ok(());
    };

    let status = directory.version_status(&router.fingerprint);
    if status == VersionStatus::Error {
        tracing::info!(
            name = "weather.checks.version_unparsed",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            fingerprint = %router.fingerprint,
            message = "Couldn't parse the version the relay is running"
        );
        return Ok(());
    }

    let was_emailed = sub.emailed;
    let edge = level_edge(&mut sub.emailed, status.matches(notify_type));
    if sub.emailed != was_emailed {
        persist(store, sub).await?;
    }
    if edge == Edge::Notify {
        report.notifications.push(Notification::for_subscriber(
            &subscriber,
            &router,
            NotificationKind::OutdatedVersion {
                version_type: status.as_str().to_string(),
            },
        ));
    }
    Ok(())
}

/// Bandwidth rule: notify when observed bandwidth falls below the threshold.
#[tracing::instrument(skip_all)]
pub async fn check_low_bandwidth<D: RelayDirectory>(
    store: &Store,
    directory: &D,
    report: &mut RunReport,
) {
    for mut sub in load(store, SubscriptionKind::LowBandwidth, report).await {
        if let Err(failure) = evaluate_bandwidth(store, directory, &mut sub, report).await {
            report.record(failure);
        }
    }
}

async fn evaluate_bandwidth<D: RelayDirectory>(
    store: &Store,
    directory: &D,
    sub: &mut Subscription,
    report: &mut RunReport,
) -> Result<(), RunFailure> {
    let Some((subscriber, router)) = resolve(store, sub).await? else {
        return Ok(());
    };
    let SubscriptionRule::LowBandwidth { threshold_kbs } = sub.rule else {
        return Ok(());
    };

    let Some(observed_kbs) = directory.bandwidth_kbs(&router.fingerprint) else {
        tracing::debug!(
            name = "weather.checks.bandwidth_unknown",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            fingerprint = %router.fingerprint,
            message = "No bandwidth measurement for relay"
        );
        return Ok(());
    };

    let threshold = u64::try_from(threshold_kbs).unwrap_or(0);
    let was_emailed = sub.emailed;
    let edge = level_edge(&mut sub.emailed, observed_kbs < threshold);
    if sub.emailed != was_emailed {
        persist(store, sub).await?;
    }
    if edge == Edge::Notify {
        report.notifications.push(Notification::for_subscriber(
            &subscriber,
            &router,
            NotificationKind::LowBandwidth {
                observed_kbs,
                threshold_kbs,
            },
        ));
    }
    Ok(())
}

/// DNS failure detection is not implemented; subscriptions of this kind are
/// accepted and kept but never fire.
#[tracing::instrument(skip_all)]
pub async fn check_dns_failure<D: RelayDirectory>(
    _store: &Store,
    _directory: &D,
    _report: &mut RunReport,
) {
}

/// Runs every subscription check in order.
pub async fn check_all_subs<D: RelayDirectory>(
    store: &Store,
    directory: &D,
    report: &mut RunReport,
    now: OffsetDateTime,
) {
    check_node_down(store, report, now).await;
    check_version(store, directory, report).await;
    check_low_bandwidth(store, directory, report).await;
    check_dns_failure(store, directory, report).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_edge_suppresses_duplicates() {
        let mut emailed = false;
        assert_eq!(level_edge(&mut emailed, true), Edge::Notify);
        assert!(emailed);
        assert_eq!(level_edge(&mut emailed, true), Edge::Suppressed);
        assert_eq!(level_edge(&mut emailed, false), Edge::Cleared);
        assert!(!emailed);
        assert_eq!(level_edge(&mut emailed, true), Edge::Notify);
    }

    #[test]
    fn clearing_an_unset_flag_is_harmless() {
        let mut emailed = false;
        assert_eq!(level_edge(&mut emailed, false), Edge::Cleared);
        assert!(!emailed);
    }
}
