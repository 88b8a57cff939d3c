//! Typed view over the `subscription` table.
//!
//! Rows carry a kind tag plus a handful of nullable columns. [`Subscription`]
//! turns them into a [`SubscriptionRule`] sum type so the evaluator can match
//! on the variant instead of probing columns.

use sea_orm::ActiveValue;
use time::{Duration, OffsetDateTime};

use crate::entity::subscription;
use crate::error::StoreError;

/// Column default for bandwidth subscriptions, in KB/s.
pub const DEFAULT_BANDWIDTH_THRESHOLD: i32 = 20;
/// Column default for version subscriptions.
pub const DEFAULT_NOTIFY_TYPE: &str = "OBSOLETE";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    NodeDown,
    OutdatedVersion,
    LowBandwidth,
    DnsFailure,
}

impl SubscriptionKind {
    pub const ALL: [SubscriptionKind; 4] = [
        SubscriptionKind::NodeDown,
        SubscriptionKind::OutdatedVersion,
        SubscriptionKind::LowBandwidth,
        SubscriptionKind::DnsFailure,
    ];

    /// Value stored in the `type` column.
    pub fn tag(self) -> &'static str {
        match self {
            SubscriptionKind::NodeDown => "nodedownsub",
            SubscriptionKind::OutdatedVersion => "outdatedversionsub",
            SubscriptionKind::LowBandwidth => "bandwithsub",
            SubscriptionKind::DnsFailure => "dnsfailsub",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

/// State of a node-down rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeDownRule {
    /// The relay has been seen down and the grace period clock is running.
    pub triggered: bool,
    pub grace_pd_hours: i32,
    pub last_changed: Option<OffsetDateTime>,
}

/// What happened to a node-down rule during one evaluation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeDownTransition {
    /// Nothing changed.
    Idle,
    /// The relay just went down; the grace period starts now.
    Triggered,
    /// Still down but inside the grace period, or already emailed.
    Waiting,
    /// Grace period elapsed; a notification is due.
    Notify,
    /// The relay came back.
    Recovered,
}

impl NodeDownRule {
    pub fn grace_period(&self) -> Duration {
        Duration::hours(i64::from(self.grace_pd_hours.max(0)))
    }

    /// Advances the rule for the current relay state.
    ///
    /// `emailed` is the subscription-level flag; it is set on
    /// [`NodeDownTransition::Notify`] and cleared on recovery.
    pub fn advance(
        &mut self,
        emailed: &mut bool,
        relay_up: bool,
        now: OffsetDateTime,
    ) -> NodeDownTransition {
        if relay_up {
            if !self.triggered {
                return NodeDownTransition::Idle;
            }
            self.triggered = false;
            self.last_changed = Some(now);
            *emailed = false;
            return NodeDownTransition::Recovered;
        }

        let mut transition = NodeDownTransition::Waiting;
        if !self.triggered {
            self.triggered = true;
            self.last_changed = Some(now);
            transition = NodeDownTransition::Triggered;
        }

        let since = self.last_changed.unwrap_or(now);
        if !*emailed && now - since >= self.grace_period() {
            *emailed = true;
            return NodeDownTransition::Notify;
        }
        transition
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionRule {
    NodeDown(NodeDownRule),
    OutdatedVersion { notify_type: String },
    LowBandwidth { threshold_kbs: i32 },
    DnsFailure,
}

impl SubscriptionRule {
    pub fn kind(&self) -> SubscriptionKind {
        match self {
            SubscriptionRule::NodeDown(_) => SubscriptionKind::NodeDown,
            SubscriptionRule::OutdatedVersion { .. } => SubscriptionKind::OutdatedVersion,
            SubscriptionRule::LowBandwidth { .. } => SubscriptionKind::LowBandwidth,
            SubscriptionRule::DnsFailure => SubscriptionKind::DnsFailure,
        }
    }

    pub fn node_down(grace_pd_hours: i32) -> Self {
        SubscriptionRule::NodeDown(NodeDownRule {
            triggered: false,
            grace_pd_hours,
            last_changed: None,
        })
    }

    pub fn outdated_version() -> Self {
        SubscriptionRule::OutdatedVersion {
            notify_type: DEFAULT_NOTIFY_TYPE.to_string(),
        }
    }

    pub fn low_bandwidth(threshold_kbs: i32) -> Self {
        SubscriptionRule::LowBandwidth { threshold_kbs }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub id: String,
    pub subscriber_id: String,
    pub router_id: String,
    pub emailed: bool,
    pub rule: SubscriptionRule,
}

impl Subscription {
    pub fn kind(&self) -> SubscriptionKind {
        self.rule.kind()
    }

    /// Full active model for an insert or an update of every column.
    pub fn to_active_model(&self) -> subscription::ActiveModel {
        let mut triggered = None;
        let mut grace_pd = None;
        let mut last_changed = None;
        let mut notify_type = None;
        let mut threshold = None;

        match &self.rule {
            SubscriptionRule::NodeDown(rule) => {
                triggered = Some(rule.triggered);
                grace_pd = Some(rule.grace_pd_hours);
                last_changed = rule.last_changed;
            }
            SubscriptionRule::OutdatedVersion { notify_type: t } => notify_type = Some(t.clone()),
            SubscriptionRule::LowBandwidth { threshold_kbs } => threshold = Some(*threshold_kbs),
            SubscriptionRule::DnsFailure => {}
        }

        subscription::ActiveModel {
            id: ActiveValue::Set(self.id.clone()),
            subscriber_id: ActiveValue::Set(self.subscriber_id.clone()),
            router_id: ActiveValue::Set(self.router_id.clone()),
            emailed: ActiveValue::Set(self.emailed),
            kind: ActiveValue::Set(self.kind().tag().to_string()),
            triggered: ActiveValue::Set(triggered),
            grace_pd: ActiveValue::Set(grace_pd),
            last_changed: ActiveValue::Set(last_changed),
            notify_type: ActiveValue::Set(notify_type),
            threshold: ActiveValue::Set(threshold),
        }
    }
}

impl TryFrom<subscription::Model> for Subscription {
    type Error = StoreError;

    fn try_from(row: subscription::Model) -> Result<Self, Self::Error> {
        let invalid = |reason: String| StoreError::InvalidRow {
            entity: "subscription",
            key: row.id.clone(),
            reason,
        };

        let kind = SubscriptionKind::from_tag(&row.kind)
            .ok_or_else(|| invalid(format!("unknown type tag {:?}", row.kind)))?;

        let rule = match kind {
            SubscriptionKind::NodeDown => SubscriptionRule::NodeDown(NodeDownRule {
                triggered: row.triggered.unwrap_or(false),
                grace_pd_hours: row
                    .grace_pd
                    .ok_or_else(|| invalid("node-down subscription without grace_pd".into()))?,
                last_changed: row.last_changed,
            }),
            SubscriptionKind::OutdatedVersion => SubscriptionRule::OutdatedVersion {
                notify_type: row
                    .notify_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_NOTIFY_TYPE.to_string()),
            },
            SubscriptionKind::LowBandwidth => SubscriptionRule::LowBandwidth {
                threshold_kbs: row.threshold.unwrap_or(DEFAULT_BANDWIDTH_THRESHOLD),
            },
            SubscriptionKind::DnsFailure => SubscriptionRule::DnsFailure,
        };

        Ok(Subscription {
            id: row.id,
            subscriber_id: row.subscriber_id,
            router_id: row.router_id,
            emailed: row.emailed,
            rule,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn row(kind: &str) -> subscription::Model {
        subscription::Model {
            id: "sub-1".into(),
            subscriber_id: "op@example.org".into(),
            router_id: "AAAA".into(),
            emailed: false,
            kind: kind.into(),
            triggered: None,
            grace_pd: None,
            last_changed: None,
            notify_type: None,
            threshold: None,
        }
    }

    #[test]
    fn tags_round_trip() {
        for kind in SubscriptionKind::ALL {
            assert_eq!(SubscriptionKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(SubscriptionKind::from_tag("subscriptions"), None);
    }

    #[test]
    fn missing_columns_fall_back_to_defaults() {
        let sub = Subscription::try_from(row("bandwithsub")).unwrap();
        assert_eq!(
            sub.rule,
            SubscriptionRule::LowBandwidth {
                threshold_kbs: DEFAULT_BANDWIDTH_THRESHOLD
            }
        );

        let sub = Subscription::try_from(row("outdatedversionsub")).unwrap();
        assert_eq!(sub.rule, SubscriptionRule::outdated_version());
    }

    #[test]
    fn node_down_requires_grace_period() {
        let err = Subscription::try_from(row("nodedownsub")).unwrap_err();
        assert!(err.to_string().contains("grace_pd"));

        let mut with_grace = row("nodedownsub");
        with_grace.grace_pd = Some(2);
        let sub = Subscription::try_from(with_grace).unwrap();
        assert_eq!(sub.rule, SubscriptionRule::node_down(2));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(matches!(
            Subscription::try_from(row("weathersub")),
            Err(StoreError::InvalidRow { .. })
        ));
    }

    #[test]
    fn node_down_waits_for_grace_period() {
        let start = datetime!(2026-03-01 12:00 UTC);
        let mut rule = NodeDownRule {
            triggered: false,
            grace_pd_hours: 2,
            last_changed: None,
        };
        let mut emailed = false;

        assert_eq!(
            rule.advance(&mut emailed, false, start),
            NodeDownTransition::Triggered
        );
        assert_eq!(rule.last_changed, Some(start));
        assert_eq!(
            rule.advance(&mut emailed, false, start + Duration::minutes(119)),
            NodeDownTransition::Waiting
        );
        assert!(!emailed);
        assert_eq!(
            rule.advance(&mut emailed, false, start + Duration::hours(2)),
            NodeDownTransition::Notify
        );
        assert!(emailed);
        assert_eq!(
            rule.advance(&mut emailed, false, start + Duration::hours(5)),
            NodeDownTransition::Waiting
        );
    }

    #[test]
    fn node_down_recovery_resets_state() {
        let start = datetime!(2026-03-01 12:00 UTC);
        let mut rule = NodeDownRule {
            triggered: true,
            grace_pd_hours: 2,
            last_changed: Some(start),
        };
        let mut emailed = true;
        let later = start + Duration::hours(6);

        assert_eq!(
            rule.advance(&mut emailed, true, later),
            NodeDownTransition::Recovered
        );
        assert!(!rule.triggered);
        assert!(!emailed);
        assert_eq!(rule.last_changed, Some(later));
        assert_eq!(
            rule.advance(&mut emailed, true, later + Duration::hours(1)),
            NodeDownTransition::Idle
        );
    }

    #[test]
    fn zero_grace_period_notifies_on_first_detection() {
        let now = datetime!(2026-03-01 12:00 UTC);
        let mut rule = NodeDownRule {
            triggered: false,
            grace_pd_hours: 0,
            last_changed: None,
        };
        let mut emailed = false;
        assert_eq!(
            rule.advance(&mut emailed, false, now),
            NodeDownTransition::Notify
        );
        assert!(rule.triggered);
    }
}
