//! Notification records produced by a run.
//!
//! Composition is pure data assembly. Delivery goes through a
//! [`crate::notify::Notifier`].

use crate::entity::{router, subscriber};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotificationKind {
    Welcome { exit: bool },
    NodeDown { grace_pd_hours: i32 },
    LowBandwidth { observed_kbs: u64, threshold_kbs: i32 },
    OutdatedVersion { version_type: String },
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Welcome { .. } => "welcome",
            NotificationKind::NodeDown { .. } => "node_down",
            NotificationKind::LowBandwidth { .. } => "low_bandwidth",
            NotificationKind::OutdatedVersion { .. } => "outdated_version",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub recipient: String,
    pub fingerprint: String,
    pub name: String,
    pub kind: NotificationKind,
    /// Subscriber token for the unsubscribe link. Welcome mail goes to relay
    /// operators who are not subscribers, so it has none.
    pub unsubs_auth: Option<String>,
    pub pref_auth: Option<String>,
}

impl Notification {
    pub fn welcome(recipient: &str, fingerprint: &str, name: &str, exit: bool) -> Self {
        Self {
            recipient: recipient.to_string(),
            fingerprint: fingerprint.to_string(),
            name: name.to_string(),
            kind: NotificationKind::Welcome { exit },
            unsubs_auth: None,
            pref_auth: None,
        }
    }

    /// Notification for a subscriber about one of the relays they watch.
    pub fn for_subscriber(
        subscriber: &subscriber::Model,
        router: &router::Model,
        kind: NotificationKind,
    ) -> Self {
        Self {
            recipient: subscriber.email.clone(),
            fingerprint: router.fingerprint.clone(),
            name: router.name.clone(),
            kind,
            unsubs_auth: Some(subscriber.unsubs_auth.clone()),
            pref_auth: Some(subscriber.pref_auth.clone()),
        }
    }
}
