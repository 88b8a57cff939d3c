//! Relay facts as reported by the Tor directory.
//!
//! The run works against the [`RelayDirectory`] trait. In production it is
//! backed by a [`RelaySnapshot`] fetched once per run from Onionoo
//! ([`onionoo::OnionooClient`]); tests build snapshots by hand.

pub mod contact;
pub mod onionoo;

use std::collections::BTreeMap;
use std::fmt;

pub use onionoo::OnionooClient;

/// Queries the run needs answered about the relays currently known.
pub trait RelayDirectory {
    /// `(fingerprint, nickname)` for every relay in the directory.
    fn list_known_relays(&self) -> Vec<(String, String)>;
    fn is_up_or_hibernating(&self, fingerprint: &str) -> bool;
    fn is_exit(&self, fingerprint: &str) -> bool;
    fn is_stable(&self, fingerprint: &str) -> bool;
    /// Operator email parsed from the contact line, if any can be found.
    fn contact_email(&self, fingerprint: &str) -> Option<String>;
    /// Observed bandwidth in KB/s.
    fn bandwidth_kbs(&self, fingerprint: &str) -> Option<u64>;
    fn version_status(&self, fingerprint: &str) -> VersionStatus;
}

/// Directory authorities' verdict on the Tor version a relay runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VersionStatus {
    Recommended,
    Experimental,
    Obsolete,
    NewInSeries,
    Unrecommended,
    /// The status was missing or could not be parsed.
    Error,
}

impl VersionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VersionStatus::Recommended => "RECOMMENDED",
            VersionStatus::Experimental => "EXPERIMENTAL",
            VersionStatus::Obsolete => "OBSOLETE",
            VersionStatus::NewInSeries => "NEW_IN_SERIES",
            VersionStatus::Unrecommended => "UNRECOMMENDED",
            VersionStatus::Error => "ERROR",
        }
    }

    /// Parses Onionoo's lowercase `version_status` values.
    pub fn from_onionoo(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("recommended") => VersionStatus::Recommended,
            Some("experimental") => VersionStatus::Experimental,
            Some("obsolete") => VersionStatus::Obsolete,
            Some("new in series") => VersionStatus::NewInSeries,
            Some("unrecommended") => VersionStatus::Unrecommended,
            _ => VersionStatus::Error,
        }
    }

    /// Whether this status is the one a subscription asked to be told about.
    pub fn matches(self, notify_type: &str) -> bool {
        self != VersionStatus::Error && self.as_str().eq_ignore_ascii_case(notify_type.trim())
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the directory says about one relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayFacts {
    pub fingerprint: String,
    pub name: String,
    pub running: bool,
    pub hibernating: bool,
    pub exit: bool,
    pub stable: bool,
    pub contact: Option<String>,
    pub bandwidth_kbs: Option<u64>,
    pub version_status: VersionStatus,
}

impl RelayFacts {
    /// A running, non-exit, non-stable relay with no contact or measurements.
    pub fn new(fingerprint: &str, name: &str) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            name: name.to_string(),
            running: true,
            hibernating: false,
            exit: false,
            stable: false,
            contact: None,
            bandwidth_kbs: None,
            version_status: VersionStatus::Error,
        }
    }
}

/// Immutable view of the directory taken at the start of a run.
#[derive(Clone, Debug, Default)]
pub struct RelaySnapshot {
    relays: BTreeMap<String, RelayFacts>,
}

impl RelaySnapshot {
    pub fn from_facts(facts: impl IntoIterator<Item = RelayFacts>) -> Self {
        Self {
            relays: facts
                .into_iter()
                .map(|f| (f.fingerprint.clone(), f))
                .collect(),
        }
    }

    pub fn get(&self, fingerprint: &str) -> Option<&RelayFacts> {
        self.relays.get(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }
}

impl RelayDirectory for RelaySnapshot {
    fn list_known_relays(&self) -> Vec<(String, String)> {
        self.relays
            .values()
            .map(|f| (f.fingerprint.clone(), f.name.clone()))
            .collect()
    }

    fn is_up_or_hibernating(&self, fingerprint: &str) -> bool {
        self.get(fingerprint)
            .is_some_and(|f| f.running || f.hibernating)
    }

    fn is_exit(&self, fingerprint: &str) -> bool {
        self.get(fingerprint).is_some_and(|f| f.exit)
    }

    fn is_stable(&self, fingerprint: &str) -> bool {
        self.get(fingerprint).is_some_and(|f| f.stable)
    }

    fn contact_email(&self, fingerprint: &str) -> Option<String> {
        self.get(fingerprint)
            .and_then(|f| f.contact.as_deref())
            .and_then(contact::extract_email)
    }

    fn bandwidth_kbs(&self, fingerprint: &str) -> Option<u64> {
        self.get(fingerprint).and_then(|f| f.bandwidth_kbs)
    }

    fn version_status(&self, fingerprint: &str) -> VersionStatus {
        self.get(fingerprint)
            .map_or(VersionStatus::Error, |f| f.version_status)
    }
}
