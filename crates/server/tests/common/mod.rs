//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use sea_orm::{ConnectionTrait, Database, DbBackend, Statement};
use time::OffsetDateTime;
use tor_weather::AppResources;
use tor_weather::config::{AppConfig, DirectoryConfig, SmtpConfig, WeatherConfig};
use tor_weather::directory::{RelayFacts, RelaySnapshot, VersionStatus};
use tor_weather::entity::{router, subscriber};
use tor_weather::error::NotifyError;
use tor_weather::notification::Notification;
use tor_weather::notify::Notifier;
use tor_weather::store::Store;

pub const FP_A: &str = "9695DFC35FFEB861329B9F1AB04C46397020CE31";
pub const FP_B: &str = "847B1F850344D7876491A54892F904934E4EB85D";
pub const OPERATOR: &str = "operator@example.org";

/// Create an in-memory SQLite database with the weather tables.
pub async fn setup_test_store() -> Store {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");

    let tables = [
        r#"CREATE TABLE subscriber (
            email TEXT PRIMARY KEY,
            confirmed INTEGER NOT NULL DEFAULT 0,
            sub_date TEXT NOT NULL,
            unsubs_auth TEXT NOT NULL UNIQUE,
            pref_auth TEXT NOT NULL UNIQUE
        );"#,
        r#"CREATE TABLE router (
            fingerprint TEXT PRIMARY KEY,
            name TEXT NOT NULL DEFAULT 'Unnamed',
            welcomed INTEGER NOT NULL DEFAULT 0,
            last_seen TEXT NOT NULL,
            up INTEGER NOT NULL DEFAULT 1,
            exit INTEGER NOT NULL DEFAULT 0,
            subscriber_id TEXT NULL
        );"#,
        r#"CREATE TABLE subscription (
            id TEXT PRIMARY KEY,
            subscriber_id TEXT NOT NULL,
            router_id TEXT NOT NULL,
            emailed INTEGER NOT NULL DEFAULT 0,
            "type" TEXT NOT NULL,
            triggered INTEGER NULL,
            grace_pd INTEGER NULL,
            last_changed TEXT NULL,
            notify_type TEXT NULL,
            threshold INTEGER NULL
        );"#,
        r#"CREATE TABLE deployed_datetime (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            deployed TEXT NOT NULL
        );"#,
        r#"CREATE TABLE email_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recipient TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            email_type TEXT NOT NULL,
            sent_at TEXT NOT NULL
        );"#,
    ];
    for sql in tables {
        db.execute(Statement::from_string(DbBackend::Sqlite, sql))
            .await
            .expect("Failed to create table");
    }

    Store::new(db)
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        smtp: SmtpConfig {
            server: "localhost".into(),
            port: 25,
            username: "weather".into(),
            password: "secret".into(),
            from: "Tor Weather <weather@example.org>".into(),
        },
        base_url: "https://weather.example.org/".into(),
        directory: DirectoryConfig::default(),
        weather: WeatherConfig::default(),
    }
}

pub async fn setup_resources() -> AppResources {
    AppResources::new(setup_test_store().await, Arc::new(test_config()))
}

/// Records the deployment far enough back that new relays are eligible for welcome mail.
pub async fn deploy_long_ago(store: &Store, now: OffsetDateTime) {
    store
        .deployed_at_or_init(now - time::Duration::days(30))
        .await
        .expect("Failed to record deployment");
}

/// A running relay with the given facts applied.
pub fn relay(fingerprint: &str, name: &str) -> RelayFacts {
    RelayFacts::new(fingerprint, name)
}

pub fn stable_relay_with_contact(fingerprint: &str, name: &str) -> RelayFacts {
    RelayFacts {
        stable: true,
        contact: Some(format!("Operator <{OPERATOR}>")),
        version_status: VersionStatus::Recommended,
        ..RelayFacts::new(fingerprint, name)
    }
}

pub fn snapshot(relays: impl IntoIterator<Item = RelayFacts>) -> RelaySnapshot {
    RelaySnapshot::from_facts(relays)
}

pub async fn insert_router(
    store: &Store,
    fingerprint: &str,
    up: bool,
    last_seen: OffsetDateTime,
) -> router::Model {
    let model = router::Model {
        fingerprint: fingerprint.to_string(),
        name: "testrelay".to_string(),
        welcomed: true,
        last_seen,
        up,
        exit: false,
        subscriber_id: None,
    };
    store
        .upsert_router(&model)
        .await
        .expect("Failed to insert router");
    model
}

pub async fn confirmed_subscriber(store: &Store, email: &str) -> subscriber::Model {
    store
        .insert_subscriber(email, true, OffsetDateTime::now_utc())
        .await
        .expect("Failed to insert subscriber")
}

/// Notifier that keeps everything it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
    /// Recipients whose delivery fails.
    pub reject: Vec<String>,
}

impl RecordingNotifier {
    pub fn rejecting(recipient: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject: vec![recipient.to_string()],
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("poisoned").clone()
    }
}

impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.reject.contains(&notification.recipient) {
            return Err(NotifyError::Transport("rejected by test".into()));
        }
        self.sent
            .lock()
            .expect("poisoned")
            .push(notification.clone());
        Ok(())
    }
}
