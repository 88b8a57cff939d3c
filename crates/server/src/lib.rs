//! Tor Weather: watches the relays of the Tor network and emails their
//! operators.
//!
//! Every run reconciles the stored relay table against a snapshot of the
//! network directory, welcomes newly stable relays and evaluates the
//! node-down, outdated-version and low-bandwidth subscriptions.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::store::Store;

pub mod config;
pub mod directory;
pub mod email_templates;
pub mod entity;
pub mod error;
pub mod notification;
pub mod notify;
pub mod store;
pub mod subscription;
pub mod utils;
pub mod weather;

#[derive(Clone, Debug)]
pub struct AppResources {
    pub store: Store,
    pub config: Arc<AppConfig>,
    /// Held for the duration of a run; runs never overlap.
    pub run_lock: Arc<Mutex<()>>,
}

impl AppResources {
    pub fn new(store: Store, config: Arc<AppConfig>) -> Self {
        Self {
            store,
            config,
            run_lock: Arc::new(Mutex::new(())),
        }
    }
}
