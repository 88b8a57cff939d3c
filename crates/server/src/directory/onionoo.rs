//! Onionoo `details` document client.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::Request;
use hyper::header::{ACCEPT, USER_AGENT};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use tokio::time::{Duration, timeout};
use url::Url;

use super::{RelayFacts, RelaySnapshot, VersionStatus};
use crate::config::DirectoryConfig;
use crate::error::DirectoryError;

/// Fields requested from Onionoo; everything else is dropped server side.
const DETAILS_FIELDS: &str =
    "nickname,fingerprint,running,hibernating,flags,contact,observed_bandwidth,version_status";

#[derive(Debug, Deserialize)]
struct DetailsDocument {
    relays: Vec<DetailsRelay>,
}

#[derive(Debug, Deserialize)]
struct DetailsRelay {
    fingerprint: String,
    #[serde(default = "unnamed")]
    nickname: String,
    #[serde(default)]
    running: bool,
    #[serde(default)]
    hibernating: bool,
    #[serde(default)]
    flags: Vec<String>,
    contact: Option<String>,
    /// Bytes per second.
    observed_bandwidth: Option<u64>,
    version_status: Option<String>,
}

fn unnamed() -> String {
    "Unnamed".to_string()
}

impl From<DetailsRelay> for RelayFacts {
    fn from(relay: DetailsRelay) -> Self {
        let has_flag = |flag: &str| relay.flags.iter().any(|f| f == flag);
        RelayFacts {
            exit: has_flag("Exit"),
            stable: has_flag("Stable"),
            running: relay.running,
            hibernating: relay.hibernating,
            bandwidth_kbs: relay.observed_bandwidth.map(|b| b / 1000),
            version_status: VersionStatus::from_onionoo(relay.version_status.as_deref()),
            contact: relay.contact,
            name: relay.nickname,
            fingerprint: relay.fingerprint.to_ascii_uppercase(),
        }
    }
}

/// Parses a `details` response body into a snapshot.
///
/// A document without relays is rejected: reconciling against it would mark
/// every stored relay down.
pub fn parse_details(body: &[u8]) -> Result<RelaySnapshot, DirectoryError> {
    let document: DetailsDocument =
        serde_json::from_slice(body).map_err(|e| DirectoryError::InvalidJson(e.to_string()))?;
    if document.relays.is_empty() {
        return Err(DirectoryError::InvalidJson(
            "details document lists no relays".to_string(),
        ));
    }
    Ok(RelaySnapshot::from_facts(
        document.relays.into_iter().map(RelayFacts::from),
    ))
}

/// Fetches relay snapshots from an Onionoo instance.
#[derive(Clone)]
pub struct OnionooClient {
    client: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
    url: Url,
    timeout: Duration,
}

impl OnionooClient {
    pub fn new(config: &DirectoryConfig) -> Result<Self, DirectoryError> {
        let mut url = Url::parse(&config.onionoo_url)
            .map_err(|e| DirectoryError::InvalidUrl(format!("{}: {e}", config.onionoo_url)))?;
        url.query_pairs_mut()
            .append_pair("type", "relay")
            .append_pair("fields", DETAILS_FIELDS);

        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| DirectoryError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .build();

        Ok(Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
            url,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Downloads and parses the current relay list, bounded by the configured timeout.
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch_snapshot(&self) -> Result<RelaySnapshot, DirectoryError> {
        let body = timeout(self.timeout, self.fetch_body())
            .await
            .map_err(|_| DirectoryError::Timeout(self.timeout))??;
        let snapshot = parse_details(&body)?;
        tracing::info!(
            name = "weather.directory.fetched",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            relays = snapshot.len(),
            bytes = body.len(),
            message = "Fetched relay directory"
        );
        Ok(snapshot)
    }

    async fn fetch_body(&self) -> Result<Bytes, DirectoryError> {
        let request = Request::get(self.url.as_str())
            .header(USER_AGENT, concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "application/json")
            .body(Empty::<Bytes>::new())
            .map_err(|e| DirectoryError::InvalidUrl(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| DirectoryError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| DirectoryError::Network(e.to_string()))?
            .to_bytes();

        if !status.is_success() {
            return Err(DirectoryError::Http {
                status,
                context: String::from_utf8_lossy(&body).chars().take(200).collect(),
            });
        }
        Ok(body)
    }
}
