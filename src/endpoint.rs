// THEORY:
// The tracker talks to one companion server (threshold tuning + clip intake).
// Its host can change while the tracker runs, e.g. the operator types a new
// address, so it is held in an `EndpointStore` backed by a `watch` channel:
// cheap to read on every request and observable by a UI.
//
// An unset host is a normal state, not an error. Fetches skip, uploads fail
// with `NoServer`, and both recover as soon as a host is set.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

pub const DEFAULT_PORT: u16 = 7878;
const PING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct EndpointStore {
    host: Arc<watch::Sender<Option<String>>>,
    port: u16,
}

impl EndpointStore {
    pub fn new(host: Option<String>, port: u16) -> Self {
        let host = host.map(|h| h.trim().to_string()).filter(|h| !h.is_empty());
        let (sender, _) = watch::channel(host);
        Self {
            host: Arc::new(sender),
            port,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> Option<String> {
        self.host.borrow().clone()
    }

    /// Replaces the host. An empty string unsets it.
    pub fn set_host(&self, host: impl Into<String>) {
        let host = host.into().trim().to_string();
        let next = (!host.is_empty()).then_some(host);
        info!(host = ?next, "server address changed");
        self.host.send_replace(next);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.host.subscribe()
    }

    fn url(&self, path: &str) -> Option<String> {
        self.host()
            .map(|host| format!("http://{}:{}{}", host, self.port, path))
    }

    pub fn thresholds_url(&self) -> Option<String> {
        self.url("/get-hsv")
    }

    pub fn upload_url(&self) -> Option<String> {
        self.url("/upload/")
    }

    pub fn ping_url(&self) -> Option<String> {
        self.url("/ping")
    }
}

/// Checks whether a server answers `GET /ping` with 200.
pub async fn ping(client: &reqwest::Client, endpoint: &EndpointStore) -> bool {
    let Some(url) = endpoint.ping_url() else {
        return false;
    };
    match client.get(&url).timeout(PING_TIMEOUT).send().await {
        Ok(response) => response.status() == reqwest::StatusCode::OK,
        Err(e) => {
            debug!(%url, error = %e, "ping failed");
            false
        }
    }
}
