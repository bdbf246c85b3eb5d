// THEORY:
// The `ConfigFetcher` keeps the shared thresholds in step with the tuning tool
// running on the companion server. It is a single periodic tokio task:
//
// 1.  **Stale Beats Corrupt**: A fetch either yields a complete, well-typed
//     `ThresholdConfig` or it yields nothing. Network errors, non-200 answers and
//     malformed bodies are logged and the store keeps its previous value.
// 2.  **Fixed Interval**: No backoff. The next tick is the retry.
// 3.  **Hard Stop**: `stop_fetching` aborts the task and waits for it to finish,
//     so once it returns no write can land in the store. `start_fetching` may be
//     called again afterwards.

use crate::core_modules::threshold::{ChannelRange, SharedThresholds, ThresholdConfig};
use crate::endpoint::EndpointStore;
use crate::error::FetchError;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(5);

/// Anything that can produce a fresh threshold configuration.
#[async_trait]
pub trait ThresholdSource: Send + Sync {
    async fn fetch(&self) -> Result<ThresholdConfig, FetchError>;
}

#[derive(Debug, Deserialize)]
struct HsvPayload {
    hsv_vals: HsvValues,
}

#[derive(Debug, Deserialize)]
struct HsvValues {
    hue_min: u8,
    hue_max: u8,
    saturation_min: u8,
    saturation_max: u8,
    value_min: u8,
    value_max: u8,
}

impl From<HsvValues> for ThresholdConfig {
    fn from(vals: HsvValues) -> Self {
        ThresholdConfig::new(
            ChannelRange::new(vals.hue_min, vals.hue_max),
            ChannelRange::new(vals.saturation_min, vals.saturation_max),
            ChannelRange::new(vals.value_min, vals.value_max),
        )
    }
}

/// Parses a `{"hsv_vals": {...}}` document. Missing keys or values outside
/// 0..=255 are rejected.
pub fn parse_thresholds(body: &[u8]) -> Result<ThresholdConfig, FetchError> {
    let payload: HsvPayload = serde_json::from_slice(body)?;
    Ok(payload.hsv_vals.into())
}

/// Fetches thresholds with `GET /get-hsv` from the configured server.
pub struct HttpThresholdSource {
    client: reqwest::Client,
    endpoint: EndpointStore,
}

impl HttpThresholdSource {
    pub fn new(client: reqwest::Client, endpoint: EndpointStore) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl ThresholdSource for HttpThresholdSource {
    async fn fetch(&self) -> Result<ThresholdConfig, FetchError> {
        let url = self.endpoint.thresholds_url().ok_or(FetchError::NoServer)?;
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response.bytes().await?;
        parse_thresholds(&body)
    }
}

/// Runs one fetch and installs the result. Returns whether the thresholds changed.
async fn refresh(source: &dyn ThresholdSource, store: &SharedThresholds) -> Result<bool, FetchError> {
    let next = source.fetch().await?;
    Ok(store.replace(next))
}

fn log_outcome(outcome: &Result<bool, FetchError>, store: &SharedThresholds) {
    match outcome {
        Ok(true) => info!(thresholds = ?store.snapshot(), "thresholds updated"),
        Ok(false) => debug!("thresholds unchanged"),
        Err(FetchError::NoServer) => error!("server address not set, skipping threshold fetch"),
        Err(e) => warn!(error = %e, "threshold fetch failed, keeping previous values"),
    }
}

pub struct ConfigFetcher {
    source: Arc<dyn ThresholdSource>,
    store: SharedThresholds,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl ConfigFetcher {
    pub fn new(source: Arc<dyn ThresholdSource>, store: SharedThresholds) -> Self {
        Self {
            source,
            store,
            interval: DEFAULT_FETCH_INTERVAL,
            task: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        // `tokio::time::interval` rejects a zero period.
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_fetching(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// One fetch outside the periodic schedule.
    pub async fn fetch_once(&self) -> Result<bool, FetchError> {
        let outcome = refresh(self.source.as_ref(), &self.store).await;
        log_outcome(&outcome, &self.store);
        outcome
    }

    /// Starts the periodic task. The first fetch happens immediately. Calling
    /// this while already fetching does nothing.
    pub fn start_fetching(&mut self) {
        if self.is_fetching() {
            debug!("threshold fetching already running");
            return;
        }

        let source = Arc::clone(&self.source);
        let store = self.store.clone();
        let period = self.interval;
        info!(interval_ms = period.as_millis() as u64, "threshold fetching started");

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let outcome = refresh(source.as_ref(), &store).await;
                log_outcome(&outcome, &store);
            }
        }));
    }

    /// Stops the periodic task and waits until it has fully exited.
    pub async fn stop_fetching(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.abort();
        // A cancelled join error is the expected outcome here.
        let _ = task.await;
        info!("threshold fetching stopped");
    }
}

impl Drop for ConfigFetcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::get};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TUNED: ThresholdConfig = ThresholdConfig {
        hue: ChannelRange { min: 20, max: 35 },
        saturation: ChannelRange { min: 120, max: 255 },
        value: ChannelRange { min: 90, max: 250 },
    };

    /// Always answers with `TUNED` or always fails, counting calls.
    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingSource {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ThresholdSource for CountingSource {
        async fn fetch(&self) -> Result<ThresholdConfig, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FetchError::Status(503));
            }
            Ok(TUNED)
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[test]
    fn parses_the_remote_document() {
        let body = br#"{"hsv_vals": {"hue_min": 20, "hue_max": 35, "saturation_min": 120,
            "saturation_max": 255, "value_min": 90, "value_max": 250}}"#;
        assert_eq!(parse_thresholds(body).unwrap(), TUNED);
    }

    #[test]
    fn rejects_out_of_range_and_missing_values() {
        let too_big = br#"{"hsv_vals": {"hue_min": 300, "hue_max": 35, "saturation_min": 0,
            "saturation_max": 255, "value_min": 0, "value_max": 255}}"#;
        assert!(matches!(parse_thresholds(too_big), Err(FetchError::Malformed(_))));

        let missing = br#"{"hsv_vals": {"hue_min": 10}}"#;
        assert!(matches!(parse_thresholds(missing), Err(FetchError::Malformed(_))));
        assert!(matches!(parse_thresholds(b"not json"), Err(FetchError::Malformed(_))));
    }

    #[tokio::test]
    async fn failed_fetch_leaves_store_untouched() {
        let before = ThresholdConfig::new(
            ChannelRange::new(1, 2),
            ChannelRange::new(3, 4),
            ChannelRange::new(5, 6),
        );
        let store = SharedThresholds::new(before);
        let fetcher = ConfigFetcher::new(CountingSource::new(true), store.clone());

        assert!(fetcher.fetch_once().await.is_err());
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn first_fetch_is_immediate() {
        let store = SharedThresholds::default();
        let mut fetcher = ConfigFetcher::new(CountingSource::new(false), store.clone());
        fetcher.start_fetching();
        wait_until(|| store.snapshot() == TUNED).await;
        fetcher.stop_fetching().await;
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_is_final() {
        let source = CountingSource::new(false);
        let mut fetcher = ConfigFetcher::new(source.clone(), SharedThresholds::default())
            .with_interval(Duration::from_millis(10));

        fetcher.start_fetching();
        fetcher.start_fetching();
        wait_until(|| source.calls() >= 3).await;
        fetcher.stop_fetching().await;
        assert!(!fetcher.is_fetching());

        let after_stop = source.calls();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(source.calls(), after_stop);

        // Restartable.
        fetcher.start_fetching();
        wait_until(|| source.calls() > after_stop).await;
        fetcher.stop_fetching().await;
    }

    #[tokio::test]
    async fn http_source_reads_get_hsv() {
        let app = Router::new()
            .route(
                "/get-hsv",
                get(|| async {
                    axum::Json(serde_json::json!({
                        "hsv_vals": {
                            "hue_min": 20, "hue_max": 35,
                            "saturation_min": 120, "saturation_max": 255,
                            "value_min": 90, "value_max": 250
                        }
                    }))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let endpoint = EndpointStore::new(Some("127.0.0.1".into()), port);
        let source = HttpThresholdSource::new(reqwest::Client::new(), endpoint.clone());
        assert_eq!(source.fetch().await.unwrap(), TUNED);

        endpoint.set_host("");
        assert!(matches!(source.fetch().await, Err(FetchError::NoServer)));
    }

    #[tokio::test]
    async fn http_source_rejects_bad_answers() {
        let app = Router::new()
            .route("/get-hsv", get(|| async { StatusCode::NOT_FOUND }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let store = SharedThresholds::default();
        let source = HttpThresholdSource::new(
            reqwest::Client::new(),
            EndpointStore::new(Some("127.0.0.1".into()), port),
        );
        let fetcher = ConfigFetcher::new(Arc::new(source), store.clone());
        assert!(matches!(fetcher.fetch_once().await, Err(FetchError::Status(404))));
        assert_eq!(store.snapshot(), ThresholdConfig::default());
    }
}
