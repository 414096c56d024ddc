// Rate-limited, TTL-caching telemetry fetcher.
//
// One cache slot for the device channel. Network calls are spaced at least
// MIN_FETCH_SPACING apart, concurrent callers coalesce onto the in-flight
// request, and a failed refresh falls back to whatever is cached (stale
// beats nothing; the alert manager decides when staleness is alert-worthy).

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

use crate::error::FetchError;

use super::wire::{decode_history, decode_latest, TelemetrySample};

/// How long a cached sample satisfies a non-forced fetch.
const CACHE_TTL: Duration = Duration::from_secs(30);
/// Minimum spacing between network calls.
const MIN_FETCH_SPACING: Duration = Duration::from_secs(3);
/// How long a coalescing caller waits on the in-flight request.
const COALESCE_WAIT: Duration = Duration::from_secs(5);

/// Default HTTP timeout for the telemetry endpoints.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport over the per-device "last reading" / "historical readings"
/// endpoints. Abstracted so the client's cache and rate-limit logic is
/// testable without a network.
#[async_trait]
pub trait TelemetryTransport: Send + Sync {
    async fn fetch_latest(&self) -> Result<TelemetrySample, FetchError>;
    async fn fetch_history(&self, results: usize) -> Result<Vec<TelemetrySample>, FetchError>;
}

/// HTTP transport using a reusable `reqwest::Client` with connection
/// pooling and a request timeout.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// `base_url` is the device channel root; the transport appends
    /// `/last.json` and `/feeds.json`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        let response = response
            .error_for_status()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl TelemetryTransport for HttpTransport {
    async fn fetch_latest(&self) -> Result<TelemetrySample, FetchError> {
        let url = format!("{}/last.json", self.base_url);
        let body = self.get_bytes(&url).await?;
        decode_latest(&body)
    }

    async fn fetch_history(&self, results: usize) -> Result<Vec<TelemetrySample>, FetchError> {
        let url = format!("{}/feeds.json?results={results}", self.base_url);
        let body = self.get_bytes(&url).await?;
        decode_history(&body)
    }
}

struct CacheSlot {
    sample: TelemetrySample,
    fetched_at: Instant,
}

type FetchOutcome = Option<Result<TelemetrySample, FetchError>>;

struct ClientState {
    cache: Option<CacheSlot>,
    /// When the most recent network call was issued; drives the spacing guard.
    last_request_at: Option<Instant>,
    /// Present while a network call is in flight; coalescing callers wait on it.
    inflight: Option<watch::Receiver<FetchOutcome>>,
}

/// Telemetry fetcher for one device channel.
pub struct TelemetryClient<T> {
    transport: T,
    state: Mutex<ClientState>,
}

impl<T: TelemetryTransport> TelemetryClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: Mutex::new(ClientState {
                cache: None,
                last_request_at: None,
                inflight: None,
            }),
        }
    }

    /// Fetch the latest sample.
    ///
    /// Serves the cache slot when it is fresh and `force_refresh` is off.
    /// Otherwise issues (or joins) a network call, honoring the minimum
    /// inter-call spacing. A network failure with anything cached returns
    /// the cached sample and logs the error instead of failing.
    pub async fn fetch(&self, force_refresh: bool) -> Result<TelemetrySample, FetchError> {
        let (tx, spacing_wait) = {
            let mut state = self.state.lock().await;

            if !force_refresh {
                if let Some(slot) = &state.cache {
                    if slot.fetched_at.elapsed() < CACHE_TTL {
                        debug!("telemetry cache hit ({:?} old)", slot.fetched_at.elapsed());
                        return Ok(slot.sample.clone());
                    }
                }
            }

            if let Some(rx) = &state.inflight {
                let rx = rx.clone();
                drop(state);
                return self.join_inflight(rx).await;
            }

            let (tx, rx) = watch::channel(None);
            state.inflight = Some(rx);
            let spacing_wait = state
                .last_request_at
                .map(|at| (at + MIN_FETCH_SPACING).saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::ZERO);
            (tx, spacing_wait)
        };

        if !spacing_wait.is_zero() {
            debug!("waiting {spacing_wait:?} before next telemetry request");
            tokio::time::sleep(spacing_wait).await;
        }

        {
            let mut state = self.state.lock().await;
            state.last_request_at = Some(Instant::now());
        }

        let outcome = self.transport.fetch_latest().await;

        let resolved = {
            let mut state = self.state.lock().await;
            let resolved = match outcome {
                Ok(sample) => {
                    state.cache = Some(CacheSlot {
                        sample: sample.clone(),
                        fetched_at: Instant::now(),
                    });
                    Ok(sample)
                }
                Err(err) => match &state.cache {
                    Some(slot) => {
                        // Stale-while-revalidate: serve what we have.
                        warn!("telemetry refresh failed, serving cached sample: {err}");
                        Ok(slot.sample.clone())
                    }
                    None => Err(err),
                },
            };
            state.inflight = None;
            resolved
        };

        let _ = tx.send(Some(resolved.clone()));
        resolved
    }

    /// Wait (bounded) for the in-flight request and reuse its result.
    async fn join_inflight(
        &self,
        mut rx: watch::Receiver<FetchOutcome>,
    ) -> Result<TelemetrySample, FetchError> {
        // The watch ref borrows the channel's internal lock, so the outcome
        // is extracted in its own scope before the state lock below; holding
        // it across that await would also make this future non-Send.
        let fetcher_went_away = {
            let waited = tokio::time::timeout(COALESCE_WAIT, rx.wait_for(|v| v.is_some())).await;
            match waited {
                Ok(Ok(value)) => {
                    if let Some(resolved) = (*value).clone() {
                        return resolved;
                    }
                    false
                }
                // The fetching caller was dropped before resolving.
                Ok(Err(_)) => true,
                // Timed out; the fetch may still resolve for later callers.
                Err(_) => false,
            }
        };

        // Fall back to whatever is cached.
        let mut state = self.state.lock().await;
        if fetcher_went_away {
            state.inflight = None;
        }
        match &state.cache {
            Some(slot) => {
                warn!("in-flight telemetry fetch did not resolve, serving cached sample");
                Ok(slot.sample.clone())
            }
            None => Err(FetchError::Timeout),
        }
    }

    /// Historical readings, newest first as the endpoint returns them.
    /// Uncached; used by the analytics collaborator only.
    pub async fn fetch_history(&self, results: usize) -> Result<Vec<TelemetrySample>, FetchError> {
        self.transport.fetch_history(results).await
    }

    /// Clear the cache slot and the spacing guard (manual pull-to-refresh).
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.cache = None;
        state.last_request_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn make_sample(temperature: f64) -> TelemetrySample {
        TelemetrySample {
            timestamp: Utc::now(),
            latitude: 51.5,
            longitude: -0.12,
            temperature: Some(temperature),
            pressure: None,
        }
    }

    /// Transport returning scripted outcomes, counting calls, with an
    /// optional per-call delay to exercise coalescing.
    struct FakeTransport {
        outcomes: StdMutex<VecDeque<Result<TelemetrySample, FetchError>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl FakeTransport {
        fn new(outcomes: Vec<Result<TelemetrySample, FetchError>>) -> Self {
            Self {
                outcomes: StdMutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TelemetryTransport for FakeTransport {
        async fn fetch_latest(&self) -> Result<TelemetrySample, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Http("script exhausted".into())))
        }

        async fn fetch_history(&self, _results: usize) -> Result<Vec<TelemetrySample>, FetchError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_hit_skips_network() {
        let transport = FakeTransport::new(vec![Ok(make_sample(36.5)), Ok(make_sample(37.0))]);
        let client = TelemetryClient::new(transport);

        let first = client.fetch(false).await.unwrap();
        let second = client.fetch(false).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(client.transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_refresh_always_goes_to_network() {
        let transport = FakeTransport::new(vec![Ok(make_sample(36.5)), Ok(make_sample(37.0))]);
        let client = TelemetryClient::new(transport);

        client.fetch(false).await.unwrap();
        let refreshed = client.fetch(true).await.unwrap();
        assert_eq!(refreshed.temperature, Some(37.0));
        assert_eq!(client.transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_minimum_spacing_between_network_calls() {
        let transport = FakeTransport::new(vec![Ok(make_sample(36.5)), Ok(make_sample(37.0))]);
        let client = TelemetryClient::new(transport);

        let started = Instant::now();
        client.fetch(true).await.unwrap();
        client.fetch(true).await.unwrap();
        assert!(started.elapsed() >= MIN_FETCH_SPACING);
        assert_eq!(client.transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_cache_refetches() {
        let transport = FakeTransport::new(vec![Ok(make_sample(36.5)), Ok(make_sample(37.0))]);
        let client = TelemetryClient::new(transport);

        client.fetch(false).await.unwrap();
        tokio::time::sleep(CACHE_TTL + Duration::from_secs(1)).await;
        let refreshed = client.fetch(false).await.unwrap();
        assert_eq!(refreshed.temperature, Some(37.0));
        assert_eq!(client.transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_cache_served_on_network_failure() {
        let transport = FakeTransport::new(vec![
            Ok(make_sample(36.5)),
            Err(FetchError::Http("connection reset".into())),
        ]);
        let client = TelemetryClient::new(transport);

        let original = client.fetch(false).await.unwrap();
        tokio::time::sleep(CACHE_TTL + Duration::from_secs(1)).await;

        // Refresh fails but the stale sample is still served.
        let served = client.fetch(false).await.unwrap();
        assert_eq!(served, original);
        assert_eq!(client.transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_cache_failure_is_hard_error() {
        let transport =
            FakeTransport::new(vec![Err(FetchError::Http("connection refused".into()))]);
        let client = TelemetryClient::new(transport);

        let result = client.fetch(false).await;
        assert!(matches!(result, Err(FetchError::Http(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_coalesce_onto_one_request() {
        let transport = FakeTransport::new(vec![Ok(make_sample(36.5))])
            .with_delay(Duration::from_secs(1));
        let client = TelemetryClient::new(transport);

        let (a, b) = tokio::join!(client.fetch(false), client.fetch(false));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(client.transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalescing_caller_gives_up_and_serves_stale_cache() {
        let transport = FakeTransport::new(vec![Ok(make_sample(36.5)), Ok(make_sample(37.0))])
            .with_delay(Duration::from_secs(7));
        let client = TelemetryClient::new(transport);

        let original = client.fetch(false).await.unwrap();
        tokio::time::sleep(CACHE_TTL + Duration::from_secs(1)).await;

        // The first caller owns the (slow) network call; the second joins it,
        // gives up after COALESCE_WAIT, and falls back to the stale slot.
        let (leader, joiner) = tokio::join!(client.fetch(false), client.fetch(false));
        assert_eq!(leader.unwrap().temperature, Some(37.0));
        assert_eq!(joiner.unwrap(), original);
        assert_eq!(client.transport.calls(), 2);

        // The slow fetch still resolved into the cache for later callers.
        let after = client.fetch(false).await.unwrap();
        assert_eq!(after.temperature, Some(37.0));
        assert_eq!(client.transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalescing_caller_with_cold_cache_times_out() {
        let transport =
            FakeTransport::new(vec![Ok(make_sample(36.5))]).with_delay(Duration::from_secs(7));
        let client = TelemetryClient::new(transport);

        // Nothing cached, so the caller that gives up has nothing to fall
        // back on and reports the timeout.
        let (leader, joiner) = tokio::join!(client.fetch(false), client.fetch(false));
        assert_eq!(leader.unwrap().temperature, Some(36.5));
        assert!(matches!(joiner, Err(FetchError::Timeout)));
        assert_eq!(client.transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_clears_cache_and_spacing() {
        let transport = FakeTransport::new(vec![Ok(make_sample(36.5)), Ok(make_sample(37.0))]);
        let client = TelemetryClient::new(transport);

        client.fetch(false).await.unwrap();
        client.invalidate().await;

        // Cache is gone, and the refetch does not wait out the spacing guard.
        let started = Instant::now();
        let refreshed = client.fetch(false).await.unwrap();
        assert_eq!(refreshed.temperature, Some(37.0));
        assert!(started.elapsed() < MIN_FETCH_SPACING);
        assert_eq!(client.transport.calls(), 2);
    }
}
