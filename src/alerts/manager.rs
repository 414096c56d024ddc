// Alert orchestration - merges evaluator results across poll cycles.
//
// Each tick rebuilds the live alert map from scratch and diffs it against
// the previous tick's map. Only transitions into a new id or a new level
// reach the dispatcher; a condition persisting at the same level stays
// silent. That edge-trigger rule, not the dispatcher cooldown, is what
// keeps a user sitting inside a zone from being buzzed every poll.

use std::collections::HashMap;

use chrono::{Duration as ChronoDuration, Utc};
use log::{debug, warn};

use crate::config::NotificationConfig;
use crate::geofence::{self, DangerZone};
use crate::notify::NotificationDispatcher;
use crate::telemetry::{TelemetryClient, TelemetrySample, TelemetryTransport};
use crate::thresholds;

use super::model::{Alert, AlertId, AlertLevel};

/// A sample older than this produces a `data_stale` warning.
const STALE_AFTER_MINUTES: i64 = 5;

pub struct AlertManager<T> {
    client: TelemetryClient<T>,
    dispatcher: NotificationDispatcher,
    /// Live alerts from the previous tick, keyed by id.
    previous: HashMap<AlertId, Alert>,
}

impl<T: TelemetryTransport> AlertManager<T> {
    pub fn new(client: TelemetryClient<T>, dispatcher: NotificationDispatcher) -> Self {
        Self {
            client,
            dispatcher,
            previous: HashMap::new(),
        }
    }

    /// Run one poll cycle. Returns the full live alert list, most severe
    /// first, and dispatches notifications for new or escalated alerts.
    ///
    /// A hard fetch failure does not abort the tick: evaluation continues
    /// with no sample so the geofence fallback path and offline handling
    /// still run.
    pub async fn tick(
        &mut self,
        zones: &[DangerZone],
        fallback_location: Option<(f64, f64)>,
    ) -> Vec<Alert> {
        // 1. Fetch (absorbing hard failure).
        let sample = match self.client.fetch(false).await {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!("telemetry unavailable this tick: {e}");
                None
            }
        };

        let now = Utc::now();
        let mut next: HashMap<AlertId, Alert> = HashMap::new();

        // 2. Resolve the evaluation location and run the geofence scan.
        let location = sample
            .as_ref()
            .and_then(TelemetrySample::position)
            .or(fallback_location);
        match location {
            Some((latitude, longitude)) => {
                let assessment = geofence::evaluate(latitude, longitude, zones);
                if let Some(level) = assessment.proximity.level() {
                    next.insert(
                        AlertId::DangerZone,
                        Alert {
                            id: AlertId::DangerZone,
                            level,
                            message: assessment.describe(),
                            timestamp: now,
                            distance: Some(assessment.distance),
                            value: None,
                            threshold: None,
                        },
                    );
                }
            }
            None => debug!("no location available, skipping geofence evaluation"),
        }

        // 3. Sensor thresholds. The pressure rule is evaluated but its
        // result is not surfaced under the current policy.
        let temperature =
            thresholds::classify_temperature(sample.as_ref().and_then(|s| s.temperature));
        if let Some(level) = temperature.level {
            next.insert(
                AlertId::Temperature,
                Alert {
                    id: AlertId::Temperature,
                    level,
                    message: thresholds::describe_temperature(&temperature),
                    timestamp: now,
                    distance: None,
                    value: temperature.value,
                    threshold: temperature.threshold,
                },
            );
        }
        let _ = thresholds::classify_pressure(sample.as_ref().and_then(|s| s.pressure));

        // 4. Staleness.
        if let Some(sample) = &sample {
            let age = now.signed_duration_since(sample.timestamp);
            if age > ChronoDuration::minutes(STALE_AFTER_MINUTES) {
                next.insert(
                    AlertId::DataStale,
                    Alert {
                        id: AlertId::DataStale,
                        level: AlertLevel::Warning,
                        message: format!(
                            "Sensor data is {} minutes old",
                            age.num_minutes()
                        ),
                        timestamp: now,
                        distance: None,
                        value: None,
                        threshold: None,
                    },
                );
            }
        }

        // 5. Edge trigger: dispatch only for new ids or changed levels.
        for alert in next.values() {
            let fire = match self.previous.get(&alert.id) {
                None => true,
                Some(prev) => prev.level != alert.level,
            };
            if fire {
                self.dispatcher.trigger(alert).await;
            }
        }

        // 6. Severity descending, most recent first on ties.
        let mut alerts: Vec<Alert> = next.values().cloned().collect();
        alerts.sort_by(|a, b| {
            b.level
                .cmp(&a.level)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });

        // 7. This tick's map becomes the baseline for the next one.
        self.previous = next;

        alerts
    }

    /// Clear the telemetry cache slot (manual pull-to-refresh).
    pub async fn invalidate_cache(&self) {
        self.client.invalidate().await;
    }

    /// Reset notification cooldowns (manual pull-to-refresh).
    pub fn clear_cooldowns(&mut self) {
        self.dispatcher.clear_cooldowns();
    }

    pub fn update_notification_config(&mut self, config: NotificationConfig) {
        self.dispatcher.update_config(config);
    }

    /// Historical readings passthrough for the analytics collaborator.
    pub async fn fetch_history(
        &self,
        results: usize,
    ) -> Result<Vec<TelemetrySample>, crate::error::FetchError> {
        self.client.fetch_history(results).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    use crate::error::{FetchError, SinkError};
    use crate::notify::sinks::{Audio, AudioCue, HapticIntensity, Haptics, Visual};

    struct FakeTransport {
        outcomes: StdMutex<VecDeque<Result<TelemetrySample, FetchError>>>,
    }

    impl FakeTransport {
        fn new(outcomes: Vec<Result<TelemetrySample, FetchError>>) -> Self {
            Self {
                outcomes: StdMutex::new(outcomes.into()),
            }
        }
    }

    #[async_trait]
    impl TelemetryTransport for FakeTransport {
        async fn fetch_latest(&self) -> Result<TelemetrySample, FetchError> {
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

    /// Counts dispatched notifications without caring which channel fired.
    #[derive(Default)]
    struct CountingSink {
        dispatches: AtomicUsize,
    }

    #[async_trait]
    impl Haptics for CountingSink {
        async fn pulse(&self, _intensity: HapticIntensity) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[async_trait]
    impl Audio for CountingSink {
        async fn play(&self, _cue: AudioCue) -> Result<(), SinkError> {
            self.dispatches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl Visual for CountingSink {
        async fn alert_dialog(&self, _message: &str) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn make_manager(
        outcomes: Vec<Result<TelemetrySample, FetchError>>,
    ) -> (AlertManager<FakeTransport>, Arc<CountingSink>) {
        let sink = Arc::new(CountingSink::default());
        let dispatcher = NotificationDispatcher::new(
            sink.clone(),
            sink.clone(),
            sink.clone(),
            NotificationConfig::default(),
        );
        let client = TelemetryClient::new(FakeTransport::new(outcomes));
        (AlertManager::new(client, dispatcher), sink)
    }

    fn located_sample(latitude: f64, longitude: f64, temperature: Option<f64>) -> TelemetrySample {
        TelemetrySample {
            timestamp: Utc::now(),
            latitude,
            longitude,
            temperature,
            pressure: None,
        }
    }

    fn make_zone(id: i64, latitude: f64, longitude: f64, radius: f64) -> DangerZone {
        DangerZone {
            id,
            latitude,
            longitude,
            radius,
            name: format!("Zone {id}"),
            category: "test".to_string(),
            color: "#ff0000".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_inside_zone_produces_critical_alert() {
        let (mut manager, _) = make_manager(vec![Ok(located_sample(10.0, 10.0, None))]);
        let zones = [make_zone(1, 10.0, 10.0, 100.0)];

        let alerts = manager.tick(&zones, None).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, AlertId::DangerZone);
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert!(alerts[0].message.contains("Inside"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_persisting_condition_notifies_once() {
        // Same position both ticks; cache serves the second tick.
        let (mut manager, sink) = make_manager(vec![Ok(located_sample(10.0, 10.0, None))]);
        let zones = [make_zone(1, 10.0, 10.0, 100.0)];

        let first = manager.tick(&zones, None).await;
        let second = manager.tick(&zones, None).await;

        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[0].level, second[0].level);
        // Edge-trigger: the unchanged condition does not re-dispatch.
        assert_eq!(sink.dispatches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_condition_retriggers_on_return() {
        let inside = located_sample(10.0, 10.0, None);
        let far = located_sample(20.0, 20.0, None);
        let (mut manager, sink) = make_manager(vec![
            Ok(inside.clone()),
            Ok(far),
            Ok(inside),
        ]);
        let zones = [make_zone(1, 10.0, 10.0, 100.0)];

        // Force-refresh path is internal; advance past the TTL between
        // ticks so each tick sees the next scripted sample.
        assert_eq!(manager.tick(&zones, None).await.len(), 1);
        tokio::time::sleep(std::time::Duration::from_secs(31)).await;
        assert!(manager.tick(&zones, None).await.is_empty());
        tokio::time::sleep(std::time::Duration::from_secs(31)).await;
        assert_eq!(manager.tick(&zones, None).await.len(), 1);

        // absent -> active -> absent -> active fires twice.
        assert_eq!(sink.dispatches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_location_used_when_sample_has_no_fix() {
        let (mut manager, _) = make_manager(vec![Ok(located_sample(0.0, 0.0, None))]);
        let zones = [make_zone(1, 10.0, 10.0, 100.0)];

        let alerts = manager.tick(&zones, Some((10.0, 10.0))).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, AlertId::DangerZone);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_location_skips_geofence_but_not_thresholds() {
        let (mut manager, _) = make_manager(vec![Ok(located_sample(0.0, 0.0, Some(39.0)))]);
        let zones = [make_zone(1, 10.0, 10.0, 100.0)];

        let alerts = manager.tick(&zones, None).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, AlertId::Temperature);
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert_eq!(alerts[0].value, Some(39.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_sample_emits_data_stale_warning() {
        let mut sample = located_sample(0.0, 0.0, None);
        sample.timestamp = Utc::now() - ChronoDuration::minutes(6);
        let (mut manager, _) = make_manager(vec![Ok(sample)]);

        let alerts = manager.tick(&[], None).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, AlertId::DataStale);
        assert_eq!(alerts[0].level, AlertLevel::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_fetch_failure_still_completes_tick() {
        let (mut manager, _) =
            make_manager(vec![Err(FetchError::Http("connection refused".into()))]);
        let zones = [make_zone(1, 10.0, 10.0, 100.0)];

        // No sample and no fallback: geofence skipped, no alerts, no panic.
        let alerts = manager.tick(&zones, None).await;
        assert!(alerts.is_empty());

        // With a fallback location the geofence path still works offline.
        let (mut manager, _) =
            make_manager(vec![Err(FetchError::Http("connection refused".into()))]);
        let alerts = manager.tick(&zones, Some((10.0, 10.0))).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, AlertId::DangerZone);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alerts_sorted_most_severe_first() {
        // Inside a zone (critical) with a stale sample (warning).
        let mut sample = located_sample(10.0, 10.0, None);
        sample.timestamp = Utc::now() - ChronoDuration::minutes(10);
        let (mut manager, _) = make_manager(vec![Ok(sample)]);
        let zones = [make_zone(1, 10.0, 10.0, 100.0)];

        let alerts = manager.tick(&zones, None).await;
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert_eq!(alerts[1].level, AlertLevel::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalation_redispatches() {
        // Warming temperature: 38.0 (warning) then 39.0 (critical).
        let (mut manager, sink) = make_manager(vec![
            Ok(located_sample(0.0, 0.0, Some(38.0))),
            Ok(located_sample(0.0, 0.0, Some(39.0))),
        ]);

        manager.tick(&[], None).await;
        tokio::time::sleep(std::time::Duration::from_secs(31)).await;
        let alerts = manager.tick(&[], None).await;

        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert_eq!(sink.dispatches.load(Ordering::SeqCst), 2);
    }
}
