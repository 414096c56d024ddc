// Cooldown-gated notification dispatch.
//
// The alert manager already edge-triggers (only new or escalated alerts get
// here); the cooldown gate is the second line of defense against haptic and
// audio spam when levels flap quickly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use crate::alerts::model::{Alert, AlertId, AlertLevel};
use crate::config::NotificationConfig;

use super::sinks::{Audio, AudioCue, HapticIntensity, Haptics, Visual};

/// Distance at which a critical alert gets the extra pulse burst, meters.
const CRITICAL_BURST_WITHIN_M: f64 = 50.0;
/// Distance at which a warning alert gets one extra pulse, meters.
const WARNING_BURST_WITHIN_M: f64 = 100.0;

pub struct NotificationDispatcher {
    haptics: Arc<dyn Haptics>,
    audio: Arc<dyn Audio>,
    visual: Arc<dyn Visual>,
    config: NotificationConfig,
    /// Last dispatch time per alert id; drives the cooldown gate.
    last_fired: HashMap<AlertId, Instant>,
}

impl NotificationDispatcher {
    pub fn new(
        haptics: Arc<dyn Haptics>,
        audio: Arc<dyn Audio>,
        visual: Arc<dyn Visual>,
        config: NotificationConfig,
    ) -> Self {
        Self {
            haptics,
            audio,
            visual,
            config,
            last_fired: HashMap::new(),
        }
    }

    /// Update the feedback configuration (hot-reload friendly).
    pub fn update_config(&mut self, config: NotificationConfig) {
        self.config = config;
    }

    /// Reset all per-id cooldown timestamps (manual refresh).
    pub fn clear_cooldowns(&mut self) {
        self.last_fired.clear();
    }

    /// Dispatch feedback for an alert, unless its id is still cooling down.
    ///
    /// Scheduled follow-up pulses run on a detached task so they never block
    /// the next tick; the blocking visual dialog (critical only) suspends
    /// this call until dismissed.
    pub async fn trigger(&mut self, alert: &Alert) {
        let cooldown = self.config.cooldown_for(alert.level);
        if let Some(last) = self.last_fired.get(&alert.id) {
            if last.elapsed() < cooldown {
                debug!(
                    "notification for {} suppressed by cooldown ({:?} remaining)",
                    alert.id.as_str(),
                    cooldown - last.elapsed()
                );
                return;
            }
        }
        self.last_fired.insert(alert.id, Instant::now());

        match alert.level {
            AlertLevel::Critical => {
                self.pulse(HapticIntensity::Heavy).await;
                if within(alert.distance, CRITICAL_BURST_WITHIN_M) {
                    // Three follow-up pulses at +200/+400/+600ms, detached.
                    self.schedule_pulses(HapticIntensity::Heavy, Duration::from_millis(200), 3);
                }
                self.play(AudioCue::Critical).await;
                if self.config.enable_visual {
                    if let Err(e) = self.visual.alert_dialog(&alert.message).await {
                        warn!("visual alert unavailable: {e}");
                    }
                }
            }
            AlertLevel::Warning => {
                self.pulse(HapticIntensity::Medium).await;
                if within(alert.distance, WARNING_BURST_WITHIN_M) {
                    self.schedule_pulses(HapticIntensity::Medium, Duration::from_millis(300), 1);
                }
                self.play(AudioCue::Warning).await;
            }
            AlertLevel::Info => {
                self.pulse(HapticIntensity::Light).await;
                self.play(AudioCue::Subtle).await;
            }
        }
    }

    async fn pulse(&self, intensity: HapticIntensity) {
        if !self.config.enable_haptics {
            return;
        }
        if let Err(e) = self.haptics.pulse(intensity).await {
            warn!("haptic pulse failed: {e}");
        }
    }

    async fn play(&self, cue: AudioCue) {
        if !self.config.enable_audio {
            return;
        }
        if let Err(e) = self.audio.play(cue).await {
            warn!("audio cue failed: {e}");
        }
    }

    /// Fire `count` pulses spaced `interval` apart on a detached task.
    /// The schedule is fixed once started; it is not cancellable.
    fn schedule_pulses(&self, intensity: HapticIntensity, interval: Duration, count: u32) {
        if !self.config.enable_haptics {
            return;
        }
        let haptics = self.haptics.clone();
        tokio::spawn(async move {
            for _ in 0..count {
                tokio::time::sleep(interval).await;
                if let Err(e) = haptics.pulse(intensity).await {
                    warn!("scheduled haptic pulse failed: {e}");
                }
            }
        });
    }
}

fn within(distance: Option<f64>, limit: f64) -> bool {
    distance.is_some_and(|d| d <= limit)
}
