use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alerts::model::AlertLevel;

/// Notification feedback configuration.
///
/// Process-wide for the pipeline instance; mutated only through
/// `Pipeline::update_notification_config`. Each channel can be toggled
/// independently; a disabled channel is a silent no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub enable_haptics: bool,
    pub enable_audio: bool,
    pub enable_visual: bool,
    /// Minimum spacing between critical notifications for the same alert id.
    #[serde(default = "default_critical_cooldown_ms")]
    pub critical_cooldown_ms: u64,
    /// Minimum spacing between warning notifications for the same alert id.
    /// Info notifications share this bucket.
    #[serde(default = "default_warning_cooldown_ms")]
    pub warning_cooldown_ms: u64,
}

fn default_critical_cooldown_ms() -> u64 {
    5_000
}

fn default_warning_cooldown_ms() -> u64 {
    10_000
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enable_haptics: true,
            enable_audio: true,
            enable_visual: true,
            critical_cooldown_ms: default_critical_cooldown_ms(),
            warning_cooldown_ms: default_warning_cooldown_ms(),
        }
    }
}

impl NotificationConfig {
    /// Cooldown bucket for an alert level. Info alerts are not gated
    /// separately; they inherit the warning bucket.
    pub fn cooldown_for(&self, level: AlertLevel) -> Duration {
        match level {
            AlertLevel::Critical => Duration::from_millis(self.critical_cooldown_ms),
            AlertLevel::Warning | AlertLevel::Info => {
                Duration::from_millis(self.warning_cooldown_ms)
            }
        }
    }
}
