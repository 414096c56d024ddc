// Alert model types shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity. Ordering is by severity, `Info < Warning < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// Stable identity of an alert kind. At most one live alert exists per id;
/// a new occurrence replaces the previous one rather than accumulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertId {
    /// Inside or near a configured danger zone.
    DangerZone,
    /// Body temperature outside the configured bands.
    Temperature,
    /// Last telemetry sample is older than the staleness window.
    DataStale,
}

/// Broad category of an alert, distinct from its stable [`AlertId`]. Each
/// id belongs to exactly one category, so the category is derived rather
/// than stored on the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Geofence,
    SensorThreshold,
    DataFreshness,
}

impl AlertId {
    /// Category this id belongs to.
    pub fn kind(&self) -> AlertKind {
        match self {
            Self::DangerZone => AlertKind::Geofence,
            Self::Temperature => AlertKind::SensorThreshold,
            Self::DataStale => AlertKind::DataFreshness,
        }
    }

    /// Stable string form, matching the wire/serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DangerZone => "danger_zone",
            Self::Temperature => "temperature",
            Self::DataStale => "data_stale",
        }
    }

    /// All alert ids the pipeline can produce.
    pub fn all() -> &'static [AlertId] {
        &[Self::DangerZone, Self::Temperature, Self::DataStale]
    }
}

/// A live alert produced by one tick of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub level: AlertLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Distance to the triggering zone boundary reference point, meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Measured sensor value that tripped the alert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Band boundary the value was classified against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl Alert {
    /// Category of this alert, derived from its id.
    pub fn kind(&self) -> AlertKind {
        self.id.kind()
    }
}
