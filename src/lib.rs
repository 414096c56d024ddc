#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
// Core decision pipeline for the wearable safety monitor: telemetry
// fetching, geofence and sensor-threshold classification, alert
// orchestration, and cooldown-gated notification dispatch. The host UI
// subscribes to the pipeline handle; it never recomputes bands locally.

pub mod alerts;
pub mod config;
pub mod error;
pub mod geofence;
pub mod notify;
pub mod pipeline;
pub mod telemetry;
pub mod thresholds;

pub use alerts::{Alert, AlertId, AlertKind, AlertLevel, AlertManager};
pub use config::NotificationConfig;
pub use error::{FetchError, SinkError, ZoneStoreError};
pub use geofence::{DangerZone, GeofenceAssessment, Proximity};
pub use notify::{Audio, AudioCue, HapticIntensity, Haptics, NotificationDispatcher, Visual};
pub use pipeline::{Pipeline, PipelineCommand, PipelineHandle, ZoneStore};
pub use telemetry::{HttpTransport, TelemetryClient, TelemetrySample, TelemetryTransport};
