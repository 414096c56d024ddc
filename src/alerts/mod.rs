// Alert system module: the shared alert model and the per-tick orchestrator.
//
// Architecture:
// - model.rs: alert identity, severity, and the alert record itself
// - manager.rs: tick orchestration, edge-trigger detection, severity sort

pub mod manager;
pub mod model;

pub use manager::AlertManager;
pub use model::{Alert, AlertId, AlertKind, AlertLevel};
