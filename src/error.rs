// Error taxonomy for the core pipeline.
//
// Fetch failures are only surfaced when there is no cached sample to fall
// back on; everything else is absorbed and logged so a tick always runs to
// completion.

use thiserror::Error;

/// Telemetry fetch failure with no usable cached sample.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("telemetry request failed: {0}")]
    Http(String),

    #[error("telemetry record could not be decoded: {0}")]
    Decode(String),

    #[error("timed out waiting for the in-flight fetch")]
    Timeout,
}

/// Zone store read failure. The pipeline recovers by treating the store as
/// an empty zone list, never by aborting.
#[derive(Debug, Clone, Error)]
pub enum ZoneStoreError {
    #[error("zone store is corrupt: {0}")]
    Corrupt(String),

    #[error("zone store unavailable: {0}")]
    Unavailable(String),
}

/// A notification effect sink (haptics/audio/visual) failed on this host.
/// Always logged, never propagated out of the dispatcher.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SinkError(pub String);
