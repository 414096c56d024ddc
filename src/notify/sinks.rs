// Effect sink capability traits.
//
// The concrete haptic/audio/dialog APIs live in the host app. Each sink may
// be unavailable on a given host; the dispatcher logs sink errors and moves
// on, it never propagates them.

use async_trait::async_trait;

use crate::error::SinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HapticIntensity {
    Light,
    Medium,
    Heavy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCue {
    Subtle,
    Warning,
    Critical,
}

#[async_trait]
pub trait Haptics: Send + Sync {
    async fn pulse(&self, intensity: HapticIntensity) -> Result<(), SinkError>;
}

#[async_trait]
pub trait Audio: Send + Sync {
    async fn play(&self, cue: AudioCue) -> Result<(), SinkError>;
}

#[async_trait]
pub trait Visual: Send + Sync {
    /// Present a blocking acknowledgement dialog. Resolves when dismissed.
    async fn alert_dialog(&self, message: &str) -> Result<(), SinkError>;
}

/// Sink for hosts without a given capability. Succeeds silently.
pub struct UnavailableSink;

#[async_trait]
impl Haptics for UnavailableSink {
    async fn pulse(&self, _intensity: HapticIntensity) -> Result<(), SinkError> {
        Ok(())
    }
}

#[async_trait]
impl Audio for UnavailableSink {
    async fn play(&self, _cue: AudioCue) -> Result<(), SinkError> {
        Ok(())
    }
}

#[async_trait]
impl Visual for UnavailableSink {
    async fn alert_dialog(&self, _message: &str) -> Result<(), SinkError> {
        Ok(())
    }
}
