// Notification delivery: capability traits for the host's feedback
// channels, and the cooldown-gated dispatcher that drives them.

pub mod dispatcher;
pub mod sinks;

pub use dispatcher::NotificationDispatcher;
pub use sinks::{Audio, AudioCue, HapticIntensity, Haptics, UnavailableSink, Visual};
