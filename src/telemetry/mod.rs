// Telemetry fetching for the wearable's device channel.
//
// Architecture:
// - wire.rs: endpoint record decoding (lenient numerics, no-fix sentinel)
// - client.rs: TTL cache, request spacing, in-flight coalescing

pub mod client;
pub mod wire;

pub use client::{HttpTransport, TelemetryClient, TelemetryTransport};
pub use wire::TelemetrySample;
