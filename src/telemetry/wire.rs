// Wire format for the telemetry read endpoints.
//
// The endpoint emits one JSON record (or an array of them for history) with
// a creation timestamp, coordinates, and optional sensor values. Some
// firmware revisions string-encode the numeric fields, so every value field
// accepts either a JSON number or a numeric string; anything else is treated
// as absent, never as zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::FetchError;

/// One decoded telemetry reading. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
}

impl TelemetrySample {
    /// Coordinates, unless they carry the "no fix" sentinel (`0,0` or NaN).
    pub fn position(&self) -> Option<(f64, f64)> {
        if self.latitude.is_nan() || self.longitude.is_nan() {
            return None;
        }
        if self.latitude == 0.0 && self.longitude == 0.0 {
            return None;
        }
        Some((self.latitude, self.longitude))
    }
}

/// Raw endpoint record. Decoupled from [`TelemetrySample`] so wire quirks
/// stay in this module.
#[derive(Debug, Deserialize)]
pub struct TelemetryRecord {
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pressure: Option<f64>,
    /// Device status code; carried through for the host, unused by the core.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub status: Option<i64>,
}

impl From<TelemetryRecord> for TelemetrySample {
    fn from(record: TelemetryRecord) -> Self {
        Self {
            timestamp: record.created_at,
            // A record without coordinates decodes to the "no fix" sentinel.
            latitude: record.latitude.unwrap_or(f64::NAN),
            longitude: record.longitude.unwrap_or(f64::NAN),
            temperature: record.temperature,
            pressure: record.pressure,
        }
    }
}

/// Accept a number, a numeric string, or nothing. Non-numeric values decode
/// to `None` rather than failing the whole record.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Integer counterpart of [`lenient_f64`] for the status code.
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

/// Decode the single-record ("last reading") endpoint body.
pub fn decode_latest(body: &[u8]) -> Result<TelemetrySample, FetchError> {
    let record: TelemetryRecord =
        serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    Ok(record.into())
}

/// Decode the history endpoint body (an array of records).
pub fn decode_history(body: &[u8]) -> Result<Vec<TelemetrySample>, FetchError> {
    let records: Vec<TelemetryRecord> =
        serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    Ok(records.into_iter().map(TelemetrySample::from).collect())
}
