// Scalar sensor classification against banded thresholds.
//
// One function per sensor rule. The evaluation order inside each rule is
// load-bearing: low is checked before critical, critical before warning, so
// the bands stay mutually exclusive at their boundaries (38.6 exactly must
// classify critical, never warning).

use crate::alerts::model::AlertLevel;

/// Temperature band boundaries, °C.
const TEMP_LOW_BELOW: f64 = 34.9;
const TEMP_CRITICAL_FROM: f64 = 38.6;
const TEMP_WARNING_FROM: f64 = 37.6;
const TEMP_NORMAL_FROM: f64 = 35.0;

/// Classification outcome for a scalar sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorStatus {
    Unknown,
    Low,
    Normal,
    Elevated,
    Critical,
}

#[derive(Debug, Clone, Copy)]
pub struct ThresholdAssessment {
    pub status: SensorStatus,
    pub level: Option<AlertLevel>,
    /// The reading that was classified, if present.
    pub value: Option<f64>,
    /// The band boundary the reading was classified against.
    pub threshold: Option<f64>,
}

impl ThresholdAssessment {
    fn unknown(value: Option<f64>) -> Self {
        Self {
            status: SensorStatus::Unknown,
            level: None,
            value,
            threshold: None,
        }
    }
}

/// Classify a body temperature reading in °C.
pub fn classify_temperature(value: Option<f64>) -> ThresholdAssessment {
    let Some(temp) = value else {
        return ThresholdAssessment::unknown(None);
    };
    if temp.is_nan() {
        return ThresholdAssessment::unknown(None);
    }

    if temp < TEMP_LOW_BELOW {
        ThresholdAssessment {
            status: SensorStatus::Low,
            level: Some(AlertLevel::Info),
            value: Some(temp),
            threshold: Some(TEMP_LOW_BELOW),
        }
    } else if temp >= TEMP_CRITICAL_FROM {
        ThresholdAssessment {
            status: SensorStatus::Critical,
            level: Some(AlertLevel::Critical),
            value: Some(temp),
            threshold: Some(TEMP_CRITICAL_FROM),
        }
    } else if temp >= TEMP_WARNING_FROM {
        ThresholdAssessment {
            status: SensorStatus::Elevated,
            level: Some(AlertLevel::Warning),
            value: Some(temp),
            threshold: Some(TEMP_WARNING_FROM),
        }
    } else if temp >= TEMP_NORMAL_FROM {
        ThresholdAssessment {
            status: SensorStatus::Normal,
            level: None,
            value: Some(temp),
            threshold: None,
        }
    } else {
        // The [34.9, 35.0) gap between the low and normal bands.
        ThresholdAssessment::unknown(Some(temp))
    }
}

/// Classify a pressure reading.
///
/// Deliberately a no-op in the current policy: always normal, never alerts.
/// Kept as a distinct rule so it can be re-enabled without touching the
/// alert manager.
pub fn classify_pressure(value: Option<f64>) -> ThresholdAssessment {
    ThresholdAssessment {
        status: SensorStatus::Normal,
        level: None,
        value,
        threshold: None,
    }
}

/// Render the status line for a temperature assessment.
pub fn describe_temperature(assessment: &ThresholdAssessment) -> String {
    match (assessment.status, assessment.value) {
        (SensorStatus::Low, Some(v)) => format!("Body temperature low: {v:.1}°C"),
        (SensorStatus::Critical, Some(v)) => {
            format!("Body temperature critically high: {v:.1}°C")
        }
        (SensorStatus::Elevated, Some(v)) => format!("Body temperature elevated: {v:.1}°C"),
        (SensorStatus::Normal, Some(v)) => format!("Body temperature normal: {v:.1}°C"),
        _ => "Body temperature unknown".to_string(),
    }
}
