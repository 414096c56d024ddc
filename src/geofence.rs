// Geofence proximity classification.
//
// Pure functions over a point and a set of circular zones. Classification
// returns a tagged proximity variant; human-readable status text is rendered
// separately so callers never have to parse strings back apart.

use serde::{Deserialize, Serialize};

use crate::alerts::model::AlertLevel;

/// Mean Earth radius in meters, used for great-circle distance.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Band margins beyond the zone radius, meters.
const CRITICAL_MARGIN_M: f64 = 50.0;
const WARNING_MARGIN_M: f64 = 100.0;
const INFO_MARGIN_M: f64 = 200.0;

/// A circular danger zone. Owned by the external zone store; read-only here.
/// Identity is `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DangerZone {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// Zone radius in meters; the store guarantees `radius > 0`.
    pub radius: f64,
    pub name: String,
    pub category: String,
    pub color: String,
}

/// Proximity classification. Declaration order is ascending severity so the
/// derived `Ord` can be used for "only escalate, never downgrade" checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Proximity {
    Safe,
    /// Within 200m of a zone boundary.
    Near,
    /// Within 100m of a zone boundary.
    Approaching,
    /// Within 50m of a zone boundary.
    CriticalProximity,
    /// Within the zone radius itself.
    Inside,
}

impl Proximity {
    /// Alert level this classification maps to, if any.
    pub fn level(&self) -> Option<AlertLevel> {
        match self {
            Self::Inside | Self::CriticalProximity => Some(AlertLevel::Critical),
            Self::Approaching => Some(AlertLevel::Warning),
            Self::Near => Some(AlertLevel::Info),
            Self::Safe => None,
        }
    }
}

/// Result of evaluating a point against the zone set.
#[derive(Debug, Clone)]
pub struct GeofenceAssessment {
    pub proximity: Proximity,
    /// Distance in meters to the zone that set the classification, or to the
    /// closest zone when safe. Zero when no zones are configured.
    pub distance: f64,
    /// The zone that set the classification (closest zone when safe, `None`
    /// when no zones are configured).
    pub zone: Option<DangerZone>,
}

impl GeofenceAssessment {
    /// Render the status line for this assessment.
    pub fn describe(&self) -> String {
        match (&self.proximity, &self.zone) {
            (Proximity::Inside, Some(zone)) => format!("Inside danger zone: {}", zone.name),
            (Proximity::CriticalProximity, Some(zone)) => {
                format!("Danger zone {} is {:.0}m away", zone.name, self.distance)
            }
            (Proximity::Approaching, Some(zone)) => {
                format!("Approaching danger zone {} ({:.0}m)", zone.name, self.distance)
            }
            (Proximity::Near, Some(zone)) => {
                format!("Near danger zone {} ({:.0}m)", zone.name, self.distance)
            }
            (Proximity::Safe, Some(zone)) => {
                format!("Safe (closest zone {} at {:.0}m)", zone.name, self.distance)
            }
            _ => "Safe, no danger zones configured".to_string(),
        }
    }
}

/// Great-circle distance between two lat/lon points in meters (haversine).
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

fn classify_against(distance: f64, zone: &DangerZone) -> Proximity {
    if distance <= zone.radius {
        Proximity::Inside
    } else if distance <= zone.radius + CRITICAL_MARGIN_M {
        Proximity::CriticalProximity
    } else if distance <= zone.radius + WARNING_MARGIN_M {
        Proximity::Approaching
    } else if distance <= zone.radius + INFO_MARGIN_M {
        Proximity::Near
    } else {
        Proximity::Safe
    }
}

/// Classify a point against all zones.
///
/// Severity-monotonic scan: a later zone can only escalate the running
/// classification, never downgrade it. `Inside` is authoritative and
/// short-circuits the scan as soon as any zone reports it.
pub fn evaluate(latitude: f64, longitude: f64, zones: &[DangerZone]) -> GeofenceAssessment {
    if zones.is_empty() {
        return GeofenceAssessment {
            proximity: Proximity::Safe,
            distance: 0.0,
            zone: None,
        };
    }

    let mut best: Option<(Proximity, f64, &DangerZone)> = None;
    let mut closest: Option<(f64, &DangerZone)> = None;

    for zone in zones {
        let distance = haversine_distance_m(latitude, longitude, zone.latitude, zone.longitude);

        if closest.map_or(true, |(d, _)| distance < d) {
            closest = Some((distance, zone));
        }

        let proximity = classify_against(distance, zone);
        if proximity == Proximity::Inside {
            // Being inside any zone is authoritative; stop scanning.
            return GeofenceAssessment {
                proximity: Proximity::Inside,
                distance,
                zone: Some(zone.clone()),
            };
        }

        // Only a strictly higher severity replaces the running result.
        if proximity != Proximity::Safe && best.map_or(true, |(p, _, _)| proximity > p) {
            best = Some((proximity, distance, zone));
        }
    }

    match best {
        Some((proximity, distance, zone)) => GeofenceAssessment {
            proximity,
            distance,
            zone: Some(zone.clone()),
        },
        None => {
            // closest is always Some here because zones is non-empty
            let (distance, zone) = closest.map_or((0.0, None), |(d, z)| (d, Some(z.clone())));
            GeofenceAssessment {
                proximity: Proximity::Safe,
                distance,
                zone,
            }
        }
    }
}
