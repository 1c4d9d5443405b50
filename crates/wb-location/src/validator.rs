use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use wb_codec::SigningKey;
use wb_schemas::LocationFix;

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const DEFAULT_MAX_JUMP_KM: f64 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Largest accepted distance between consecutive fixes (closed bound).
    pub max_jump_km: f64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            max_jump_km: DEFAULT_MAX_JUMP_KM,
        }
    }
}

/// Why a fix was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationRejection {
    TrackerMismatch { expected: String, got: String },
    SignatureInvalid,
    /// Latitude outside [-90, 90], longitude outside [-180, 180], or not finite.
    InvalidCoordinates { latitude: f64, longitude: f64 },
    Implausible { distance_km: f64, max_km: f64 },
}

impl std::fmt::Display for LocationRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationRejection::TrackerMismatch { expected, got } => {
                write!(f, "GPS tracker mismatch: expected {expected}, got {got}")
            }
            LocationRejection::SignatureInvalid => f.write_str("GPS fix signature invalid"),
            LocationRejection::InvalidCoordinates {
                latitude,
                longitude,
            } => write!(f, "invalid coordinates ({latitude}, {longitude})"),
            LocationRejection::Implausible {
                distance_km,
                max_km,
            } => write!(
                f,
                "implausible location jump: {distance_km:.1} km exceeds {max_km} km"
            ),
        }
    }
}

impl std::error::Error for LocationRejection {}

/// Validates fixes against one deployment's signing key and jump limit.
#[derive(Debug, Clone)]
pub struct LocationValidator {
    cfg: LocationConfig,
    key: SigningKey,
}

impl LocationValidator {
    pub fn new(cfg: LocationConfig, key: SigningKey) -> Self {
        Self { cfg, key }
    }

    pub fn config(&self) -> &LocationConfig {
        &self.cfg
    }

    /// First fix (no predecessor) is always plausible.
    pub fn check_plausibility(&self, current: &LocationFix, previous: Option<&LocationFix>) -> bool {
        match previous {
            None => true,
            Some(prev) => within_bound(self.jump_km(current, prev), self.cfg.max_jump_km),
        }
    }

    pub fn authenticate(&self, fix: &LocationFix, expected_tracker_id: &str) -> bool {
        authenticate(fix, expected_tracker_id, &self.key)
    }

    /// Full acceptance check, in order: tracker, signature, coordinates, jump.
    pub fn validate(
        &self,
        fix: &LocationFix,
        expected_tracker_id: &str,
        previous: Option<&LocationFix>,
    ) -> Result<(), LocationRejection> {
        if fix.gps_tracker_id != expected_tracker_id {
            return Err(LocationRejection::TrackerMismatch {
                expected: expected_tracker_id.to_string(),
                got: fix.gps_tracker_id.clone(),
            });
        }
        if !self.authenticate(fix, expected_tracker_id) {
            return Err(LocationRejection::SignatureInvalid);
        }
        if !coordinates_valid(fix.latitude, fix.longitude) {
            return Err(LocationRejection::InvalidCoordinates {
                latitude: fix.latitude,
                longitude: fix.longitude,
            });
        }
        if let Some(prev) = previous {
            let distance_km = self.jump_km(fix, prev);
            if !within_bound(distance_km, self.cfg.max_jump_km) {
                return Err(LocationRejection::Implausible {
                    distance_km,
                    max_km: self.cfg.max_jump_km,
                });
            }
        }
        Ok(())
    }

    /// Sign a fix with this validator's key.
    pub fn sign(
        &self,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
        gps_tracker_id: &str,
    ) -> LocationFix {
        sign_fix(&self.key, latitude, longitude, timestamp, gps_tracker_id)
    }

    fn jump_km(&self, current: &LocationFix, previous: &LocationFix) -> f64 {
        haversine_km(
            (previous.latitude, previous.longitude),
            (current.latitude, current.longitude),
        )
    }
}

fn coordinates_valid(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}

/// Closed bound; a NaN distance is never within it.
fn within_bound(distance_km: f64, max_km: f64) -> bool {
    distance_km <= max_km
}

/// Great-circle distance in km between two `(lat, lon)` points in degrees.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = lon2 - lon1;

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h just past 1 for near-antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Tracker-id check, then signature check.
pub fn authenticate(fix: &LocationFix, expected_tracker_id: &str, key: &SigningKey) -> bool {
    if fix.gps_tracker_id != expected_tracker_id {
        return false;
    }
    let fields = signing_fields(fix.latitude, fix.longitude, &fix.timestamp, &fix.gps_tracker_id);
    let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
    wb_codec::verify(key, &refs, &fix.signature)
}

/// Canonical signed projection: latitude, longitude, timestamp (RFC 3339,
/// millisecond precision, `Z`), tracker id.
pub fn signing_fields(
    latitude: f64,
    longitude: f64,
    timestamp: &DateTime<Utc>,
    gps_tracker_id: &str,
) -> [String; 4] {
    [
        latitude.to_string(),
        longitude.to_string(),
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        gps_tracker_id.to_string(),
    ]
}

/// Build a signed fix. Used by tracker firmware shims, the CLI and tests.
pub fn sign_fix(
    key: &SigningKey,
    latitude: f64,
    longitude: f64,
    timestamp: DateTime<Utc>,
    gps_tracker_id: &str,
) -> LocationFix {
    let fields = signing_fields(latitude, longitude, &timestamp, gps_tracker_id);
    let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
    LocationFix {
        latitude,
        longitude,
        gps_tracker_id: gps_tracker_id.to_string(),
        timestamp,
        signature: wb_codec::sign(key, &refs),
    }
}
