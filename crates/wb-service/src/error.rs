use wb_lifecycle::{OrderStatus, TransitionError};
use wb_location::LocationRejection;

/// Every outcome an order operation can fail with.
///
/// All variants except `Storage` are domain outcomes: the operation was
/// refused and nothing was written. `Storage` wraps an infrastructure fault
/// from the store, passed through unchanged.
#[derive(Debug)]
pub enum OrderError {
    NotFound { order_id: String },
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    /// `expected` is `None` when the order has no tracker yet.
    TrackerMismatch { expected: Option<String>, got: String },
    ImplausibleLocation { distance_km: f64, max_km: f64 },
    SignatureInvalid,
    TamperDetected { transaction_id: String, reason: String },
    InvalidInput(String),
    Storage(anyhow::Error),
}

impl OrderError {
    /// Stable machine-readable code, e.g. for HTTP mapping by callers.
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::NotFound { .. } => "NOT_FOUND",
            OrderError::InvalidTransition { .. } => "INVALID_TRANSITION",
            OrderError::TrackerMismatch { .. } => "TRACKER_MISMATCH",
            OrderError::ImplausibleLocation { .. } => "IMPLAUSIBLE_LOCATION",
            OrderError::SignatureInvalid => "SIGNATURE_INVALID",
            OrderError::TamperDetected { .. } => "TAMPER_DETECTED",
            OrderError::InvalidInput(_) => "INVALID_INPUT",
            OrderError::Storage(_) => "STORAGE",
        }
    }
}

impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderError::NotFound { order_id } => write!(f, "order not found: {order_id}"),
            OrderError::InvalidTransition { from, to } => {
                write!(f, "invalid status transition from {from} to {to}")
            }
            OrderError::TrackerMismatch { expected, got } => match expected {
                Some(e) => write!(f, "GPS tracker mismatch: expected {e}, got {got}"),
                None => write!(f, "GPS tracker mismatch: order has no tracker, got {got}"),
            },
            OrderError::ImplausibleLocation {
                distance_km,
                max_km,
            } => write!(
                f,
                "location change appears unrealistic: {distance_km:.1} km exceeds {max_km} km"
            ),
            OrderError::SignatureInvalid => f.write_str("GPS fix signature invalid"),
            OrderError::TamperDetected {
                transaction_id,
                reason,
            } => write!(f, "ledger tamper detected at {transaction_id}: {reason}"),
            OrderError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            OrderError::Storage(e) => write!(f, "storage: {e:#}"),
        }
    }
}

impl std::error::Error for OrderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OrderError::Storage(e) => Some(&**e),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for OrderError {
    fn from(e: anyhow::Error) -> Self {
        OrderError::Storage(e)
    }
}

impl From<TransitionError> for OrderError {
    fn from(e: TransitionError) -> Self {
        OrderError::InvalidTransition {
            from: e.from,
            to: e.to,
        }
    }
}

impl From<LocationRejection> for OrderError {
    fn from(r: LocationRejection) -> Self {
        match r {
            LocationRejection::TrackerMismatch { expected, got } => OrderError::TrackerMismatch {
                expected: Some(expected),
                got,
            },
            LocationRejection::SignatureInvalid => OrderError::SignatureInvalid,
            LocationRejection::InvalidCoordinates {
                latitude,
                longitude,
            } => OrderError::InvalidInput(format!(
                "coordinates out of range: ({latitude}, {longitude})"
            )),
            LocationRejection::Implausible {
                distance_km,
                max_km,
            } => OrderError::ImplausibleLocation {
                distance_km,
                max_km,
            },
        }
    }
}
