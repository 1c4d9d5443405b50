use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use wb_lifecycle::OrderStatus;

/// One shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub customer_id: String,
    pub product_name: String,
    pub product_id: Option<String>,
    pub quantity: u32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    /// Assigned at dispatch; never changes afterwards.
    pub gps_tracker_id: Option<String>,
    /// Append-only.
    pub locations: Vec<LocationFix>,
    /// Digest of [`OrderIdentity`].
    pub content_hash: String,
    /// Transaction id of the `created` ledger record.
    pub creation_transaction_id: String,
    pub qr_code: Option<QrCode>,
    pub delivery_proof: Option<String>,
}

impl Order {
    /// The immutable creation fields covered by `content_hash`.
    pub fn identity(&self) -> OrderIdentity {
        OrderIdentity {
            order_id: self.order_id.clone(),
            customer_id: self.customer_id.clone(),
            product_name: self.product_name.clone(),
            product_id: self.product_id.clone(),
            quantity: self.quantity,
            created_at: self.created_at,
        }
    }

    pub fn last_location(&self) -> Option<&LocationFix> {
        self.locations.last()
    }
}

/// Identity-defining fields of an order, hashed into `Order::content_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIdentity {
    pub order_id: String,
    pub customer_id: String,
    pub product_name: String,
    pub product_id: Option<String>,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle events recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Dispatched,
    StatusUpdated,
    LocationUpdated,
    Delivered,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Dispatched => "dispatched",
            EventType::StatusUpdated => "status_updated",
            EventType::LocationUpdated => "location_updated",
            EventType::Delivered => "delivered",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only ledger entry.
///
/// `prev_hash` links to the previous record of the same order; `record_hash`
/// covers everything except `transaction_id` and itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub transaction_id: String,
    pub order_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    pub prev_hash: Option<String>,
    pub record_hash: String,
}

/// One GPS observation as reported by a tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub gps_tracker_id: String,
    pub timestamp: DateTime<Utc>,
    /// HMAC-SHA256 hex over latitude, longitude, timestamp, tracker id.
    pub signature: String,
}

/// Standalone location index entry (mirrors `Order::locations`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedLocation {
    pub order_id: String,
    pub fix: LocationFix,
    /// `record_hash` of the `location_updated` record that accepted this fix.
    pub record_hash: String,
}

/// What gets encoded into the shipping label QR code at dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrDescriptor {
    pub order_id: String,
    pub content_hash: String,
    pub transaction_id: String,
    pub verification_url: String,
    pub generated_at: DateTime<Utc>,
}

/// QR payload as stored on the order: canonical JSON plus its digest.
/// Rendering the image is left to presentation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrCode {
    pub data: String,
    pub hash: String,
    pub generated_at: DateTime<Utc>,
}

/// Public authenticity summary. Carries no customer, product, tracker or
/// proof fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub order_id: String,
    pub status: OrderStatus,
    pub content_hash: String,
    /// Recomputed identity digest matches `content_hash`.
    pub content_hash_valid: bool,
    pub transaction_count: usize,
    pub location_count: usize,
    /// Every record verifies and the per-order chain is unbroken.
    pub ledger_intact: bool,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl VerificationSummary {
    pub fn is_authentic(&self) -> bool {
        self.content_hash_valid && self.ledger_intact
    }
}
