use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;
use wb_config::WaybillConfig;
use wb_ledger::{ChainVerdict, LedgerEngine};
use wb_lifecycle::{authorize, OrderStatus};
use wb_location::LocationValidator;
use wb_schemas::{
    EventType, IndexedLocation, LedgerRecord, LocationFix, Order, QrCode, QrDescriptor,
    VerificationSummary,
};
use wb_store::Store;

use crate::error::OrderError;
use crate::locks::OrderLocks;

type Result<T> = std::result::Result<T, OrderError>;

/// Length of the random part of generated tracker ids.
const TRACKER_SUFFIX_LEN: usize = 9;

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: String,
    pub product_name: String,
    pub product_id: Option<String>,
    pub quantity: u32,
}

/// Result of a successful mutating operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub order: Order,
    pub record: LedgerRecord,
}

/// Order plus everything recorded about it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub history: Vec<LedgerRecord>,
    pub locations: Vec<IndexedLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub verification_base_url: String,
    pub tracker_id_prefix: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            verification_base_url: wb_config::DEFAULT_VERIFICATION_BASE_URL.to_string(),
            tracker_id_prefix: wb_config::DEFAULT_TRACKER_ID_PREFIX.to_string(),
        }
    }
}

impl From<&WaybillConfig> for ServiceConfig {
    fn from(cfg: &WaybillConfig) -> Self {
        Self {
            verification_base_url: cfg.dispatch.verification_base_url.clone(),
            tracker_id_prefix: cfg.dispatch.tracker_id_prefix.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// OrderService
// ---------------------------------------------------------------------------

/// The order lifecycle engine. Share it across threads behind an `Arc`.
pub struct OrderService<S: ?Sized> {
    store: Arc<S>,
    ledger: LedgerEngine<S>,
    validator: LocationValidator,
    cfg: ServiceConfig,
    locks: OrderLocks,
}

impl<S: Store + ?Sized> OrderService<S> {
    pub fn new(store: Arc<S>, validator: LocationValidator, cfg: ServiceConfig) -> Self {
        Self {
            ledger: LedgerEngine::new(Arc::clone(&store)),
            store,
            validator,
            cfg,
            locks: OrderLocks::new(),
        }
    }

    pub fn ledger(&self) -> &LedgerEngine<S> {
        &self.ledger
    }

    pub fn validator(&self) -> &LocationValidator {
        &self.validator
    }

    /// Mint a new order in `pending` and record `created`.
    pub fn create_order(&self, new: NewOrder) -> Result<Outcome> {
        let customer_id = required("customer_id", &new.customer_id)?;
        let product_name = required("product_name", &new.product_name)?;
        if new.quantity == 0 {
            return Err(OrderError::InvalidInput("quantity must be positive".into()));
        }
        let product_id = new
            .product_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let order_id = format!("ORD-{}", Uuid::new_v4().simple());

        self.exclusive(&order_id, || {
            let mut order = Order {
                order_id: order_id.clone(),
                customer_id,
                product_name,
                product_id,
                quantity: new.quantity,
                status: OrderStatus::Pending,
                created_at: Utc::now(),
                delivered_at: None,
                gps_tracker_id: None,
                locations: Vec::new(),
                content_hash: String::new(),
                creation_transaction_id: String::new(),
                qr_code: None,
                delivery_proof: None,
            };
            order.content_hash = compute_content_hash(&order);

            let record = self.ledger.prepare(
                &order_id,
                EventType::Created,
                json!({
                    "customer_id": order.customer_id,
                    "product_name": order.product_name,
                    "product_id": order.product_id,
                    "quantity": order.quantity,
                    "content_hash": order.content_hash,
                }),
            )?;
            order.creation_transaction_id = record.transaction_id.clone();
            self.store.commit(&order, &record, None)?;

            info!(
                order_id = %order.order_id,
                transaction_id = %record.transaction_id,
                "order created"
            );
            Ok(Outcome { order, record })
        })
    }

    /// `pending -> packed`, assign the GPS tracker and build the QR descriptor.
    pub fn dispatch(&self, order_id: &str, gps_tracker_id: Option<&str>) -> Result<Outcome> {
        let supplied = match gps_tracker_id.map(str::trim) {
            Some("") => return Err(OrderError::InvalidInput("gps_tracker_id must not be blank".into())),
            other => other.map(str::to_string),
        };

        self.exclusive(order_id, || {
            let mut order = self.load(order_id)?;
            self.authorize_logged(&order, OrderStatus::Packed)?;

            let tracker = supplied.unwrap_or_else(|| self.new_tracker_id());
            let qr_code = self.build_qr_code(&order)?;

            let record = self.ledger.prepare(
                order_id,
                EventType::Dispatched,
                json!({
                    "gps_tracker_id": tracker,
                    "qr_hash": qr_code.hash,
                }),
            )?;

            order.status = OrderStatus::Packed;
            order.gps_tracker_id = Some(tracker);
            order.qr_code = Some(qr_code);
            self.store.commit(&order, &record, None)?;

            info!(
                order_id,
                gps_tracker_id = order.gps_tracker_id.as_deref().unwrap_or_default(),
                "order dispatched"
            );
            Ok(Outcome { order, record })
        })
    }

    /// Generic forward step: any legal transition.
    ///
    /// Stepping to `delivered` stamps `delivered_at` like [`deliver`](Self::deliver)
    /// does, without a proof. Stepping to `packed` assigns no tracker; only
    /// [`dispatch`](Self::dispatch) does, and fixes are refused until one exists.
    pub fn update_status(&self, order_id: &str, new_status: OrderStatus) -> Result<Outcome> {
        self.exclusive(order_id, || {
            let mut order = self.load(order_id)?;
            self.authorize_logged(&order, new_status)?;

            let previous = order.status;
            let record = self.ledger.prepare(
                order_id,
                EventType::StatusUpdated,
                json!({
                    "previous_status": previous.as_str(),
                    "new_status": new_status.as_str(),
                }),
            )?;

            order.status = new_status;
            if new_status == OrderStatus::Delivered {
                order.delivered_at = Some(record.timestamp);
            }
            self.store.commit(&order, &record, None)?;

            info!(order_id, from = %previous, to = %new_status, "status updated");
            Ok(Outcome { order, record })
        })
    }

    /// Accept a signed GPS fix from the order's tracker.
    ///
    /// The first accepted fix of a `dispatched` order moves it to `in-transit`.
    pub fn update_location(&self, order_id: &str, fix: LocationFix) -> Result<Outcome> {
        self.exclusive(order_id, || {
            let mut order = self.load(order_id)?;

            let Some(expected) = order.gps_tracker_id.clone() else {
                warn!(order_id, got = %fix.gps_tracker_id, "location rejected: no tracker assigned");
                return Err(OrderError::TrackerMismatch {
                    expected: None,
                    got: fix.gps_tracker_id,
                });
            };

            if let Err(rejection) = self
                .validator
                .validate(&fix, &expected, order.last_location())
            {
                warn!(order_id, %rejection, "location rejected");
                return Err(rejection.into());
            }

            let next_status = if order.status == OrderStatus::Dispatched {
                authorize(order.status, OrderStatus::InTransit)?;
                OrderStatus::InTransit
            } else {
                order.status
            };

            let record = self.ledger.prepare(
                order_id,
                EventType::LocationUpdated,
                json!({
                    "latitude": fix.latitude,
                    "longitude": fix.longitude,
                    "gps_tracker_id": fix.gps_tracker_id,
                    "fix_timestamp": fix.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                    "signature": fix.signature,
                    "status": next_status.as_str(),
                }),
            )?;

            let indexed = IndexedLocation {
                order_id: order_id.to_string(),
                fix: fix.clone(),
                record_hash: record.record_hash.clone(),
            };
            order.locations.push(fix);
            order.status = next_status;
            self.store.commit(&order, &record, Some(&indexed))?;

            info!(
                order_id,
                locations = order.locations.len(),
                status = %order.status,
                "location recorded"
            );
            Ok(Outcome { order, record })
        })
    }

    /// Final step: `out-for-delivery -> delivered`.
    pub fn deliver(&self, order_id: &str, delivery_proof: Option<String>) -> Result<Outcome> {
        self.exclusive(order_id, || {
            let mut order = self.load(order_id)?;
            self.authorize_logged(&order, OrderStatus::Delivered)?;

            let record = self.ledger.prepare(
                order_id,
                EventType::Delivered,
                json!({
                    "delivery_proof": delivery_proof,
                    "locations": order.locations.len(),
                }),
            )?;

            order.status = OrderStatus::Delivered;
            order.delivered_at = Some(record.timestamp);
            order.delivery_proof = delivery_proof;
            self.store.commit(&order, &record, None)?;

            info!(order_id, "order delivered");
            Ok(Outcome { order, record })
        })
    }

    /// Public authenticity summary. Read-only; never fails on tampering,
    /// it reports it through `ledger_intact` / `content_hash_valid`.
    pub fn verify(&self, order_id: &str) -> Result<VerificationSummary> {
        let order = self.load(order_id)?;
        let history = self.ledger.history_for(order_id)?;
        let verdict = wb_ledger::verify_chain(history.iter());

        Ok(VerificationSummary {
            order_id: order.order_id.clone(),
            status: order.status,
            content_hash_valid: compute_content_hash(&order) == order.content_hash,
            content_hash: order.content_hash,
            transaction_count: history.len(),
            location_count: order.locations.len(),
            ledger_intact: verdict.is_intact(),
            created_at: order.created_at,
            delivered_at: order.delivered_at,
        })
    }

    /// Explicit audit. Returns the number of verified records, or
    /// `TamperDetected` naming the first bad record.
    pub fn audit_ledger(&self, order_id: &str) -> Result<usize> {
        let order = self.load(order_id)?;
        let history = self.ledger.history_for(order_id)?;

        let records = match wb_ledger::verify_chain(history.iter()) {
            ChainVerdict::Intact { records } => records,
            ChainVerdict::Broken {
                transaction_id,
                reason,
                ..
            } => {
                warn!(order_id, %transaction_id, %reason, "ledger tamper detected");
                return Err(OrderError::TamperDetected {
                    transaction_id,
                    reason,
                });
            }
        };

        if compute_content_hash(&order) != order.content_hash {
            return Err(self.order_tampered(&order, "order identity does not match content_hash"));
        }

        let created = history
            .iter()
            .find(|r| r.event_type == EventType::Created);
        match created {
            Some(rec)
                if rec.transaction_id == order.creation_transaction_id
                    && rec.payload.get("content_hash").and_then(|v| v.as_str())
                        == Some(order.content_hash.as_str()) => {}
            Some(_) => {
                return Err(self.order_tampered(&order, "order does not match its created record"))
            }
            None => return Err(self.order_tampered(&order, "created record missing")),
        }

        info!(order_id, records, "ledger audit passed");
        Ok(records)
    }

    pub fn get_order(&self, order_id: &str) -> Result<OrderDetails> {
        let order = self.load(order_id)?;
        Ok(OrderDetails {
            history: self.ledger.history_for(order_id)?.into_vec(),
            locations: self.store.query_locations(order_id)?,
            order,
        })
    }

    pub fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(self.store.list_orders()?)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Per-order critical section: in-process lock first, then the store's
    /// lease so other processes sharing the store are excluded too.
    fn exclusive<T>(&self, order_id: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.locks.with_order(order_id, || {
            let _lease = self.store.lock_order(order_id)?;
            f()
        })
    }

    fn load(&self, order_id: &str) -> Result<Order> {
        self.store
            .load_order(order_id)?
            .ok_or_else(|| OrderError::NotFound {
                order_id: order_id.to_string(),
            })
    }

    fn authorize_logged(&self, order: &Order, next: OrderStatus) -> Result<()> {
        authorize(order.status, next).map_err(|e| {
            warn!(order_id = %order.order_id, %e, "transition refused");
            OrderError::from(e)
        })
    }

    fn order_tampered(&self, order: &Order, reason: &str) -> OrderError {
        warn!(order_id = %order.order_id, reason, "order document tamper detected");
        OrderError::TamperDetected {
            transaction_id: order.creation_transaction_id.clone(),
            reason: reason.to_string(),
        }
    }

    fn new_tracker_id(&self) -> String {
        let suffix: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(TRACKER_SUFFIX_LEN)
            .collect();
        format!("{}{}", self.cfg.tracker_id_prefix, suffix)
    }

    fn build_qr_code(&self, order: &Order) -> Result<QrCode> {
        let generated_at = Utc::now();
        let descriptor = QrDescriptor {
            order_id: order.order_id.clone(),
            content_hash: order.content_hash.clone(),
            transaction_id: order.creation_transaction_id.clone(),
            verification_url: format!(
                "{}/{}",
                self.cfg.verification_base_url.trim_end_matches('/'),
                order.order_id
            ),
            generated_at,
        };
        let data = wb_codec::canonical_json_of(&descriptor)?;
        Ok(QrCode {
            hash: wb_codec::sha256_hex(data.as_bytes()),
            data,
            generated_at,
        })
    }
}

/// Digest of the order's identity fields (see [`Order::identity`]).
pub fn compute_content_hash(order: &Order) -> String {
    let id = order.identity();
    wb_codec::content_hash(&json!({
        "order_id": id.order_id,
        "customer_id": id.customer_id,
        "product_name": id.product_name,
        "product_id": id.product_id,
        "quantity": id.quantity,
        "created_at": id.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    }))
}

fn required(field: &str, value: &str) -> Result<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(OrderError::InvalidInput(format!("{field} is required")));
    }
    Ok(v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wb_codec::SigningKey;
    use wb_location::LocationConfig;
    use wb_store::MemoryStore;

    fn service() -> OrderService<MemoryStore> {
        OrderService::new(
            Arc::new(MemoryStore::new()),
            LocationValidator::new(LocationConfig::default(), SigningKey::from_secret_str("k")),
            ServiceConfig::default(),
        )
    }

    fn widget() -> NewOrder {
        NewOrder {
            customer_id: "C1".into(),
            product_name: "Widget".into(),
            product_id: Some("SKU-1".into()),
            quantity: 5,
        }
    }

    #[test]
    fn create_validates_required_fields() {
        let svc = service();
        for bad in [
            NewOrder { customer_id: " ".into(), ..widget() },
            NewOrder { product_name: "".into(), ..widget() },
            NewOrder { quantity: 0, ..widget() },
        ] {
            assert!(matches!(
                svc.create_order(bad).unwrap_err(),
                OrderError::InvalidInput(_)
            ));
        }
        assert!(svc.list_orders().unwrap().is_empty());
    }

    #[test]
    fn content_hash_covers_identity_fields_only() {
        let svc = service();
        let order = svc.create_order(widget()).unwrap().order;
        assert_eq!(compute_content_hash(&order), order.content_hash);

        let mut moved = order.clone();
        moved.status = OrderStatus::Packed;
        moved.gps_tracker_id = Some("GPS-1".into());
        assert_eq!(compute_content_hash(&moved), order.content_hash);

        let mut forged = order.clone();
        forged.quantity = 500;
        assert_ne!(compute_content_hash(&forged), order.content_hash);
    }

    #[test]
    fn generated_tracker_uses_configured_prefix() {
        let svc = service();
        let id = svc.create_order(widget()).unwrap().order.order_id;
        let tracker = svc.dispatch(&id, None).unwrap().order.gps_tracker_id.unwrap();
        assert!(tracker.starts_with("GPS-"));
        assert_eq!(tracker.len(), "GPS-".len() + TRACKER_SUFFIX_LEN);
    }

    #[test]
    fn qr_descriptor_binds_order_hash_and_url() {
        let svc = service();
        let created = svc.create_order(widget()).unwrap();
        let id = created.order.order_id.clone();
        let dispatched = svc.dispatch(&id, Some("GPS-abc")).unwrap();

        let qr = dispatched.order.qr_code.clone().unwrap();
        assert_eq!(qr.hash, wb_codec::sha256_hex(qr.data.as_bytes()));
        let desc: QrDescriptor = serde_json::from_str(&qr.data).unwrap();
        assert_eq!(desc.order_id, id);
        assert_eq!(desc.content_hash, created.order.content_hash);
        assert_eq!(desc.transaction_id, created.record.transaction_id);
        assert_eq!(desc.verification_url, format!("http://localhost:3000/verify/{id}"));
        assert_eq!(dispatched.record.payload["qr_hash"], qr.hash);
    }

    #[test]
    fn update_status_accepts_every_legal_step() {
        let svc = service();
        let id = svc.create_order(widget()).unwrap().order.order_id;

        let packed = svc.update_status(&id, OrderStatus::Packed).unwrap();
        assert_eq!(packed.order.status, OrderStatus::Packed);
        assert_eq!(packed.record.event_type, EventType::StatusUpdated);
        assert_eq!(packed.record.payload["previous_status"], "pending");
        assert_eq!(packed.record.payload["new_status"], "packed");
        assert!(packed.order.gps_tracker_id.is_none());

        // Without dispatch there is no tracker to accept fixes from.
        let fix = svc.validator().sign(1.0, 1.0, Utc::now(), "GPS-1");
        assert_eq!(svc.update_location(&id, fix).unwrap_err().code(), "TRACKER_MISMATCH");

        for next in [
            OrderStatus::Dispatched,
            OrderStatus::InTransit,
            OrderStatus::OutForDelivery,
        ] {
            assert_eq!(svc.update_status(&id, next).unwrap().order.status, next);
        }

        let delivered = svc.update_status(&id, OrderStatus::Delivered).unwrap();
        assert_eq!(delivered.order.status, OrderStatus::Delivered);
        assert_eq!(delivered.order.delivered_at, Some(delivered.record.timestamp));
        assert!(delivered.order.delivery_proof.is_none());

        let summary = svc.verify(&id).unwrap();
        assert_eq!(summary.transaction_count, 6);
        assert!(summary.is_authentic());
    }

    #[test]
    fn unknown_order_is_not_found_everywhere() {
        let svc = service();
        let fix = svc.validator().sign(0.0, 0.0, Utc::now(), "GPS-1");
        let errs = [
            svc.dispatch("ORD-x", None).unwrap_err(),
            svc.update_status("ORD-x", OrderStatus::Dispatched).unwrap_err(),
            svc.update_location("ORD-x", fix).unwrap_err(),
            svc.deliver("ORD-x", None).unwrap_err(),
            svc.verify("ORD-x").unwrap_err(),
            svc.audit_ledger("ORD-x").unwrap_err(),
            svc.get_order("ORD-x").unwrap_err(),
        ];
        for e in errs {
            assert_eq!(e.code(), "NOT_FOUND", "{e}");
        }
    }
}
