//! wb-service
//!
//! Order lifecycle orchestration. Every mutating operation runs as
//! "authorize -> prepare ledger record -> mutate -> commit" while holding the
//! in-process order lock and the store's order lease. The commit writes the
//! order and its record together, so a failure leaves no trace.

mod error;
mod locks;
mod service;

pub use error::OrderError;
pub use locks::OrderLocks;
pub use service::{
    compute_content_hash, NewOrder, OrderDetails, OrderService, Outcome, ServiceConfig,
};
