//! wb-lifecycle
//!
//! Shipment status state machine.
//!
//! # Design
//!
//! A single linear chain with no branching and no rollback. The transition
//! predicate is total over the status enum and pure; callers turn a `false`
//! into a rejected operation and leave the order untouched.
//!
//! ```text
//!   pending ──► packed ──► dispatched ──► in-transit ──► out-for-delivery ──► delivered (term.)
//! ```

mod status;

pub use status::{authorize, is_legal_transition, is_legal_transition_str, OrderStatus, TransitionError};
