use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// Every status a shipment can occupy, in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    /// Order recorded, nothing physical has happened yet. The only initial state.
    Pending,
    /// Goods packed and a GPS tracker assigned.
    Packed,
    /// Handed to the carrier.
    Dispatched,
    /// At least one GPS fix received while moving.
    InTransit,
    /// On the last leg.
    OutForDelivery,
    /// Delivered to the customer. **Terminal.**
    Delivered,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Packed,
        OrderStatus::Dispatched,
        OrderStatus::InTransit,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Packed => "packed",
            OrderStatus::Dispatched => "dispatched",
            OrderStatus::InTransit => "in-transit",
            OrderStatus::OutForDelivery => "out-for-delivery",
            OrderStatus::Delivered => "delivered",
        }
    }

    /// Parse the wire name. Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    /// The single permitted next status, or `None` when terminal.
    pub fn successor(&self) -> Option<Self> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Packed),
            OrderStatus::Packed => Some(OrderStatus::Dispatched),
            OrderStatus::Dispatched => Some(OrderStatus::InTransit),
            OrderStatus::InTransit => Some(OrderStatus::OutForDelivery),
            OrderStatus::OutForDelivery => Some(OrderStatus::Delivered),
            OrderStatus::Delivered => None,
        }
    }

    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        self.successor().is_none()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Transition predicate
// ---------------------------------------------------------------------------

/// True iff `next` is the single permitted successor of `current`.
///
/// Same-state, skip-ahead and backwards moves are all illegal.
pub fn is_legal_transition(current: OrderStatus, next: OrderStatus) -> bool {
    current.successor() == Some(next)
}

/// String form of [`is_legal_transition`]. Unknown names on either side fail closed.
pub fn is_legal_transition_str(current: &str, next: &str) -> bool {
    match (OrderStatus::parse(current), OrderStatus::parse(next)) {
        (Some(c), Some(n)) => is_legal_transition(c, n),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

/// Returned when a requested status change is not permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    /// The status the order was in.
    pub from: OrderStatus,
    /// The status that was requested.
    pub to: OrderStatus,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid status transition from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

/// [`is_legal_transition`] packaged for callers that propagate with `?`.
pub fn authorize(current: OrderStatus, next: OrderStatus) -> Result<(), TransitionError> {
    if is_legal_transition(current, next) {
        Ok(())
    } else {
        Err(TransitionError {
            from: current,
            to: next,
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const LEGAL: [(OrderStatus, OrderStatus); 5] = [
        (OrderStatus::Pending, OrderStatus::Packed),
        (OrderStatus::Packed, OrderStatus::Dispatched),
        (OrderStatus::Dispatched, OrderStatus::InTransit),
        (OrderStatus::InTransit, OrderStatus::OutForDelivery),
        (OrderStatus::OutForDelivery, OrderStatus::Delivered),
    ];

    #[test]
    fn table_entries_are_legal_and_nothing_else_is() {
        for current in OrderStatus::ALL {
            for next in OrderStatus::ALL {
                let expected = LEGAL.contains(&(current, next));
                assert_eq!(
                    is_legal_transition(current, next),
                    expected,
                    "{current} -> {next}"
                );
            }
        }
    }

    #[test]
    fn delivered_has_no_successors() {
        assert!(OrderStatus::Delivered.is_terminal());
        for next in OrderStatus::ALL {
            assert!(!is_legal_transition(OrderStatus::Delivered, next));
        }
        assert_eq!(
            OrderStatus::ALL.iter().filter(|s| s.is_terminal()).count(),
            1
        );
    }

    #[test]
    fn unknown_names_fail_closed() {
        assert!(is_legal_transition_str("pending", "packed"));
        assert!(!is_legal_transition_str("lost", "packed"));
        assert!(!is_legal_transition_str("pending", "lost"));
        assert!(!is_legal_transition_str("", ""));
        assert!(!is_legal_transition_str("Pending", "packed"));
    }

    #[test]
    fn wire_names_round_trip() {
        for st in OrderStatus::ALL {
            assert_eq!(OrderStatus::parse(st.as_str()), Some(st));
            let json = serde_json::to_string(&st).unwrap();
            assert_eq!(json, format!("\"{}\"", st.as_str()));
        }
    }

    #[test]
    fn authorize_reports_both_states() {
        let err = authorize(OrderStatus::Pending, OrderStatus::Delivered).unwrap_err();
        assert_eq!(err.from, OrderStatus::Pending);
        assert_eq!(err.to, OrderStatus::Delivered);
        assert_eq!(
            err.to_string(),
            "invalid status transition from pending to delivered"
        );
        assert!(authorize(OrderStatus::Packed, OrderStatus::Dispatched).is_ok());
    }
}
