//! Order state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Initialized ──► Paid ──► Completed
///      │           │
///      └───────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Order was placed from a confirmed cart and awaits payment.
    Initialized,

    Paid,

    /// Order has been completed (terminal state).
    Completed,

    /// Order was cancelled (terminal state).
    Cancelled,
}

impl OrderStatus {
    pub fn can_record_payment(&self) -> bool {
        matches!(self, OrderStatus::Initialized)
    }

    pub fn can_complete(&self) -> bool {
        matches!(self, OrderStatus::Paid)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Initialized | OrderStatus::Paid)
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Initialized => "Initialized",
            OrderStatus::Paid => "Paid",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_initialized_can_record_payment() {
        assert!(OrderStatus::Initialized.can_record_payment());
        assert!(!OrderStatus::Paid.can_record_payment());
        assert!(!OrderStatus::Completed.can_record_payment());
        assert!(!OrderStatus::Cancelled.can_record_payment());
    }

    #[test]
    fn test_only_paid_can_complete() {
        assert!(!OrderStatus::Initialized.can_complete());
        assert!(OrderStatus::Paid.can_complete());
        assert!(!OrderStatus::Completed.can_complete());
        assert!(!OrderStatus::Cancelled.can_complete());
    }

    #[test]
    fn test_can_cancel_from_non_terminal_states() {
        assert!(OrderStatus::Initialized.can_cancel());
        assert!(OrderStatus::Paid.can_cancel());
        assert!(!OrderStatus::Completed.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OrderStatus::Initialized.is_terminal());
        assert!(!OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(OrderStatus::Initialized.to_string(), "Initialized");
        assert_eq!(OrderStatus::Cancelled.to_string(), "Cancelled");
    }
}
