//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod state;

pub use aggregate::Order;
pub use commands::{CancelOrder, CompleteOrder, InitializeOrder, RecordOrderPayment};
pub use events::{
    OrderCancelledData, OrderCompletedData, OrderEvent, OrderInitializedData,
    OrderPaymentRecordedData,
};
pub use service::OrderService;
pub use state::OrderStatus;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value_objects::Money;

/// Why an order was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CancellationReason {
    NotAvailableProduct,
    PaymentFailed,
    CancelledByClient,
    Timeout,
}

impl CancellationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationReason::NotAvailableProduct => "NotAvailableProduct",
            CancellationReason::PaymentFailed => "PaymentFailed",
            CancellationReason::CancelledByClient => "CancelledByClient",
            CancellationReason::Timeout => "Timeout",
        }
    }
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order already initialized")]
    AlreadyInitialized,

    #[error("Order is not initialized")]
    NotInitialized,

    /// Order is not in the expected state.
    #[error("Invalid state transition: cannot {action} from {current_status} state")]
    InvalidStateTransition {
        current_status: OrderStatus,
        action: &'static str,
    },

    #[error("Order has no product items")]
    EmptyProductItems,

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Invalid price: {price} (must be greater than 0)")]
    InvalidPrice { price: Money },

    /// The declared total does not match the items.
    #[error("Total price {declared} does not match product items total {computed}")]
    TotalPriceMismatch { declared: Money, computed: Money },

    #[error("Product items total does not fit in a money amount")]
    TotalPriceOverflow,
}
