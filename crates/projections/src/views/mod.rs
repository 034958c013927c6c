//! Read model views for the query side.

pub mod cart_summary;
pub mod order_summary;

pub use cart_summary::{CartSummary, CartSummaryView};
pub use order_summary::{OrderSummary, OrderSummaryView};
