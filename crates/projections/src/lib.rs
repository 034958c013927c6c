//! Read models for orders and carts.
//!
//! - [`Projection`] trait for folding committed events into a read model
//! - [`ProjectionSubscriber`] to receive live events from the dispatcher
//! - [`ProjectionProcessor`] for catch-up and rebuild from the event store
//! - Two views: order summaries and cart summaries
//!
//! Every view remembers the last version it applied per stream, so a
//! redelivered event is recognised and ignored, and an event that arrives
//! ahead of an earlier one of its stream is refused until the gap is filled.

pub mod error;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Admission, AppliedVersions, Projection, ProjectionPosition, ProjectionSubscriber};
pub use read_model::ReadModel;
pub use views::{CartSummary, CartSummaryView, OrderSummary, OrderSummaryView};
