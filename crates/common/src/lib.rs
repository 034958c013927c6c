//! Identifier types shared by the event store, the domain and the projections.

mod types;

pub use types::{AggregateId, ParseAggregateIdError};
