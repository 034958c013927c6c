//! Cart domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::value_objects::{ClientId, PricedProductItem};

/// Events that can occur on a cart aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CartEvent {
    CartInitialized(CartInitializedData),
    ProductAdded(ProductAddedData),
    ProductRemoved(ProductRemovedData),
    CartConfirmed(CartConfirmedData),
    CartCancelled(CartCancelledData),
}

impl DomainEvent for CartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CartEvent::CartInitialized(_) => "CartInitialized",
            CartEvent::ProductAdded(_) => "ProductAdded",
            CartEvent::ProductRemoved(_) => "ProductRemoved",
            CartEvent::CartConfirmed(_) => "CartConfirmed",
            CartEvent::CartCancelled(_) => "CartCancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartInitializedData {
    pub cart_id: AggregateId,
    pub client_id: ClientId,
    pub initialized_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAddedData {
    pub cart_id: AggregateId,
    pub product_item: PricedProductItem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRemovedData {
    pub cart_id: AggregateId,

    /// Product, unit price and the quantity taken out.
    pub product_item: PricedProductItem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartConfirmedData {
    pub cart_id: AggregateId,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartCancelledData {
    pub cart_id: AggregateId,
    pub cancelled_at: DateTime<Utc>,
}

impl CartEvent {
    pub fn cart_initialized(cart_id: AggregateId, client_id: ClientId) -> Self {
        CartEvent::CartInitialized(CartInitializedData {
            cart_id,
            client_id,
            initialized_at: Utc::now(),
        })
    }

    pub fn product_added(cart_id: AggregateId, product_item: PricedProductItem) -> Self {
        CartEvent::ProductAdded(ProductAddedData {
            cart_id,
            product_item,
        })
    }

    pub fn product_removed(cart_id: AggregateId, product_item: PricedProductItem) -> Self {
        CartEvent::ProductRemoved(ProductRemovedData {
            cart_id,
            product_item,
        })
    }

    pub fn cart_confirmed(cart_id: AggregateId) -> Self {
        CartEvent::CartConfirmed(CartConfirmedData {
            cart_id,
            confirmed_at: Utc::now(),
        })
    }

    pub fn cart_cancelled(cart_id: AggregateId) -> Self {
        CartEvent::CartCancelled(CartCancelledData {
            cart_id,
            cancelled_at: Utc::now(),
        })
    }
}
