//! Shopping cart aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;

pub use aggregate::{Cart, CartStatus};
pub use commands::{AddProduct, CancelCart, ConfirmCart, InitializeCart, RemoveProduct};
pub use events::{
    CartCancelledData, CartConfirmedData, CartEvent, CartInitializedData, ProductAddedData,
    ProductRemovedData,
};
pub use service::CartService;

use thiserror::Error;

use crate::value_objects::{Money, ProductId};

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("Cart already initialized")]
    AlreadyInitialized,

    #[error("Cart is not initialized")]
    NotInitialized,

    /// Only pending carts accept changes.
    #[error("Cannot {action} a cart that is {status}")]
    NotPending {
        status: CartStatus,
        action: &'static str,
    },

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Invalid price: {price} (must be greater than 0)")]
    InvalidPrice { price: Money },

    /// The cart does not hold enough of the product at that price.
    #[error("Cannot remove {requested} of {product_id}: cart holds {available}")]
    NotEnoughProduct {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("Cannot confirm an empty cart")]
    Empty,

    /// Adding would push the line for this product past `u32::MAX`.
    #[error("Cannot add {added} of {product_id}: cart already holds {current}")]
    QuantityOverflow {
        product_id: ProductId,
        current: u32,
        added: u32,
    },

    #[error("Cart total does not fit in a money amount")]
    TotalPriceOverflow,
}
