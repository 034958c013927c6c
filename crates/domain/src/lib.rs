//! Domain layer for order/cart processing.
//!
//! - [`Aggregate`] and [`DomainEvent`]: state folded from an event stream
//! - [`Repository`]: loads aggregates by replay and saves new events with
//!   optimistic concurrency
//! - [`Command`] and [`CommandHandler`]: load, decide, append, retry on conflict
//! - [`Order`] and [`Cart`] aggregates with their commands and services

pub mod aggregate;
pub mod cart;
pub mod command;
pub mod config;
pub mod error;
pub mod order;
pub mod repository;
pub mod value_objects;

pub use aggregate::{Aggregate, DomainEvent};
pub use cart::{
    AddProduct, CancelCart, Cart, CartError, CartEvent, CartService, CartStatus, ConfirmCart,
    InitializeCart, RemoveProduct,
};
pub use command::{Command, CommandHandler, CommandResult, CommandTarget};
pub use config::HandlerConfig;
pub use error::{DomainError, ValidationError};
pub use order::{
    CancelOrder, CancellationReason, CompleteOrder, InitializeOrder, Order, OrderError, OrderEvent,
    OrderService, OrderStatus, RecordOrderPayment,
};
pub use repository::{Loaded, Repository};
pub use value_objects::{ClientId, Money, PaymentId, PricedProductItem, ProductId};
