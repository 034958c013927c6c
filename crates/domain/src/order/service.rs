//! Order service providing a simplified API for order operations.

use common::AggregateId;
use event_store::EventStore;

use crate::command::{CommandHandler, CommandResult};
use crate::config::HandlerConfig;
use crate::error::DomainError;

use super::{CancelOrder, CompleteOrder, InitializeOrder, Order, RecordOrderPayment};

/// Service for managing orders.
///
/// Thin facade over a [`CommandHandler`] for the order aggregate.
pub struct OrderService<S: EventStore> {
    handler: CommandHandler<S, Order>,
}

impl<S: EventStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn with_config(store: S, config: HandlerConfig) -> Self {
        Self {
            handler: CommandHandler::with_config(store, config),
        }
    }

    /// Returns a reference to the underlying command handler.
    pub fn handler(&self) -> &CommandHandler<S, Order> {
        &self.handler
    }

    /// Places a new order; the new order id is in the result.
    #[tracing::instrument(skip(self, cmd), fields(client_id = %cmd.client_id))]
    pub async fn initialize_order(
        &self,
        cmd: InitializeOrder,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler.handle(cmd).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn record_payment(
        &self,
        cmd: RecordOrderPayment,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler.handle(cmd).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn complete_order(
        &self,
        cmd: CompleteOrder,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler.handle(cmd).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        cmd: CancelOrder,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.handler.handle(cmd).await
    }

    /// Loads an order by ID.
    ///
    /// Returns None if the order doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>, DomainError> {
        Ok(self
            .handler
            .repository()
            .load_existing(order_id)
            .await?
            .map(|loaded| loaded.aggregate))
    }
}
