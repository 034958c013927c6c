//! Cart service.

use common::AggregateId;
use event_store::EventStore;

use crate::command::{CommandHandler, CommandResult};
use crate::config::HandlerConfig;
use crate::error::DomainError;

use super::{AddProduct, CancelCart, Cart, ConfirmCart, InitializeCart, RemoveProduct};

/// Service for managing shopping carts.
pub struct CartService<S: EventStore> {
    handler: CommandHandler<S, Cart>,
}

impl<S: EventStore> CartService<S> {
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

    pub fn handler(&self) -> &CommandHandler<S, Cart> {
        &self.handler
    }

    /// Opens a new cart; the new cart id is in the result.
    #[tracing::instrument(skip(self, cmd), fields(client_id = %cmd.client_id))]
    pub async fn initialize_cart(
        &self,
        cmd: InitializeCart,
    ) -> Result<CommandResult<Cart>, DomainError> {
        self.handler.handle(cmd).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_product(&self, cmd: AddProduct) -> Result<CommandResult<Cart>, DomainError> {
        self.handler.handle(cmd).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_product(
        &self,
        cmd: RemoveProduct,
    ) -> Result<CommandResult<Cart>, DomainError> {
        self.handler.handle(cmd).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn confirm_cart(&self, cmd: ConfirmCart) -> Result<CommandResult<Cart>, DomainError> {
        self.handler.handle(cmd).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel_cart(&self, cmd: CancelCart) -> Result<CommandResult<Cart>, DomainError> {
        self.handler.handle(cmd).await
    }

    /// Loads a cart by ID, or None if it doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, cart_id: AggregateId) -> Result<Option<Cart>, DomainError> {
        Ok(self
            .handler
            .repository()
            .load_existing(cart_id)
            .await?
            .map(|loaded| loaded.aggregate))
    }
}
