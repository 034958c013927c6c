//! Cart summary read model.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{CartEvent, CartStatus, ClientId, Money, PricedProductItem};
use event_store::{EventEnvelope, Version};
use tokio::sync::RwLock;

use crate::projection::{Admission, AppliedVersions, Projection, ProjectionPosition};
use crate::read_model::ReadModel;
use crate::{ProjectionError, Result};

const VIEW_NAME: &str = "CartSummaryView";

#[derive(Debug, Clone, PartialEq)]
pub struct CartSummary {
    pub cart_id: AggregateId,
    pub client_id: ClientId,
    pub status: CartStatus,
    pub product_items: Vec<PricedProductItem>,
    pub total_price: Money,
    pub initialized_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: Version,
}

impl CartSummary {
    /// Total quantity across all lines.
    pub fn item_count(&self) -> u32 {
        self.product_items.iter().map(|item| item.quantity).sum()
    }

    fn add(&mut self, item: PricedProductItem) {
        match self
            .product_items
            .iter()
            .position(|existing| existing.matches(&item))
        {
            Some(index) => self.product_items[index].quantity += item.quantity,
            None => self.product_items.push(item),
        }
        self.recalculate_total();
    }

    fn remove(&mut self, item: PricedProductItem) {
        if let Some(index) = self
            .product_items
            .iter()
            .position(|existing| existing.matches(&item))
        {
            let line = &mut self.product_items[index];
            line.quantity = line.quantity.saturating_sub(item.quantity);
            if line.quantity == 0 {
                self.product_items.remove(index);
            }
        }
        self.recalculate_total();
    }

    fn recalculate_total(&mut self) {
        self.total_price = self.product_items.iter().map(|i| i.total_price()).sum();
    }
}

#[derive(Default)]
struct State {
    carts: HashMap<AggregateId, CartSummary>,
    applied: AppliedVersions,
    position: ProjectionPosition,
}

/// Read model over every cart stream, idempotent per `(stream, version)`.
#[derive(Clone, Default)]
pub struct CartSummaryView {
    state: Arc<RwLock<State>>,
}

impl CartSummaryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_cart(&self, cart_id: AggregateId) -> Option<CartSummary> {
        self.state.read().await.carts.get(&cart_id).cloned()
    }

    pub async fn get_all_carts(&self) -> Vec<CartSummary> {
        self.state.read().await.carts.values().cloned().collect()
    }

    pub async fn get_carts_by_client(&self, client_id: ClientId) -> Vec<CartSummary> {
        self.state
            .read()
            .await
            .carts
            .values()
            .filter(|c| c.client_id == client_id)
            .cloned()
            .collect()
    }

    pub async fn get_carts_by_status(&self, status: CartStatus) -> Vec<CartSummary> {
        self.state
            .read()
            .await
            .carts
            .values()
            .filter(|c| c.status == status)
            .cloned()
            .collect()
    }

    pub async fn last_applied_version(&self, cart_id: AggregateId) -> Option<Version> {
        self.state.read().await.applied.last(cart_id)
    }
}

fn apply(
    carts: &mut HashMap<AggregateId, CartSummary>,
    envelope: &EventEnvelope,
    event: CartEvent,
) -> Result<()> {
    if let CartEvent::CartInitialized(data) = &event {
        carts.insert(
            envelope.aggregate_id,
            CartSummary {
                cart_id: envelope.aggregate_id,
                client_id: data.client_id,
                status: CartStatus::Pending,
                product_items: Vec::new(),
                total_price: Money::zero(),
                initialized_at: data.initialized_at,
                updated_at: data.initialized_at,
                version: envelope.version,
            },
        );
        return Ok(());
    }

    let cart = carts
        .get_mut(&envelope.aggregate_id)
        .ok_or(ProjectionError::MissingEntry {
            view: VIEW_NAME,
            aggregate_id: envelope.aggregate_id,
            version: envelope.version,
        })?;

    match event {
        CartEvent::CartInitialized(_) => {}
        CartEvent::ProductAdded(data) => {
            cart.add(data.product_item);
            cart.updated_at = envelope.occurred_at;
        }
        CartEvent::ProductRemoved(data) => {
            cart.remove(data.product_item);
            cart.updated_at = envelope.occurred_at;
        }
        CartEvent::CartConfirmed(data) => {
            cart.status = CartStatus::Confirmed;
            cart.updated_at = data.confirmed_at;
        }
        CartEvent::CartCancelled(data) => {
            cart.status = CartStatus::Cancelled;
            cart.updated_at = data.cancelled_at;
        }
    }
    cart.version = envelope.version;

    Ok(())
}

#[async_trait]
impl Projection for CartSummaryView {
    fn name(&self) -> &'static str {
        VIEW_NAME
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        if event.aggregate_type != "Cart" {
            return Ok(());
        }

        let mut state = self.state.write().await;
        match state.applied.admit(event) {
            Admission::Apply => {}
            Admission::Duplicate => {
                tracing::debug!(
                    aggregate_id = %event.aggregate_id,
                    version = %event.version,
                    "skipping already applied cart event"
                );
                return Ok(());
            }
            Admission::Gap { expected } => {
                return Err(ProjectionError::OutOfOrder {
                    view: VIEW_NAME,
                    aggregate_id: event.aggregate_id,
                    expected,
                    found: event.version,
                });
            }
        }

        let cart_event: CartEvent = event.decode()?;
        apply(&mut state.carts, event, cart_event)?;
        state.applied.record(event);
        state.position = state.position.advance();

        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        *self.state.write().await = State::default();
        Ok(())
    }
}

impl ReadModel for CartSummaryView {
    fn name(&self) -> &'static str {
        VIEW_NAME
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.carts.len()).unwrap_or(0)
    }
}
