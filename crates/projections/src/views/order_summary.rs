//! Order summary read model: one row per order, in any status.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{
    CancellationReason, ClientId, Money, OrderEvent, OrderStatus, PaymentId, PricedProductItem,
};
use event_store::{EventEnvelope, Version};
use tokio::sync::RwLock;

use crate::projection::{Admission, AppliedVersions, Projection, ProjectionPosition};
use crate::read_model::ReadModel;
use crate::{ProjectionError, Result};

const VIEW_NAME: &str = "OrderSummaryView";

/// Denormalized view of a single order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSummary {
    pub order_id: AggregateId,
    pub client_id: ClientId,
    pub status: OrderStatus,
    pub product_items: Vec<PricedProductItem>,
    pub total_price: Money,
    pub payment_id: Option<PaymentId>,
    pub cancellation_reason: Option<CancellationReason>,
    pub initialized_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Stream version of the last event folded into this row.
    pub version: Version,
}

#[derive(Default)]
struct State {
    orders: HashMap<AggregateId, OrderSummary>,
    applied: AppliedVersions,
    position: ProjectionPosition,
}

/// Read model over every order stream.
///
/// Order events are applied at most once per `(stream, version)`; events of
/// other aggregate types are ignored.
#[derive(Clone, Default)]
pub struct OrderSummaryView {
    state: Arc<RwLock<State>>,
}

impl OrderSummaryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_order(&self, order_id: AggregateId) -> Option<OrderSummary> {
        self.state.read().await.orders.get(&order_id).cloned()
    }

    pub async fn get_all_orders(&self) -> Vec<OrderSummary> {
        self.state.read().await.orders.values().cloned().collect()
    }

    pub async fn get_orders_by_status(&self, status: OrderStatus) -> Vec<OrderSummary> {
        self.state
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect()
    }

    pub async fn get_orders_by_client(&self, client_id: ClientId) -> Vec<OrderSummary> {
        self.state
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.client_id == client_id)
            .cloned()
            .collect()
    }

    /// Last version applied for `order_id`, if any.
    pub async fn last_applied_version(&self, order_id: AggregateId) -> Option<Version> {
        self.state.read().await.applied.last(order_id)
    }
}

fn existing<'a>(
    orders: &'a mut HashMap<AggregateId, OrderSummary>,
    envelope: &EventEnvelope,
) -> Result<&'a mut OrderSummary> {
    orders
        .get_mut(&envelope.aggregate_id)
        .ok_or(ProjectionError::MissingEntry {
            view: VIEW_NAME,
            aggregate_id: envelope.aggregate_id,
            version: envelope.version,
        })
}

fn apply(
    orders: &mut HashMap<AggregateId, OrderSummary>,
    envelope: &EventEnvelope,
    event: OrderEvent,
) -> Result<()> {
    let order = match event {
        OrderEvent::OrderInitialized(data) => {
            orders.insert(
                envelope.aggregate_id,
                OrderSummary {
                    order_id: envelope.aggregate_id,
                    client_id: data.client_id,
                    status: OrderStatus::Initialized,
                    product_items: data.product_items,
                    total_price: data.total_price,
                    payment_id: None,
                    cancellation_reason: None,
                    initialized_at: data.initialized_at,
                    updated_at: data.initialized_at,
                    version: envelope.version,
                },
            );
            return Ok(());
        }
        OrderEvent::OrderPaymentRecorded(data) => {
            let order = existing(orders, envelope)?;
            order.status = OrderStatus::Paid;
            order.payment_id = Some(data.payment_id);
            order.product_items = data.product_items;
            order.total_price = data.total_price;
            order.updated_at = data.payment_recorded_at;
            order
        }
        OrderEvent::OrderCompleted(data) => {
            let order = existing(orders, envelope)?;
            order.status = OrderStatus::Completed;
            order.updated_at = data.completed_at;
            order
        }
        OrderEvent::OrderCancelled(data) => {
            let order = existing(orders, envelope)?;
            order.status = OrderStatus::Cancelled;
            order.cancellation_reason = Some(data.reason);
            order.updated_at = data.cancelled_at;
            order
        }
    };
    order.version = envelope.version;

    Ok(())
}

#[async_trait]
impl Projection for OrderSummaryView {
    fn name(&self) -> &'static str {
        VIEW_NAME
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        if event.aggregate_type != "Order" {
            return Ok(());
        }

        let mut state = self.state.write().await;
        match state.applied.admit(event) {
            Admission::Apply => {}
            Admission::Duplicate => {
                tracing::debug!(
                    aggregate_id = %event.aggregate_id,
                    version = %event.version,
                    "skipping already applied order event"
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

        let order_event: OrderEvent = event.decode()?;
        apply(&mut state.orders, event, order_event)?;
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

impl ReadModel for OrderSummaryView {
    fn name(&self) -> &'static str {
        VIEW_NAME
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.orders.len()).unwrap_or(0)
    }
}
