//! Order commands.

use common::AggregateId;

use crate::command::{Command, CommandTarget};
use crate::value_objects::{ClientId, Money, PaymentId, PricedProductItem};

use super::{CancellationReason, Order, OrderError, OrderEvent};

/// Command to place a new order. The handler assigns the order id.
#[derive(Debug, Clone)]
pub struct InitializeOrder {
    pub client_id: ClientId,
    pub product_items: Vec<PricedProductItem>,

    /// Declared total; must equal the sum of the item totals.
    pub total_price: Money,
}

impl InitializeOrder {
    pub fn new(client_id: ClientId, product_items: Vec<PricedProductItem>, total_price: Money) -> Self {
        Self {
            client_id,
            product_items,
            total_price,
        }
    }
}

impl Command for InitializeOrder {
    type Aggregate = Order;

    fn target(&self) -> CommandTarget {
        CommandTarget::New
    }

    fn decide(&self, id: AggregateId, order: &Order) -> Result<Vec<OrderEvent>, OrderError> {
        order.initialize(
            id,
            self.client_id,
            self.product_items.clone(),
            self.total_price,
        )
    }
}

/// Command to record the payment of an order.
#[derive(Debug, Clone)]
pub struct RecordOrderPayment {
    pub order_id: AggregateId,
    pub payment_id: PaymentId,
}

impl RecordOrderPayment {
    pub fn new(order_id: AggregateId, payment_id: PaymentId) -> Self {
        Self {
            order_id,
            payment_id,
        }
    }
}

impl Command for RecordOrderPayment {
    type Aggregate = Order;

    fn target(&self) -> CommandTarget {
        CommandTarget::Existing(self.order_id)
    }

    fn decide(&self, id: AggregateId, order: &Order) -> Result<Vec<OrderEvent>, OrderError> {
        order.record_payment(id, self.payment_id)
    }
}

/// Command to complete a paid order.
#[derive(Debug, Clone)]
pub struct CompleteOrder {
    pub order_id: AggregateId,
}

impl CompleteOrder {
    pub fn new(order_id: AggregateId) -> Self {
        Self { order_id }
    }
}

impl Command for CompleteOrder {
    type Aggregate = Order;

    fn target(&self) -> CommandTarget {
        CommandTarget::Existing(self.order_id)
    }

    fn decide(&self, id: AggregateId, order: &Order) -> Result<Vec<OrderEvent>, OrderError> {
        order.complete(id)
    }
}

/// Command to cancel an order that is not yet completed.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub order_id: AggregateId,
    pub reason: CancellationReason,
}

impl CancelOrder {
    pub fn new(order_id: AggregateId, reason: CancellationReason) -> Self {
        Self { order_id, reason }
    }
}

impl Command for CancelOrder {
    type Aggregate = Order;

    fn target(&self) -> CommandTarget {
        CommandTarget::Existing(self.order_id)
    }

    fn decide(&self, id: AggregateId, order: &Order) -> Result<Vec<OrderEvent>, OrderError> {
        order.cancel(id, self.reason)
    }
}
