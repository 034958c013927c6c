//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;

use crate::aggregate::Aggregate;
use crate::value_objects::{ClientId, Money, PaymentId, PricedProductItem};

use super::{
    CancellationReason, OrderError, OrderEvent, OrderStatus,
    events::{OrderCancelledData, OrderInitializedData, OrderPaymentRecordedData},
};

/// Order aggregate root.
///
/// An order is placed with a fixed list of priced items, then paid and
/// completed, or cancelled before completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order {
    id: Option<AggregateId>,
    version: Version,
    client_id: Option<ClientId>,

    /// None until the order is initialized.
    status: Option<OrderStatus>,

    product_items: Vec<PricedProductItem>,
    total_price: Money,
    payment_id: Option<PaymentId>,
    cancellation_reason: Option<CancellationReason>,
    initialized_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderInitialized(data) => self.apply_initialized(data),
            OrderEvent::OrderPaymentRecorded(data) => self.apply_payment_recorded(data),
            OrderEvent::OrderCompleted(_) => {
                self.status = Some(OrderStatus::Completed);
            }
            OrderEvent::OrderCancelled(data) => self.apply_cancelled(data),
        }
    }
}

// Query methods
impl Order {
    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn status(&self) -> Option<OrderStatus> {
        self.status
    }

    pub fn product_items(&self) -> &[PricedProductItem] {
        &self.product_items
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn payment_id(&self) -> Option<PaymentId> {
        self.payment_id
    }

    pub fn cancellation_reason(&self) -> Option<CancellationReason> {
        self.cancellation_reason
    }

    pub fn initialized_at(&self) -> Option<DateTime<Utc>> {
        self.initialized_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(|status| status.is_terminal())
    }
}

// Command methods (return events)
impl Order {
    /// Places a new order.
    ///
    /// Every item needs a positive quantity and unit price, and
    /// `total_price` must equal the sum of the item totals.
    pub fn initialize(
        &self,
        order_id: AggregateId,
        client_id: ClientId,
        product_items: Vec<PricedProductItem>,
        total_price: Money,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.status.is_some() {
            return Err(OrderError::AlreadyInitialized);
        }

        if product_items.is_empty() {
            return Err(OrderError::EmptyProductItems);
        }

        for item in &product_items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    quantity: item.quantity,
                });
            }
            if !item.unit_price.is_positive() {
                return Err(OrderError::InvalidPrice {
                    price: item.unit_price,
                });
            }
        }

        let computed = product_items
            .iter()
            .map(PricedProductItem::checked_total_price)
            .try_fold(Money::zero(), |total, line| total.checked_add(line?))
            .ok_or(OrderError::TotalPriceOverflow)?;
        if computed != total_price {
            return Err(OrderError::TotalPriceMismatch {
                declared: total_price,
                computed,
            });
        }

        Ok(vec![OrderEvent::order_initialized(
            order_id,
            client_id,
            product_items,
            total_price,
        )])
    }

    pub fn record_payment(
        &self,
        order_id: AggregateId,
        payment_id: PaymentId,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let status = self.current_status()?;
        if !status.can_record_payment() {
            return Err(OrderError::InvalidStateTransition {
                current_status: status,
                action: "record payment",
            });
        }

        Ok(vec![OrderEvent::order_payment_recorded(
            order_id,
            payment_id,
            self.product_items.clone(),
            self.total_price,
        )])
    }

    pub fn complete(&self, order_id: AggregateId) -> Result<Vec<OrderEvent>, OrderError> {
        let status = self.current_status()?;
        if !status.can_complete() {
            return Err(OrderError::InvalidStateTransition {
                current_status: status,
                action: "complete",
            });
        }

        Ok(vec![OrderEvent::order_completed(order_id)])
    }

    pub fn cancel(
        &self,
        order_id: AggregateId,
        reason: CancellationReason,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let status = self.current_status()?;
        if !status.can_cancel() {
            return Err(OrderError::InvalidStateTransition {
                current_status: status,
                action: "cancel",
            });
        }

        Ok(vec![OrderEvent::order_cancelled(
            order_id,
            self.payment_id,
            reason,
        )])
    }

    fn current_status(&self) -> Result<OrderStatus, OrderError> {
        self.status.ok_or(OrderError::NotInitialized)
    }
}

// Event application methods
impl Order {
    fn apply_initialized(&mut self, data: OrderInitializedData) {
        self.id = Some(data.order_id);
        self.client_id = Some(data.client_id);
        self.product_items = data.product_items;
        self.total_price = data.total_price;
        self.initialized_at = Some(data.initialized_at);
        self.status = Some(OrderStatus::Initialized);
    }

    fn apply_payment_recorded(&mut self, data: OrderPaymentRecordedData) {
        self.payment_id = Some(data.payment_id);
        self.status = Some(OrderStatus::Paid);
    }

    fn apply_cancelled(&mut self, data: OrderCancelledData) {
        self.cancellation_reason = Some(data.reason);
        self.status = Some(OrderStatus::Cancelled);
    }
}
