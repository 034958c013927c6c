//! Order domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::value_objects::{ClientId, Money, PaymentId, PricedProductItem};

use super::CancellationReason;

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    OrderInitialized(OrderInitializedData),

    OrderPaymentRecorded(OrderPaymentRecordedData),

    OrderCompleted(OrderCompletedData),

    OrderCancelled(OrderCancelledData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderInitialized(_) => "OrderInitialized",
            OrderEvent::OrderPaymentRecorded(_) => "OrderPaymentRecorded",
            OrderEvent::OrderCompleted(_) => "OrderCompleted",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
        }
    }
}

/// Data for OrderInitialized event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInitializedData {
    pub order_id: AggregateId,
    pub client_id: ClientId,
    pub product_items: Vec<PricedProductItem>,
    pub total_price: Money,
    pub initialized_at: DateTime<Utc>,
}

/// Data for OrderPaymentRecorded event.
///
/// Repeats the items and total so consumers need not replay the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPaymentRecordedData {
    pub order_id: AggregateId,
    pub payment_id: PaymentId,
    pub product_items: Vec<PricedProductItem>,
    pub total_price: Money,
    pub payment_recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCompletedData {
    pub order_id: AggregateId,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub order_id: AggregateId,

    /// Set when the order was cancelled after payment.
    pub payment_id: Option<PaymentId>,

    pub reason: CancellationReason,
    pub cancelled_at: DateTime<Utc>,
}

// Convenience constructors for events
impl OrderEvent {
    pub fn order_initialized(
        order_id: AggregateId,
        client_id: ClientId,
        product_items: Vec<PricedProductItem>,
        total_price: Money,
    ) -> Self {
        OrderEvent::OrderInitialized(OrderInitializedData {
            order_id,
            client_id,
            product_items,
            total_price,
            initialized_at: Utc::now(),
        })
    }

    pub fn order_payment_recorded(
        order_id: AggregateId,
        payment_id: PaymentId,
        product_items: Vec<PricedProductItem>,
        total_price: Money,
    ) -> Self {
        OrderEvent::OrderPaymentRecorded(OrderPaymentRecordedData {
            order_id,
            payment_id,
            product_items,
            total_price,
            payment_recorded_at: Utc::now(),
        })
    }

    pub fn order_completed(order_id: AggregateId) -> Self {
        OrderEvent::OrderCompleted(OrderCompletedData {
            order_id,
            completed_at: Utc::now(),
        })
    }

    pub fn order_cancelled(
        order_id: AggregateId,
        payment_id: Option<PaymentId>,
        reason: CancellationReason,
    ) -> Self {
        OrderEvent::OrderCancelled(OrderCancelledData {
            order_id,
            payment_id,
            reason,
            cancelled_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::ProductId;

    #[test]
    fn test_event_type() {
        let order_id = AggregateId::new();

        let event = OrderEvent::order_initialized(order_id, ClientId::new(), vec![], Money::zero());
        assert_eq!(event.event_type(), "OrderInitialized");

        let event = OrderEvent::order_payment_recorded(order_id, PaymentId::new(), vec![], Money::zero());
        assert_eq!(event.event_type(), "OrderPaymentRecorded");

        assert_eq!(OrderEvent::order_completed(order_id).event_type(), "OrderCompleted");

        let event = OrderEvent::order_cancelled(order_id, None, CancellationReason::Timeout);
        assert_eq!(event.event_type(), "OrderCancelled");
    }

    #[test]
    fn test_payload_is_tagged_with_event_type() {
        let order_id = AggregateId::new();
        let client_id = ClientId::new();
        let item = PricedProductItem::new(ProductId::new(), 10, Money::from_dollars(3));
        let event = OrderEvent::order_initialized(order_id, client_id, vec![item], Money::from_dollars(30));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "OrderInitialized");
        assert_eq!(json["data"]["total_price"], 3000);

        let decoded: OrderEvent = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_cancellation_reason_serialization() {
        let event = OrderEvent::order_cancelled(
            AggregateId::new(),
            Some(PaymentId::new()),
            CancellationReason::PaymentFailed,
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["data"]["reason"], "PaymentFailed");
    }
}
