//! Integration tests for the Order aggregate.
//!
//! These tests verify the full order lifecycle including event persistence,
//! post-commit dispatch, aggregate reconstruction, and concurrency handling.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::AggregateId;
use domain::{
    Aggregate, CancelOrder, CancellationReason, ClientId, CompleteOrder, DomainError,
    InitializeOrder, Money, Order, OrderError, OrderEvent, OrderService, OrderStatus,
    PaymentId, PricedProductItem, ProductId, RecordOrderPayment, Repository, ValidationError,
};
use event_store::{
    DispatcherConfig, DispatchingEventStore, EventDispatcher, EventEnvelope, EventFilter,
    EventStore, EventSubscriber, InMemoryEventStore, SubscriberError, Version,
};
use tokio::sync::Mutex;

#[ctor::ctor]
unsafe fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Collects every envelope it is handed.
#[derive(Default)]
struct Published {
    events: Mutex<Vec<EventEnvelope>>,
}

#[async_trait]
impl EventSubscriber for Published {
    async fn handle(&self, event: &EventEnvelope) -> Result<(), SubscriberError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

fn create_service() -> OrderService<InMemoryEventStore> {
    OrderService::new(InMemoryEventStore::new())
}

fn product_items() -> Vec<PricedProductItem> {
    vec![
        PricedProductItem::new(ProductId::new(), 10, Money::from_dollars(3)),
        PricedProductItem::new(ProductId::new(), 3, Money::from_dollars(7)),
    ]
}

fn initialize_cmd(client_id: ClientId, items: Vec<PricedProductItem>) -> InitializeOrder {
    let total = items.iter().map(PricedProductItem::total_price).sum();
    InitializeOrder::new(client_id, items, total)
}

mod order_lifecycle {
    use super::*;

    #[tokio::test]
    async fn initialize_order_publishes_one_order_initialized() {
        let dispatcher = EventDispatcher::new(DispatcherConfig::default());
        let published = Arc::new(Published::default());
        dispatcher
            .subscribe(
                "published",
                EventFilter::event_types(["OrderInitialized"]),
                published.clone(),
            )
            .await;
        let service = OrderService::new(DispatchingEventStore::new(
            InMemoryEventStore::new(),
            dispatcher,
        ));

        let client_id = ClientId::new();
        let items = product_items();
        let before = Utc::now();

        let result = service
            .initialize_order(initialize_cmd(client_id, items.clone()))
            .await
            .unwrap();

        assert!(!result.aggregate_id.is_nil());
        assert_eq!(result.aggregate.total_price(), Money::from_dollars(51));

        let published = published.events.lock().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].aggregate_id, result.aggregate_id);

        let OrderEvent::OrderInitialized(data) = published[0].decode::<OrderEvent>().unwrap()
        else {
            panic!("Expected OrderInitialized event");
        };
        assert_eq!(data.order_id, result.aggregate_id);
        assert_eq!(data.client_id, client_id);
        assert!(data.initialized_at >= before);
        assert_eq!(data.product_items.len(), items.len());
        assert!(data.product_items.iter().all(|item| items
            .iter()
            .any(|expected| expected.product_id == item.product_id
                && expected.quantity == item.quantity)));
    }

    #[tokio::test]
    async fn complete_order_lifecycle() {
        let service = create_service();
        let order_id = service
            .initialize_order(initialize_cmd(ClientId::new(), product_items()))
            .await
            .unwrap()
            .aggregate_id;

        let payment_id = PaymentId::new();
        let result = service
            .record_payment(RecordOrderPayment::new(order_id, payment_id))
            .await
            .unwrap();
        assert_eq!(result.aggregate.status(), Some(OrderStatus::Paid));
        assert_eq!(result.aggregate.payment_id(), Some(payment_id));

        let result = service
            .complete_order(CompleteOrder::new(order_id))
            .await
            .unwrap();
        assert_eq!(result.aggregate.status(), Some(OrderStatus::Completed));
        assert_eq!(result.new_version, Version::new(3));
    }

    #[tokio::test]
    async fn cancel_order_at_various_stages() {
        let service = create_service();

        let unpaid = service
            .initialize_order(initialize_cmd(ClientId::new(), product_items()))
            .await
            .unwrap()
            .aggregate_id;
        let result = service
            .cancel_order(CancelOrder::new(unpaid, CancellationReason::Timeout))
            .await
            .unwrap();
        assert_eq!(result.aggregate.status(), Some(OrderStatus::Cancelled));
        assert_eq!(result.aggregate.payment_id(), None);

        let paid = service
            .initialize_order(initialize_cmd(ClientId::new(), product_items()))
            .await
            .unwrap()
            .aggregate_id;
        service
            .record_payment(RecordOrderPayment::new(paid, PaymentId::new()))
            .await
            .unwrap();
        let result = service
            .cancel_order(CancelOrder::new(paid, CancellationReason::NotAvailableProduct))
            .await
            .unwrap();
        assert_eq!(
            result.aggregate.cancellation_reason(),
            Some(CancellationReason::NotAvailableProduct)
        );
        assert!(result.aggregate.payment_id().is_some());
    }
}

mod reconstruction {
    use super::*;

    #[tokio::test]
    async fn reload_reproduces_items_and_total() {
        let store = InMemoryEventStore::new();
        let service = OrderService::new(store.clone());
        let items = product_items();

        let order_id = service
            .initialize_order(initialize_cmd(ClientId::new(), items.clone()))
            .await
            .unwrap()
            .aggregate_id;

        assert_eq!(store.read_stream(order_id).await.unwrap().len(), 1);

        let order = service.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.product_items(), items.as_slice());
        assert_eq!(order.total_price(), Money::from_dollars(51));
        assert_eq!(order.version(), Version::first());
    }

    #[tokio::test]
    async fn replay_from_store_is_deterministic() {
        let store = InMemoryEventStore::new();
        let service = OrderService::new(store.clone());
        let order_id = service
            .initialize_order(initialize_cmd(ClientId::new(), product_items()))
            .await
            .unwrap()
            .aggregate_id;
        service
            .record_payment(RecordOrderPayment::new(order_id, PaymentId::new()))
            .await
            .unwrap();

        let first = service.get_order(order_id).await.unwrap().unwrap();
        let second = service.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(first, second);

        let events: Vec<OrderEvent> = store
            .read_stream(order_id)
            .await
            .unwrap()
            .iter()
            .map(|envelope| envelope.decode().unwrap())
            .collect();
        assert_eq!(Order::replay(events), first);
    }

    #[tokio::test]
    async fn stored_envelopes_are_contiguous() {
        let store = InMemoryEventStore::new();
        let service = OrderService::new(store.clone());
        let order_id = service
            .initialize_order(initialize_cmd(ClientId::new(), product_items()))
            .await
            .unwrap()
            .aggregate_id;
        service
            .record_payment(RecordOrderPayment::new(order_id, PaymentId::new()))
            .await
            .unwrap();
        service
            .complete_order(CompleteOrder::new(order_id))
            .await
            .unwrap();

        let stored = store.read_stream(order_id).await.unwrap();
        let versions: Vec<i64> = stored.iter().map(|e| e.version.as_i64()).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        let types: Vec<&str> = stored.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            types,
            vec!["OrderInitialized", "OrderPaymentRecorded", "OrderCompleted"]
        );
    }
}

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn concurrent_saves_with_same_expected_version() {
        let store = InMemoryEventStore::new();
        let service = OrderService::new(store.clone());
        let order_id = service
            .initialize_order(initialize_cmd(ClientId::new(), product_items()))
            .await
            .unwrap()
            .aggregate_id;

        let repository: Arc<Repository<_, Order>> = Arc::new(Repository::new(store.clone()));
        let loaded = repository.load(order_id).await.unwrap();
        let expected = loaded.version;
        let first_events = loaded
            .aggregate
            .record_payment(order_id, PaymentId::new())
            .unwrap();
        let second_events = loaded
            .aggregate
            .cancel(order_id, CancellationReason::CancelledByClient)
            .unwrap();

        let first = {
            let repository = repository.clone();
            tokio::spawn(async move {
                repository
                    .save(order_id, expected, &first_events)
                    .await
            })
        };
        let second = {
            let repository = repository.clone();
            tokio::spawn(async move {
                repository
                    .save(order_id, expected, &second_events)
                    .await
            })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(DomainError::ConcurrencyConflict { .. })))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);
        assert_eq!(store.read_stream(order_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_payments_record_exactly_one() {
        let store = InMemoryEventStore::new();
        let service = Arc::new(OrderService::new(store.clone()));
        let order_id = service
            .initialize_order(initialize_cmd(ClientId::new(), product_items()))
            .await
            .unwrap()
            .aggregate_id;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .record_payment(RecordOrderPayment::new(order_id, PaymentId::new()))
                        .await
                })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(DomainError::Validation(ValidationError::Order(
                    OrderError::InvalidStateTransition { .. },
                )))
                | Err(DomainError::ConcurrencyConflict { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(store.read_stream(order_id).await.unwrap().len(), 2);
    }
}

mod validation {
    use super::*;

    #[tokio::test]
    async fn mismatched_total_is_rejected_and_nothing_stored() {
        let store = InMemoryEventStore::new();
        let service = OrderService::new(store.clone());

        let result = service
            .initialize_order(InitializeOrder::new(
                ClientId::new(),
                product_items(),
                Money::from_dollars(50),
            ))
            .await;

        assert!(matches!(
            result,
            Err(DomainError::Validation(ValidationError::Order(
                OrderError::TotalPriceMismatch { .. }
            )))
        ));
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn cannot_complete_unpaid_order() {
        let service = create_service();
        let order_id = service
            .initialize_order(initialize_cmd(ClientId::new(), product_items()))
            .await
            .unwrap()
            .aggregate_id;

        let result = service.complete_order(CompleteOrder::new(order_id)).await;
        assert!(matches!(result, Err(DomainError::Validation(_))));

        let order = service.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status(), Some(OrderStatus::Initialized));
        assert_eq!(order.version(), Version::first());
    }

    #[tokio::test]
    async fn commands_on_unknown_order_are_not_found() {
        let service = create_service();
        let result = service
            .cancel_order(CancelOrder::new(
                AggregateId::new(),
                CancellationReason::CancelledByClient,
            ))
            .await;

        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }
}
