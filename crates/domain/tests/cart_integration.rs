//! Integration tests for the Cart aggregate.

use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use domain::{
    AddProduct, CancelCart, CartError, CartService, CartStatus, ClientId, ConfirmCart,
    DomainError, HandlerConfig, InitializeCart, Money, PricedProductItem, ProductId,
    RemoveProduct, ValidationError,
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

#[derive(Default)]
struct EventTypes {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl EventSubscriber for EventTypes {
    async fn handle(&self, event: &EventEnvelope) -> Result<(), SubscriberError> {
        self.seen.lock().await.push(event.event_type.clone());
        Ok(())
    }
}

async fn open_cart<S: EventStore>(service: &CartService<S>) -> AggregateId {
    service
        .initialize_cart(InitializeCart::new(ClientId::new()))
        .await
        .unwrap()
        .aggregate_id
}

fn item(quantity: u32, dollars: i64) -> PricedProductItem {
    PricedProductItem::new(ProductId::new(), quantity, Money::from_dollars(dollars))
}

#[tokio::test]
async fn adding_to_cancelled_cart_is_rejected_and_version_unchanged() {
    let store = InMemoryEventStore::new();
    let service = CartService::new(store.clone());
    let cart_id = open_cart(&service).await;
    service.cancel_cart(CancelCart::new(cart_id)).await.unwrap();

    let result = service.add_product(AddProduct::new(cart_id, item(1, 5))).await;

    assert!(matches!(
        result,
        Err(DomainError::Validation(ValidationError::Cart(
            CartError::NotPending {
                status: CartStatus::Cancelled,
                ..
            }
        )))
    ));
    assert_eq!(
        store.stream_version(cart_id).await.unwrap(),
        Some(Version::new(2))
    );
    assert_eq!(store.read_stream(cart_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn every_committed_event_is_dispatched_in_order() {
    let dispatcher = EventDispatcher::new(DispatcherConfig::default());
    let recorder = Arc::new(EventTypes::default());
    dispatcher
        .subscribe("carts", EventFilter::aggregate_type("Cart"), recorder.clone())
        .await;
    let service = CartService::new(DispatchingEventStore::new(
        InMemoryEventStore::new(),
        dispatcher,
    ));

    let cart_id = open_cart(&service).await;
    let shoes = item(2, 40);
    service
        .add_product(AddProduct::new(cart_id, shoes))
        .await
        .unwrap();
    service
        .remove_product(RemoveProduct::new(cart_id, shoes))
        .await
        .unwrap();
    service
        .add_product(AddProduct::new(cart_id, item(1, 15)))
        .await
        .unwrap();
    service.confirm_cart(ConfirmCart::new(cart_id)).await.unwrap();

    // Rejected commands publish nothing.
    let _ = service.cancel_cart(CancelCart::new(cart_id)).await;

    let seen = recorder.seen.lock().await;
    assert_eq!(
        *seen,
        vec![
            "CartInitialized",
            "ProductAdded",
            "ProductRemoved",
            "ProductAdded",
            "CartConfirmed"
        ]
    );
}

#[tokio::test]
async fn concurrent_adds_are_all_applied_after_retries() {
    let store = InMemoryEventStore::new();
    let service = Arc::new(CartService::with_config(
        store.clone(),
        HandlerConfig::default().with_max_attempts(20),
    ));
    let cart_id = open_cart(service.as_ref()).await;
    let product = item(1, 3);

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .add_product(AddProduct::new(cart_id, product))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let cart = service.get_cart(cart_id).await.unwrap().unwrap();
    assert_eq!(cart.quantity_of(&product), 5);
    assert_eq!(cart.total_price(), Money::from_dollars(15));

    let versions: Vec<i64> = store
        .read_stream(cart_id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.version.as_i64())
        .collect();
    assert_eq!(versions, (1..=6).collect::<Vec<_>>());
}

#[tokio::test]
async fn overflowing_line_quantity_is_rejected_and_cart_still_loads() {
    let store = InMemoryEventStore::new();
    let service = CartService::new(store.clone());
    let cart_id = open_cart(&service).await;
    let bulk = PricedProductItem::new(ProductId::new(), u32::MAX, Money::from_cents(1));

    service
        .add_product(AddProduct::new(cart_id, bulk))
        .await
        .unwrap();
    let result = service.add_product(AddProduct::new(cart_id, bulk)).await;

    assert!(matches!(
        result,
        Err(DomainError::Validation(ValidationError::Cart(
            CartError::QuantityOverflow { current: u32::MAX, added: u32::MAX, .. }
        )))
    ));
    assert_eq!(
        store.stream_version(cart_id).await.unwrap(),
        Some(Version::new(2))
    );
    let cart = service.get_cart(cart_id).await.unwrap().unwrap();
    assert_eq!(cart.quantity_of(&bulk), u32::MAX);
    assert_eq!(cart.total_price(), Money::from_cents(i64::from(u32::MAX)));
}

#[tokio::test]
async fn unknown_cart_is_not_found() {
    let service = CartService::new(InMemoryEventStore::new());
    let result = service
        .confirm_cart(ConfirmCart::new(AggregateId::new()))
        .await;
    assert!(matches!(result, Err(DomainError::NotFound { aggregate_type: "Cart", .. })));
}
