//! Cart aggregate implementation.

use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::value_objects::{ClientId, Money, PricedProductItem};

use super::{CartError, CartEvent, events::CartInitializedData};

/// The status of a cart.
///
/// ```text
/// Pending ──┬──► Confirmed
///           └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CartStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Pending => "Pending",
            CartStatus::Confirmed => "Confirmed",
            CartStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for CartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shopping cart aggregate root.
///
/// Items with the same product and unit price are kept as one line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cart {
    id: Option<AggregateId>,
    version: Version,
    client_id: Option<ClientId>,
    status: Option<CartStatus>,
    product_items: Vec<PricedProductItem>,
}

impl Aggregate for Cart {
    type Event = CartEvent;
    type Error = CartError;

    fn aggregate_type() -> &'static str {
        "Cart"
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
            CartEvent::CartInitialized(data) => self.apply_initialized(data),
            CartEvent::ProductAdded(data) => self.apply_product_added(data.product_item),
            CartEvent::ProductRemoved(data) => self.apply_product_removed(data.product_item),
            CartEvent::CartConfirmed(_) => {
                self.status = Some(CartStatus::Confirmed);
            }
            CartEvent::CartCancelled(_) => {
                self.status = Some(CartStatus::Cancelled);
            }
        }
    }
}

// Query methods
impl Cart {
    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn status(&self) -> Option<CartStatus> {
        self.status
    }

    pub fn product_items(&self) -> &[PricedProductItem] {
        &self.product_items
    }

    pub fn total_price(&self) -> Money {
        self.product_items
            .iter()
            .map(PricedProductItem::total_price)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.product_items.is_empty()
    }

    /// Quantity held of `item`'s product at `item`'s unit price.
    pub fn quantity_of(&self, item: &PricedProductItem) -> u32 {
        self.product_items
            .iter()
            .find(|existing| existing.matches(item))
            .map_or(0, |existing| existing.quantity)
    }
}

// Command methods (return events)
impl Cart {
    pub fn initialize(
        &self,
        cart_id: AggregateId,
        client_id: ClientId,
    ) -> Result<Vec<CartEvent>, CartError> {
        if self.status.is_some() {
            return Err(CartError::AlreadyInitialized);
        }

        Ok(vec![CartEvent::cart_initialized(cart_id, client_id)])
    }

    pub fn add_product(
        &self,
        cart_id: AggregateId,
        product_item: PricedProductItem,
    ) -> Result<Vec<CartEvent>, CartError> {
        self.ensure_pending("add product to")?;
        Self::validate_item(&product_item)?;

        let current = self.quantity_of(&product_item);
        if current.checked_add(product_item.quantity).is_none() {
            return Err(CartError::QuantityOverflow {
                product_id: product_item.product_id,
                current,
                added: product_item.quantity,
            });
        }
        let new_total = self
            .product_items
            .iter()
            .chain(std::iter::once(&product_item))
            .map(PricedProductItem::checked_total_price)
            .try_fold(Money::zero(), |total, line| total.checked_add(line?));
        if new_total.is_none() {
            return Err(CartError::TotalPriceOverflow);
        }

        Ok(vec![CartEvent::product_added(cart_id, product_item)])
    }

    pub fn remove_product(
        &self,
        cart_id: AggregateId,
        product_item: PricedProductItem,
    ) -> Result<Vec<CartEvent>, CartError> {
        self.ensure_pending("remove product from")?;
        Self::validate_item(&product_item)?;

        let available = self.quantity_of(&product_item);
        if available < product_item.quantity {
            return Err(CartError::NotEnoughProduct {
                product_id: product_item.product_id,
                requested: product_item.quantity,
                available,
            });
        }

        Ok(vec![CartEvent::product_removed(cart_id, product_item)])
    }

    pub fn confirm(&self, cart_id: AggregateId) -> Result<Vec<CartEvent>, CartError> {
        self.ensure_pending("confirm")?;
        if self.is_empty() {
            return Err(CartError::Empty);
        }

        Ok(vec![CartEvent::cart_confirmed(cart_id)])
    }

    pub fn cancel(&self, cart_id: AggregateId) -> Result<Vec<CartEvent>, CartError> {
        self.ensure_pending("cancel")?;

        Ok(vec![CartEvent::cart_cancelled(cart_id)])
    }

    fn ensure_pending(&self, action: &'static str) -> Result<(), CartError> {
        match self.status {
            None => Err(CartError::NotInitialized),
            Some(CartStatus::Pending) => Ok(()),
            Some(status) => Err(CartError::NotPending { status, action }),
        }
    }

    fn validate_item(item: &PricedProductItem) -> Result<(), CartError> {
        if item.quantity == 0 {
            return Err(CartError::InvalidQuantity {
                quantity: item.quantity,
            });
        }
        if !item.unit_price.is_positive() {
            return Err(CartError::InvalidPrice {
                price: item.unit_price,
            });
        }
        Ok(())
    }
}

// Event application methods
impl Cart {
    fn apply_initialized(&mut self, data: CartInitializedData) {
        self.id = Some(data.cart_id);
        self.client_id = Some(data.client_id);
        self.status = Some(CartStatus::Pending);
    }

    fn apply_product_added(&mut self, item: PricedProductItem) {
        let position = self
            .product_items
            .iter()
            .position(|existing| existing.matches(&item));
        match position {
            Some(index) => {
                let line = &mut self.product_items[index];
                line.quantity = line.quantity.saturating_add(item.quantity);
            }
            None => self.product_items.push(item),
        }
    }

    fn apply_product_removed(&mut self, item: PricedProductItem) {
        let Some(index) = self
            .product_items
            .iter()
            .position(|existing| existing.matches(&item))
        else {
            return;
        };

        let existing = &mut self.product_items[index];
        existing.quantity = existing.quantity.saturating_sub(item.quantity);
        if existing.quantity == 0 {
            self.product_items.remove(index);
        }
    }
}
