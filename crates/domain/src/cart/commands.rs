//! Cart commands.

use common::AggregateId;

use crate::command::{Command, CommandTarget};
use crate::value_objects::{ClientId, PricedProductItem};

use super::{Cart, CartError, CartEvent};

/// Command to open a cart for a client. The handler assigns the cart id.
#[derive(Debug, Clone)]
pub struct InitializeCart {
    pub client_id: ClientId,
}

impl InitializeCart {
    pub fn new(client_id: ClientId) -> Self {
        Self { client_id }
    }
}

impl Command for InitializeCart {
    type Aggregate = Cart;

    fn target(&self) -> CommandTarget {
        CommandTarget::New
    }

    fn decide(&self, id: AggregateId, cart: &Cart) -> Result<Vec<CartEvent>, CartError> {
        cart.initialize(id, self.client_id)
    }
}

#[derive(Debug, Clone)]
pub struct AddProduct {
    pub cart_id: AggregateId,
    pub product_item: PricedProductItem,
}

impl AddProduct {
    pub fn new(cart_id: AggregateId, product_item: PricedProductItem) -> Self {
        Self {
            cart_id,
            product_item,
        }
    }
}

impl Command for AddProduct {
    type Aggregate = Cart;

    fn target(&self) -> CommandTarget {
        CommandTarget::Existing(self.cart_id)
    }

    fn decide(&self, id: AggregateId, cart: &Cart) -> Result<Vec<CartEvent>, CartError> {
        cart.add_product(id, self.product_item)
    }
}

#[derive(Debug, Clone)]
pub struct RemoveProduct {
    pub cart_id: AggregateId,

    /// Product and unit price to remove, with the quantity to take out.
    pub product_item: PricedProductItem,
}

impl RemoveProduct {
    pub fn new(cart_id: AggregateId, product_item: PricedProductItem) -> Self {
        Self {
            cart_id,
            product_item,
        }
    }
}

impl Command for RemoveProduct {
    type Aggregate = Cart;

    fn target(&self) -> CommandTarget {
        CommandTarget::Existing(self.cart_id)
    }

    fn decide(&self, id: AggregateId, cart: &Cart) -> Result<Vec<CartEvent>, CartError> {
        cart.remove_product(id, self.product_item)
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmCart {
    pub cart_id: AggregateId,
}

impl ConfirmCart {
    pub fn new(cart_id: AggregateId) -> Self {
        Self { cart_id }
    }
}

impl Command for ConfirmCart {
    type Aggregate = Cart;

    fn target(&self) -> CommandTarget {
        CommandTarget::Existing(self.cart_id)
    }

    fn decide(&self, id: AggregateId, cart: &Cart) -> Result<Vec<CartEvent>, CartError> {
        cart.confirm(id)
    }
}

#[derive(Debug, Clone)]
pub struct CancelCart {
    pub cart_id: AggregateId,
}

impl CancelCart {
    pub fn new(cart_id: AggregateId) -> Self {
        Self { cart_id }
    }
}

impl Command for CancelCart {
    type Aggregate = Cart;

    fn target(&self) -> CommandTarget {
        CommandTarget::Existing(self.cart_id)
    }

    fn decide(&self, id: AggregateId, cart: &Cart) -> Result<Vec<CartEvent>, CartError> {
        cart.cancel(id)
    }
}
