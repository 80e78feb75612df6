//! The workflow input and the records derived from it.

use serde::{Deserialize, Serialize};

use super::value_objects::{Address, Customer, CustomerId, Money, Pizza};
use crate::error::OrderError;

/// A pizza order: the immutable input of one fulfillment workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PizzaOrder {
    pub order_number: String,
    pub customer: Customer,
    pub items: Vec<Pizza>,
    #[serde(default)]
    pub is_delivery: bool,
    pub address: Address,
}

impl PizzaOrder {
    /// Checks that the order is well formed.
    ///
    /// Business rules are not evaluated here.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.order_number.trim().is_empty() {
            return Err(OrderError::MissingOrderNumber);
        }
        if self.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if let Some((index, pizza)) = self
            .items
            .iter()
            .enumerate()
            .find(|(_, p)| p.price.is_negative())
        {
            return Err(OrderError::InvalidPrice {
                index,
                price: pizza.price.cents(),
            });
        }
        if self.is_delivery && self.address.line1.trim().is_empty() {
            return Err(OrderError::MissingAddress);
        }
        self.total_price()?;
        Ok(())
    }

    /// Returns the sum of all item prices, before any discount.
    pub fn total_price(&self) -> Result<Money, OrderError> {
        self.items
            .iter()
            .try_fold(Money::zero(), |acc, p| acc.checked_add(p.price))
            .ok_or(OrderError::TotalOverflow)
    }

    /// Builds the bill sent to the billing service.
    pub fn bill(&self, amount: Money) -> Bill {
        Bill {
            customer_id: self.customer.customer_id,
            order_number: self.order_number.clone(),
            description: "Pizza".to_string(),
            amount,
        }
    }
}

/// A request to bill a customer for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    pub customer_id: CustomerId,
    pub order_number: String,
    pub description: String,
    pub amount: Money,
}

/// Confirmation returned by the billing service, and the terminal result of
/// a successful workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_number: String,
    pub status: String,
    pub confirmation_number: String,
    /// Unix timestamp (seconds) of the billing call.
    pub billing_timestamp: i64,
    /// Amount actually charged, after discounts.
    pub amount: Money,
}
