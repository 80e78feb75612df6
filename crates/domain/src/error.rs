//! Domain error types.

use thiserror::Error;

/// Structural problems with a pizza order, detected before a workflow starts.
///
/// These are shape checks only; business rules such as the delivery radius
/// are evaluated by the workflow itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The order number is empty.
    #[error("Order number is required")]
    MissingOrderNumber,

    /// The order contains no pizzas.
    #[error("Order has no items")]
    NoItems,

    /// A pizza has a negative price.
    #[error("Invalid price for item {index}: {price} (must not be negative)")]
    InvalidPrice { index: usize, price: i64 },

    /// A delivery order has no street address.
    #[error("Delivery orders require an address")]
    MissingAddress,

    /// The item prices add up to more than an amount can hold.
    #[error("Order total is too large")]
    TotalOverflow,
}
