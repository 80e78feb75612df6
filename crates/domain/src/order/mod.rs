//! The pizza order model.

mod pizza_order;
mod value_objects;

pub use pizza_order::{Bill, OrderConfirmation, PizzaOrder};
pub use value_objects::{Address, ChargeStatus, Customer, CustomerId, Distance, Money, Pizza};
