//! Domain layer for the order-fulfillment saga engine.
//!
//! This crate provides:
//! - Aggregate and DomainEvent traits for event-sourced workflow state
//! - The pizza order model consumed and produced by the fulfillment workflow
//! - Structural validation of a workflow's input

pub mod aggregate;
pub mod error;
pub mod order;

pub use aggregate::{Aggregate, DomainEvent};
pub use error::OrderError;
pub use order::{
    Address, Bill, ChargeStatus, Customer, CustomerId, Distance, Money, OrderConfirmation, Pizza,
    PizzaOrder,
};
