//! Names used by the pizza order fulfillment workflow.

/// Workflow type recorded with every history record.
pub const WORKFLOW_TYPE: &str = "PizzaOrderFulfillment";

/// Step: estimate the delivery distance.
pub const STEP_GET_DISTANCE: &str = "get_distance";

/// Step: reject delivery orders outside the service area. Evaluated locally.
pub const STEP_CHECK_SERVICE_AREA: &str = "check_service_area";

/// Step: reserve the ordered pizzas.
pub const STEP_UPDATE_INVENTORY: &str = "update_inventory";

/// Step: durable timer between reservation and billing.
pub const STEP_SETTLE: &str = "settle";

/// Step: bill the customer.
pub const STEP_SEND_BILL: &str = "send_bill";

/// Step: charge the payment card.
pub const STEP_PROCESS_CREDIT_CARD: &str = "process_credit_card";

/// Compensation for `update_inventory`.
pub const ACTIVITY_REVERT_INVENTORY: &str = "revert_inventory";

/// Compensation for `send_bill`.
pub const ACTIVITY_REFUND_CUSTOMER: &str = "refund_customer";

/// Asks a driver to pick up an order; heartbeats while waiting.
pub const ACTIVITY_NOTIFY_DELIVERY_DRIVER: &str = "notify_delivery_driver";

/// Forward steps in execution order.
pub const STEPS: [&str; 6] = [
    STEP_GET_DISTANCE,
    STEP_CHECK_SERVICE_AREA,
    STEP_UPDATE_INVENTORY,
    STEP_SETTLE,
    STEP_SEND_BILL,
    STEP_PROCESS_CREDIT_CARD,
];
