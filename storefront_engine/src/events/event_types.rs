use crate::db_types::{Order, PaymentChannel};

/// A pending order was stored and the customer was prompted to pay.
#[derive(Debug, Clone)]
pub struct OrderCreatedEvent {
    pub order: Order,
}

impl OrderCreatedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// An order moved to `Paid`. Published exactly once per order, by whichever confirmation signal won.
#[derive(Debug, Clone)]
pub struct OrderPaidEvent {
    pub order: Order,
    pub channel: PaymentChannel,
}

impl OrderPaidEvent {
    pub fn new(order: Order, channel: PaymentChannel) -> Self {
        Self { order, channel }
    }
}

/// The gateway reported the payment as failed or cancelled.
#[derive(Debug, Clone)]
pub struct OrderFailedEvent {
    pub order: Order,
    pub channel: PaymentChannel,
}

impl OrderFailedEvent {
    pub fn new(order: Order, channel: PaymentChannel) -> Self {
        Self { order, channel }
    }
}
