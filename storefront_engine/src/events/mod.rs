//! Order lifecycle events.
//!
//! The engine publishes an event whenever an order is created or reaches a payment outcome. Interested parties
//! register a hook in [`EventHooks`]; each hook runs on its own task and never blocks the flow that published the
//! event.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
