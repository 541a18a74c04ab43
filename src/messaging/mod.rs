pub mod broker;
pub mod event;
#[cfg(test)]
mod tests;

pub use broker::{MessageBroker, MessageSource, Publisher, Subscription};
pub use event::{Channel, CreateVideoRequest, DetectionRequest, EventCreated, InboundMessage};
