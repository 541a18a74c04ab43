pub mod annotate;
pub mod config;
pub mod context;
pub mod db;
pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod inference;
pub mod messaging;
pub mod notification;
pub mod pipeline;
pub mod storage;

#[cfg(test)]
mod test_support;

// Re-export main components for easier use
pub use context::ServiceContext;
pub use dispatcher::Dispatcher;
pub use error::Error;
