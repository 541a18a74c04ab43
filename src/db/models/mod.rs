pub mod device_token_models;
pub mod event_models;
pub mod event_video_models;

pub use device_token_models::DeviceToken;
pub use event_models::{BoundingBox, Event, NewBoundingBox, NewEvent};
pub use event_video_models::{EventVideo, NewEventVideo};
