use crate::db::models::{
    DeviceToken, Event, EventVideo, NewBoundingBox, NewEvent, NewEventVideo,
};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

pub mod bounding_boxes;
pub mod device_tokens;
pub mod event_videos;
pub mod events;

pub use bounding_boxes::BoundingBoxesRepository;
pub use device_tokens::DeviceTokensRepository;
pub use event_videos::EventVideosRepository;
pub use events::EventsRepository;

/// Event records
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert an event and return it with its assigned id
    async fn create(&self, event: &NewEvent) -> Result<Event>;
    /// Fetch the events among `ids` that exist, bounding boxes included
    async fn get_all(&self, ids: &[i32]) -> Result<Vec<Event>>;
    /// Persist the scalar columns of an existing event. A video link, once
    /// set, is never replaced; attempting to is an error.
    async fn update(&self, event: &Event) -> Result<()>;
}

/// Bounding box records
#[async_trait]
pub trait BoundingBoxStore: Send + Sync {
    /// Insert all boxes, returning the number of rows written
    async fn create_many(&self, boxes: &[NewBoundingBox]) -> Result<u64>;
}

/// Event video records
#[async_trait]
pub trait EventVideoStore: Send + Sync {
    async fn create(&self, video: &NewEventVideo) -> Result<EventVideo>;
}

/// Push registrations, read-only here
#[async_trait]
pub trait DeviceTokenStore: Send + Sync {
    async fn get_all_by_user_id(&self, user_id: &str) -> Result<Vec<DeviceToken>>;
}

/// Every repository the pipelines write or read
#[derive(Clone)]
pub struct Repositories {
    pub events: Arc<dyn EventStore>,
    pub bounding_boxes: Arc<dyn BoundingBoxStore>,
    pub event_videos: Arc<dyn EventVideoStore>,
    pub device_tokens: Arc<dyn DeviceTokenStore>,
}

impl Repositories {
    /// PostgreSQL-backed repositories sharing one pool
    pub fn postgres(pool: Arc<PgPool>) -> Self {
        Self {
            events: Arc::new(EventsRepository::new(pool.clone())),
            bounding_boxes: Arc::new(BoundingBoxesRepository::new(pool.clone())),
            event_videos: Arc::new(EventVideosRepository::new(pool.clone())),
            device_tokens: Arc::new(DeviceTokensRepository::new(pool)),
        }
    }
}
