use crate::db::models::{EventVideo, NewEventVideo};
use crate::db::repositories::EventVideoStore;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

/// Event videos repository
#[derive(Clone)]
pub struct EventVideosRepository {
    pool: Arc<PgPool>,
}

impl EventVideosRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventVideoStore for EventVideosRepository {
    async fn create(&self, video: &NewEventVideo) -> Result<EventVideo> {
        info!("Creating event video for user {}: {}", video.user_id, video.path);

        let result = sqlx::query_as::<_, EventVideo>(
            r#"
            INSERT INTO event_videos (user_id, camera_id, path)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, camera_id, path, created_at
            "#,
        )
        .bind(&video.user_id)
        .bind(video.camera_id)
        .bind(&video.path)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create event video: {}", e)))?;

        Ok(result)
    }
}
