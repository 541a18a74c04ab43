use crate::db::models::{BoundingBox, Event, NewEvent};
use crate::db::repositories::EventStore;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;

/// Events repository for handling event operations
#[derive(Clone)]
pub struct EventsRepository {
    pool: Arc<PgPool>,
}

impl EventsRepository {
    /// Create a new events repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn get_bounding_boxes(&self, event_ids: &[i32]) -> Result<Vec<BoundingBox>> {
        let result = sqlx::query_as::<_, BoundingBox>(
            r#"
            SELECT id, event_id, label, confidence, x, y, width, height
            FROM bounding_boxes
            WHERE event_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(event_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get bounding boxes: {}", e)))?;

        Ok(result)
    }
}

#[async_trait]
impl EventStore for EventsRepository {
    async fn create(&self, event: &NewEvent) -> Result<Event> {
        let result = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (date, camera_id, path, event_video_id)
            VALUES ($1, $2, $3, NULL)
            RETURNING id, date, camera_id, path, event_video_id
            "#,
        )
        .bind(event.date)
        .bind(event.camera_id)
        .bind(&event.path)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create event: {}", e)))?;

        Ok(result)
    }

    async fn get_all(&self, ids: &[i32]) -> Result<Vec<Event>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // Chronological, so assembled videos play in capture order
        let mut events = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, date, camera_id, path, event_video_id
            FROM events
            WHERE id = ANY($1)
            ORDER BY date, id
            "#,
        )
        .bind(ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get events: {}", e)))?;

        let found: Vec<i32> = events.iter().map(|e| e.id).collect();
        let mut boxes_by_event: HashMap<i32, Vec<BoundingBox>> = HashMap::new();
        for bounding_box in self.get_bounding_boxes(&found).await? {
            boxes_by_event
                .entry(bounding_box.event_id)
                .or_default()
                .push(bounding_box);
        }

        for event in &mut events {
            event.bounding_boxes = boxes_by_event.remove(&event.id).unwrap_or_default();
        }

        Ok(events)
    }

    async fn update(&self, event: &Event) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET date = $2, camera_id = $3, path = $4, event_video_id = $5
            WHERE id = $1
              AND (event_video_id IS NULL OR event_video_id = $5)
            "#,
        )
        .bind(event.id)
        .bind(event.date)
        .bind(event.camera_id)
        .bind(&event.path)
        .bind(event.event_video_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to update event: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(format!(
                "Event {} not found or already linked to another video",
                event.id
            ))
            .into());
        }

        Ok(())
    }
}
