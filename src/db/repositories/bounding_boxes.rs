use crate::db::models::NewBoundingBox;
use crate::db::repositories::BoundingBoxStore;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use tracing::debug;

/// Bounding boxes repository
#[derive(Clone)]
pub struct BoundingBoxesRepository {
    pool: Arc<PgPool>,
}

impl BoundingBoxesRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BoundingBoxStore for BoundingBoxesRepository {
    async fn create_many(&self, boxes: &[NewBoundingBox]) -> Result<u64> {
        if boxes.is_empty() {
            return Ok(0);
        }

        // One multi-row insert, so the batch lands all or nothing
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO bounding_boxes (event_id, label, confidence, x, y, width, height) ",
        );
        builder.push_values(boxes, |mut row, bounding_box| {
            row.push_bind(bounding_box.event_id)
                .push_bind(&bounding_box.label)
                .push_bind(bounding_box.confidence)
                .push_bind(bounding_box.x)
                .push_bind(bounding_box.y)
                .push_bind(bounding_box.width)
                .push_bind(bounding_box.height);
        });

        let result = builder
            .build()
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to create bounding boxes: {}", e)))?;

        debug!("Inserted {} bounding boxes", result.rows_affected());

        Ok(result.rows_affected())
    }
}
