use crate::db::models::DeviceToken;
use crate::db::repositories::DeviceTokenStore;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

/// Device token (FCM registration) repository
#[derive(Clone)]
pub struct DeviceTokensRepository {
    pool: Arc<PgPool>,
}

impl DeviceTokensRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceTokenStore for DeviceTokensRepository {
    async fn get_all_by_user_id(&self, user_id: &str) -> Result<Vec<DeviceToken>> {
        let result = sqlx::query_as::<_, DeviceToken>(
            r#"
            SELECT id, user_id, token
            FROM fcm_infos
            WHERE user_id = $1
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get device tokens: {}", e)))?;

        Ok(result)
    }
}
