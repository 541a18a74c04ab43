use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Video assembled from a set of events
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventVideo {
    pub id: i32,
    pub user_id: String,
    pub camera_id: i32,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEventVideo {
    pub user_id: String,
    pub camera_id: i32,
    pub path: String,
}
