use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event model: one detection run over one image
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: i32,
    pub date: DateTime<Utc>,
    pub camera_id: i32,
    /// Annotated event image
    pub path: Option<String>,
    /// Set once, when the event is folded into a video
    pub event_video_id: Option<i32>,
    #[sqlx(skip)]
    #[serde(default)]
    pub bounding_boxes: Vec<BoundingBox>,
}

impl Event {
    /// Non-empty labels of this event's boxes, in box order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.bounding_boxes
            .iter()
            .map(|b| b.label.as_str())
            .filter(|label| !label.is_empty())
    }
}

/// Event to be inserted; the database assigns the id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub date: DateTime<Utc>,
    pub camera_id: i32,
    pub path: Option<String>,
}

/// Persisted projection of a detection
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BoundingBox {
    pub id: i32,
    pub event_id: i32,
    pub label: String,
    pub confidence: f32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBoundingBox {
    pub event_id: i32,
    pub label: String,
    pub confidence: f32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}
