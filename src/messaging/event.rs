use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{Display, Formatter};

/// Logical channels carried over the topic exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Camera-originated detection request
    Event,
    /// Request to fold a set of events into a video
    EventVideoCreate,
    /// Acknowledgment that an event was recorded
    EventCreate,
}

impl Channel {
    /// Channels this service consumes
    pub const INBOUND: [Channel; 2] = [Channel::Event, Channel::EventVideoCreate];

    pub fn routing_key(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::EventVideoCreate => "event.video.create",
            Self::EventCreate => "event.create",
        }
    }

    /// Resolve a routing key or MQTT-style topic (`event/video/create`)
    pub fn from_routing_key(key: &str) -> Option<Self> {
        match key.replace('/', ".").as_str() {
            "event" => Some(Self::Event),
            "event.video.create" => Some(Self::EventVideoCreate),
            "event.create" => Some(Self::EventCreate),
            _ => None,
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.routing_key())
    }
}

/// Raw message as received from the broker
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub routing_key: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(routing_key: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            routing_key: routing_key.into(),
            payload: payload.into(),
        }
    }
}

/// Payload of the `event` channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DetectionRequest {
    /// Base64 JPEG, optionally as a `data:` URL
    pub image: String,
    #[serde(deserialize_with = "deserialize_event_date")]
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub camera_id: i32,
    pub model: String,
}

/// Payload of the `event.video.create` channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateVideoRequest {
    pub event_ids: Vec<i32>,
    pub user_id: String,
    pub camera_id: i32,
}

/// Payload published on `event.create`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventCreated {
    pub id: i32,
    pub camera_id: i32,
}

/// Accepts RFC 3339 as well as the zone-less `2023-10-01T12:30:00` form
/// browsers send; zone-less values are taken as UTC.
fn deserialize_event_date<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_event_date(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date: {}", raw)))
}

pub fn parse_event_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
