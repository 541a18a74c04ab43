use crate::config::NotificationConfig;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Notification about an assembled event video
#[derive(Debug, Clone, PartialEq)]
pub struct PushNotification {
    pub title: String,
    pub camera_id: i32,
    pub description: String,
}

impl PushNotification {
    pub fn for_video(camera_id: i32, title: &str) -> Self {
        Self {
            title: title.to_string(),
            camera_id,
            description: format!("Camera {} reported a {} event.", camera_id, title),
        }
    }
}

/// Delivers one notification to one device
#[async_trait]
pub trait PushNotifier: Send + Sync {
    async fn send(&self, token: &str, notification: &PushNotification) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct PushMessage<'a> {
    to: &'a str,
    data: PushData<'a>,
}

#[derive(Debug, Serialize)]
struct PushData<'a> {
    title: &'a str,
    body: PushBody<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PushBody<'a> {
    camera_id: i32,
    description: &'a str,
}

/// Legacy FCM send response; only the failure count matters here
#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(default)]
    failure: u32,
    #[serde(default)]
    results: Vec<PushResult>,
}

#[derive(Debug, Deserialize)]
struct PushResult {
    error: Option<String>,
}

fn build_message<'a>(token: &'a str, notification: &'a PushNotification) -> PushMessage<'a> {
    PushMessage {
        to: token,
        data: PushData {
            title: &notification.title,
            body: PushBody {
                camera_id: notification.camera_id,
                description: &notification.description,
            },
        },
    }
}

/// Firebase Cloud Messaging over the legacy HTTP endpoint
pub struct FcmNotifier {
    client: reqwest::Client,
    endpoint: String,
    server_key: String,
}

impl FcmNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Notification(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            server_key: config.server_key.clone(),
        })
    }
}

#[async_trait]
impl PushNotifier for FcmNotifier {
    async fn send(&self, token: &str, notification: &PushNotification) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .header("Accept", "application/json")
            .json(&build_message(token, notification))
            .send()
            .await
            .map_err(|e| Error::Notification(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Notification(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Notification(format!("Push service error ({}): {}", status, body)).into());
        }

        if let Ok(parsed) = serde_json::from_str::<PushResponse>(&body) {
            if parsed.failure > 0 {
                let reason = parsed
                    .results
                    .iter()
                    .find_map(|r| r.error.as_deref())
                    .unwrap_or("unknown");
                return Err(Error::Notification(format!("Push rejected: {}", reason)).into());
            }
        }

        debug!("Push service response: {}", body);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let notification = PushNotification::for_video(3, "fire, smoke");
        let message = serde_json::to_value(build_message("device-token", &notification)).unwrap();
        assert_eq!(
            message,
            serde_json::json!({
                "to": "device-token",
                "data": {
                    "title": "fire, smoke",
                    "body": {
                        "cameraId": 3,
                        "description": "Camera 3 reported a fire, smoke event."
                    }
                }
            })
        );
    }

    #[test]
    fn test_push_response_failure_count() {
        let parsed: PushResponse = serde_json::from_str(
            r#"{"multicast_id":1,"success":0,"failure":1,"results":[{"error":"NotRegistered"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.failure, 1);
        assert_eq!(parsed.results[0].error.as_deref(), Some("NotRegistered"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_notification_error() {
        let notifier = FcmNotifier::new(&NotificationConfig {
            endpoint: "http://127.0.0.1:9/fcm/send".to_string(),
            server_key: "key".to_string(),
            timeout_ms: 2000,
        })
        .unwrap();

        let err = notifier
            .send("token", &PushNotification::for_video(1, "person"))
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Notification(_))));
    }
}
