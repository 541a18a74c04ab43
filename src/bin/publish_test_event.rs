//! Publishes a detection request for a local image and waits for the
//! service's `event.create` acknowledgment. With `video` as first argument it
//! publishes a video request for the given event ids instead.
//!
//! publish_test_event <image.jpeg> [model] [camera_id]
//! publish_test_event video <user_id> <camera_id> <event_id>...

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use detection_server::config;
use detection_server::messaging::broker::{create_message_broker, publish_json};
use detection_server::messaging::{
    Channel, CreateVideoRequest, DetectionRequest, EventCreated, MessageSource,
};
use log::{error, info, warn};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::timeout;

const ACK_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = std::env::var("DETECTION_SERVER_CONFIG").ok().map(PathBuf::from);
    let config = config::load_config(config_path.as_deref())?;

    info!("Connecting to RabbitMQ at {}", config.message_broker.uri);
    let broker = match create_message_broker(config.message_broker.clone()).await {
        Ok(broker) => broker,
        Err(e) => {
            error!("Failed to connect to RabbitMQ: {}", e);
            error!("Make sure RabbitMQ is running at {}", config.message_broker.uri);
            return Err(e);
        }
    };

    match args.first().map(String::as_str) {
        Some("video") => {
            if args.len() < 4 {
                bail!("usage: publish_test_event video <user_id> <camera_id> <event_id>...");
            }
            let request = CreateVideoRequest {
                user_id: args[1].clone(),
                camera_id: args[2].parse().context("camera_id must be an integer")?,
                event_ids: args[3..]
                    .iter()
                    .map(|id| id.parse().context("event ids must be integers"))
                    .collect::<Result<_>>()?,
            };
            publish_json(&*broker, Channel::EventVideoCreate, &request).await?;
            info!("Published video request for events {:?}", request.event_ids);
        }
        Some(image_path) => {
            let model = args.get(1).cloned().unwrap_or_else(|| "coco".to_string());
            let camera_id = match args.get(2) {
                Some(id) => id.parse().context("camera_id must be an integer")?,
                None => 1,
            };
            let bytes = std::fs::read(image_path)
                .with_context(|| format!("Failed to read image {}", image_path))?;

            // Subscribe first so the acknowledgment cannot be missed
            let mut acks = broker.subscribe(&[Channel::EventCreate]).await?;

            let request = DetectionRequest {
                image: format!("data:image/jpeg;base64,{}", STANDARD.encode(&bytes)),
                date: chrono::Utc::now(),
                user_id: None,
                camera_id,
                model,
            };
            publish_json(&*broker, Channel::Event, &request).await?;
            info!("Published {} byte image for camera {}", bytes.len(), camera_id);

            match timeout(ACK_TIMEOUT, wait_for_ack(&mut acks, camera_id)).await {
                Ok(Some(ack)) => info!("Event {} recorded for camera {}", ack.id, ack.camera_id),
                Ok(None) => warn!("Acknowledgment stream closed"),
                Err(_) => warn!("No acknowledgment within {:?}", ACK_TIMEOUT),
            }
        }
        None => bail!("usage: publish_test_event <image.jpeg> [model] [camera_id]"),
    }

    Ok(())
}

async fn wait_for_ack(source: &mut impl MessageSource, camera_id: i32) -> Option<EventCreated> {
    while let Some(message) = source.next_message().await {
        match serde_json::from_slice::<EventCreated>(&message.payload) {
            Ok(ack) if ack.camera_id == camera_id => return Some(ack),
            Ok(ack) => info!("Ignoring acknowledgment for camera {}", ack.camera_id),
            Err(e) => warn!("Unreadable acknowledgment: {}", e),
        }
    }
    None
}
