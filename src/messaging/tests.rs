use super::broker::{create_message_broker, publish_json, MessageSource, Publisher};
use super::event::{Channel, EventCreated, InboundMessage};
use crate::config::MessageBrokerConfig;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

fn rabbitmq_available() -> bool {
    if std::env::var("TEST_RABBITMQ").is_err() {
        println!("Skipping RabbitMQ test. Set TEST_RABBITMQ=1 to run.");
        return false;
    }
    true
}

#[tokio::test]
async fn test_channel_receiver_is_a_message_source() {
    let (tx, mut rx) = mpsc::channel(4);
    tx.send(InboundMessage::new("event", b"{}".to_vec())).await.unwrap();
    drop(tx);

    let message = rx.next_message().await.expect("one message queued");
    assert_eq!(message.routing_key, "event");
    assert!(rx.next_message().await.is_none());
}

// Test that we can create a message broker
#[tokio::test]
async fn test_create_message_broker() -> Result<()> {
    if !rabbitmq_available() {
        return Ok(());
    }

    let config = MessageBrokerConfig::default();
    let _broker = create_message_broker(config).await?;
    Ok(())
}

// Test that a subscription receives messages published on its channels only
#[tokio::test]
async fn test_publish_subscribe() -> Result<()> {
    if !rabbitmq_available() {
        return Ok(());
    }

    let config = MessageBrokerConfig {
        exchange: format!("test.exchange.{}", uuid::Uuid::new_v4()),
        ..MessageBrokerConfig::default()
    };

    let broker = create_message_broker(config).await?;
    let mut subscription = broker.subscribe(&[Channel::EventCreate]).await?;

    // Wait a moment for subscription to be ready
    sleep(Duration::from_millis(500)).await;

    broker.publish(Channel::Event, b"{}".to_vec()).await?;
    publish_json(&*broker, Channel::EventCreate, &EventCreated { id: 9, camera_id: 2 })
        .await?;

    let message = timeout(Duration::from_secs(5), subscription.next_message())
        .await?
        .expect("subscription still open");
    assert_eq!(message.routing_key, "event.create");
    let ack: EventCreated = serde_json::from_slice(&message.payload)?;
    assert_eq!(ack, EventCreated { id: 9, camera_id: 2 });

    Ok(())
}
