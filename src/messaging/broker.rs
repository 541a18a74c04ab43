use crate::config::MessageBrokerConfig;
use crate::error::Error;
use crate::messaging::event::{Channel, InboundMessage};
use anyhow::Result;
use async_trait::async_trait;
use deadpool_lapin::{Config, Manager, Pool};
use futures_util::stream::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
        QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel as AmqpChannel, ConnectionProperties, Consumer, ExchangeKind,
};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Outbound side of the transport
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a raw payload on a channel
    async fn publish(&self, channel: Channel, payload: Vec<u8>) -> Result<()>;
}

/// Serialize `payload` as JSON and publish it
pub async fn publish_json<T: Serialize + Sync>(
    publisher: &dyn Publisher,
    channel: Channel,
    payload: &T,
) -> Result<()> {
    let body = serde_json::to_vec(payload)
        .map_err(|e| Error::Serialization(format!("Failed to encode {} payload: {}", channel, e)))?;
    publisher.publish(channel, body).await
}

/// Inbound side of the transport. `None` means the source is exhausted.
#[async_trait]
pub trait MessageSource: Send {
    async fn next_message(&mut self) -> Option<InboundMessage>;
}

#[async_trait]
impl MessageSource for mpsc::Receiver<InboundMessage> {
    async fn next_message(&mut self) -> Option<InboundMessage> {
        self.recv().await
    }
}

/// RabbitMQ message broker implementation
pub struct MessageBroker {
    /// Connection pool
    pool: Pool,
    /// Configuration
    config: MessageBrokerConfig,
    /// Default channel, reused for publishing
    channel: Arc<Mutex<Option<AmqpChannel>>>,
}

impl MessageBroker {
    /// Create a new message broker
    pub async fn new(config: MessageBrokerConfig) -> Result<Self> {
        let pool_config = Config {
            url: Some(config.uri.clone()),
            pool: Some(deadpool_lapin::PoolConfig {
                max_size: config.pool_size as usize,
                queue_mode: deadpool::managed::QueueMode::Fifo,
                timeouts: deadpool::managed::Timeouts {
                    wait: Some(Duration::from_millis(config.timeout_ms)),
                    create: Some(Duration::from_millis(config.timeout_ms)),
                    recycle: Some(Duration::from_millis(config.timeout_ms)),
                },
            }),
            connection_properties: ConnectionProperties::default(),
        };
        let pool = pool_config
            .create_pool(Some(deadpool_lapin::Runtime::Tokio1))
            .map_err(|e| Error::Service(format!("Failed to create RabbitMQ pool: {}", e)))?;

        let broker = Self {
            pool,
            config,
            channel: Arc::new(Mutex::new(None)),
        };

        // Declare the exchange up front so a bad broker fails start-up
        broker.init().await?;

        Ok(broker)
    }

    async fn init(&self) -> Result<()> {
        let channel = self.open_channel().await?;

        channel
            .exchange_declare(
                &self.config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Service(format!("Failed to declare exchange: {}", e)))?;

        *self.channel.lock().await = Some(channel);

        info!("RabbitMQ message broker initialized (exchange: {})", self.config.exchange);

        Ok(())
    }

    /// Get a connection from the pool with retry
    async fn get_connection(&self) -> Result<deadpool::managed::Object<Manager>> {
        let mut attempts = 0;
        let max_attempts = self.config.retry_attempts.max(1);

        loop {
            attempts += 1;
            match self.pool.get().await {
                Ok(conn) => return Ok(conn),
                Err(err) => {
                    if attempts >= max_attempts {
                        return Err(Error::Service(format!(
                            "Failed to get RabbitMQ connection after {} attempts: {}",
                            attempts, err
                        ))
                        .into());
                    }

                    warn!(
                        "Failed to get RabbitMQ connection (attempt {}/{}): {}",
                        attempts, max_attempts, err
                    );

                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
            }
        }
    }

    async fn open_channel(&self) -> Result<AmqpChannel> {
        let conn = self.get_connection().await?;
        let channel = conn
            .create_channel()
            .await
            .map_err(|e| Error::Service(format!("Failed to create RabbitMQ channel: {}", e)))?;
        Ok(channel)
    }

    /// Get the default channel or create a new one
    async fn get_channel(&self) -> Result<AmqpChannel> {
        let mut channel_guard = self.channel.lock().await;

        if let Some(channel) = &*channel_guard {
            if channel.status().connected() {
                return Ok(channel.clone());
            }
        }

        let channel = self.open_channel().await?;
        *channel_guard = Some(channel.clone());

        Ok(channel)
    }

    /// Bind one exclusive queue to every given channel and start consuming
    pub async fn subscribe(&self, channels: &[Channel]) -> Result<Subscription> {
        // Consumers get their own channel so publishing never waits on deliveries
        let channel = self.open_channel().await?;

        let queue_name = format!("{}.{}", self.config.queue_prefix, Uuid::new_v4());

        channel
            .queue_declare(
                &queue_name,
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Service(format!("Failed to declare queue: {}", e)))?;

        for bound in channels {
            channel
                .queue_bind(
                    &queue_name,
                    &self.config.exchange,
                    bound.routing_key(),
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| Error::Service(format!("Failed to bind queue to {}: {}", bound, e)))?;
            debug!("Bound queue {} to {}", queue_name, bound);
        }

        let consumer = channel
            .basic_consume(
                &queue_name,
                &format!("consumer-{}", Uuid::new_v4()),
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Service(format!("Failed to create consumer: {}", e)))?;

        info!("Subscribed queue {} to {:?}", queue_name, channels);

        Ok(Subscription {
            _channel: channel,
            queue_name,
            consumer,
        })
    }
}

#[async_trait]
impl Publisher for MessageBroker {
    async fn publish(&self, channel: Channel, payload: Vec<u8>) -> Result<()> {
        let amqp_channel = self.get_channel().await?;

        amqp_channel
            .basic_publish(
                &self.config.exchange,
                channel.routing_key(),
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| Error::Service(format!("Failed to publish message: {}", e)))?;

        debug!("Published {} bytes on {}", payload.len(), channel);

        Ok(())
    }
}

/// Live consumer on the service queue
pub struct Subscription {
    // Keeps the consumer's channel open for the life of the subscription
    _channel: AmqpChannel,
    queue_name: String,
    consumer: Consumer,
}

impl Subscription {
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

#[async_trait]
impl MessageSource for Subscription {
    async fn next_message(&mut self) -> Option<InboundMessage> {
        while let Some(delivery) = self.consumer.next().await {
            match delivery {
                Ok(delivery) => {
                    // Acked on receipt: handler failures drop the message
                    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                        error!("Failed to acknowledge message: {}", e);
                    }
                    return Some(InboundMessage::new(
                        delivery.routing_key.as_str(),
                        delivery.data,
                    ));
                }
                Err(e) => {
                    error!("Error receiving message: {}", e);
                    // Short delay to avoid tight loop on errors
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }

        info!("Consumer stopped for queue {}", self.queue_name);
        None
    }
}

/// Create a message broker service
pub async fn create_message_broker(config: MessageBrokerConfig) -> Result<Arc<MessageBroker>> {
    let broker = MessageBroker::new(config).await?;

    Ok(Arc::new(broker))
}
