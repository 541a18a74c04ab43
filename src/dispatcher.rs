use crate::context::ServiceContext;
use crate::error::{error_kind, Error};
use crate::messaging::{Channel, CreateVideoRequest, DetectionRequest, InboundMessage, MessageSource};
use crate::pipeline::{handle_create_video, handle_detection, NoOpReason, Outcome};
use anyhow::Result;
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Routes inbound messages to their pipeline, one task per message
pub struct Dispatcher {
    ctx: Arc<ServiceContext>,
    tracker: TaskTracker,
    shutdown_grace: Duration,
}

impl Dispatcher {
    pub fn new(ctx: Arc<ServiceContext>, shutdown_grace: Duration) -> Self {
        Self {
            ctx,
            tracker: TaskTracker::new(),
            shutdown_grace,
        }
    }

    /// Consume `source` until it is exhausted or `shutdown` fires, then wait
    /// up to the grace period for in-flight handlers
    pub async fn run<S: MessageSource>(&self, mut source: S, shutdown: CancellationToken) -> Result<()> {
        info!("Dispatcher started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, no longer accepting messages");
                    break;
                }
                message = source.next_message() => match message {
                    Some(message) => self.dispatch(message),
                    None => {
                        warn!("Message source closed");
                        break;
                    }
                }
            }
        }

        self.tracker.close();
        if tokio::time::timeout(self.shutdown_grace, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                "{} handlers still running after {:?}, abandoning them",
                self.tracker.len(),
                self.shutdown_grace
            );
        }

        info!("Dispatcher stopped");
        Ok(())
    }

    /// Handlers run detached; a panicking handler only loses its own message
    fn dispatch(&self, message: InboundMessage) {
        let ctx = self.ctx.clone();
        self.tracker.spawn(async move {
            process_message(&ctx, message).await;
        });
    }

    /// Number of handlers currently in flight
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }
}

/// Handle one message and log its result; never fails
pub async fn process_message(ctx: &ServiceContext, message: InboundMessage) -> Option<Outcome> {
    let size = message.payload.len();
    let key = message.routing_key.clone();

    match route(ctx, message).await {
        Ok(Outcome::NoOp(reason)) => {
            debug!("Message on '{}' ({} bytes) dropped: {}", key, size, reason);
            Some(Outcome::NoOp(reason))
        }
        Ok(outcome) => {
            info!("Message on '{}' handled: {}", key, outcome);
            Some(outcome)
        }
        Err(e) => {
            error!(
                "Message on '{}' ({} bytes) failed [{}]: {:#}",
                key,
                size,
                error_kind(&e),
                e
            );
            None
        }
    }
}

/// Resolve the channel, decode the payload and run the matching pipeline
pub async fn route(ctx: &ServiceContext, message: InboundMessage) -> Result<Outcome> {
    let channel = match Channel::from_routing_key(&message.routing_key) {
        Some(channel) if Channel::INBOUND.contains(&channel) => channel,
        _ => return Ok(Outcome::NoOp(NoOpReason::UnroutedChannel)),
    };
    debug!("Dispatching {} bytes on {}", message.payload.len(), channel);

    match channel {
        Channel::Event => handle_detection(ctx, decode::<DetectionRequest>(channel, &message)?).await,
        Channel::EventVideoCreate => {
            handle_create_video(ctx, decode::<CreateVideoRequest>(channel, &message)?).await
        }
        Channel::EventCreate => Ok(Outcome::NoOp(NoOpReason::UnroutedChannel)),
    }
}

fn decode<T: DeserializeOwned>(channel: Channel, message: &InboundMessage) -> Result<T> {
    serde_json::from_slice(&message.payload).map_err(|e| {
        Error::Serialization(format!("Malformed {} payload: {}", channel, e)).into()
    })
}
