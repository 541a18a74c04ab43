use anyhow::Result;
use detection_server::annotate::Annotator;
use detection_server::config;
use detection_server::db::DatabaseService;
use detection_server::encoder::FfmpegEncoder;
use detection_server::inference::PredictorRegistry;
use detection_server::messaging::broker::create_message_broker;
use detection_server::messaging::Channel;
use detection_server::notification::FcmNotifier;
use detection_server::storage::MediaStore;
use detection_server::{Dispatcher, ServiceContext};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CONFIG_ENV: &str = "DETECTION_SERVER_CONFIG";

async fn run_app() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .map(PathBuf::from);
    let config = config::load_config(config_path.as_deref())?;

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();
    info!("Starting detection server");
    match &config_path {
        Some(path) => info!("Configuration loaded from {:?}", path),
        None => info!("No configuration file given, using defaults"),
    }

    let media = MediaStore::from_config(&config.storage);
    media.ensure_dirs()?;
    info!(
        "Media directories ready: images {:?}, videos {:?}",
        media.images_dir(),
        media.videos_dir()
    );

    let database = DatabaseService::connect(&config.database).await?;
    database.ensure_reachable().await?;
    let repositories = database.repositories();

    // No pipeline can work without the broker
    let message_broker = create_message_broker(config.message_broker.clone()).await?;
    info!("Message broker initialized");

    let predictors = PredictorRegistry::from_config(&config.inference, &config.storage)?;
    info!("Models ready: {}", predictors.names().join(", "));

    let annotator = match Annotator::load(&config.storage.font_path()) {
        Ok(annotator) => annotator,
        Err(e) => {
            warn!("Label font unavailable, drawing outlines only: {:#}", e);
            Annotator::outline_only()
        }
    };

    if config.notification.server_key.is_empty() {
        warn!("No push server key configured, notifications will be rejected");
    }

    let ctx = Arc::new(ServiceContext {
        predictors: Arc::new(predictors),
        annotator: Arc::new(annotator),
        media,
        repositories,
        publisher: message_broker.clone(),
        encoder: Arc::new(FfmpegEncoder::new(config.encoder.clone())),
        notifier: Arc::new(FcmNotifier::new(&config.notification)?),
    });

    let subscription = message_broker.subscribe(&Channel::INBOUND).await?;
    info!("Subscribed to {:?} on queue {}", Channel::INBOUND, subscription.queue_name());

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutting down..."),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_token.cancel();
    });

    let dispatcher = Dispatcher::new(
        ctx,
        Duration::from_secs(config.dispatcher.shutdown_grace_secs),
    );
    dispatcher.run(subscription, shutdown).await?;

    info!("Detection server stopped");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        eprintln!("Application error: {:#}", e);
        std::process::exit(1);
    }
}
