use crate::annotate::Annotator;
use crate::db::repositories::Repositories;
use crate::encoder::VideoEncoder;
use crate::inference::PredictorRegistry;
use crate::messaging::Publisher;
use crate::notification::PushNotifier;
use crate::storage::MediaStore;
use std::sync::Arc;

/// Everything a message handler needs, built once at start-up and shared
/// by every in-flight handler
#[derive(Clone)]
pub struct ServiceContext {
    pub predictors: Arc<PredictorRegistry>,
    pub annotator: Arc<Annotator>,
    pub media: MediaStore,
    pub repositories: Repositories,
    pub publisher: Arc<dyn Publisher>,
    pub encoder: Arc<dyn VideoEncoder>,
    pub notifier: Arc<dyn PushNotifier>,
}
