//! In-memory collaborators shared by the pipeline and dispatcher tests.

use crate::annotate::Annotator;
use crate::context::ServiceContext;
use crate::db::models::{
    BoundingBox, DeviceToken, Event, EventVideo, NewBoundingBox, NewEvent, NewEventVideo,
};
use crate::db::repositories::{
    BoundingBoxStore, DeviceTokenStore, EventStore, EventVideoStore, Repositories,
};
use crate::encoder::VideoEncoder;
use crate::error::Error;
use crate::inference::{Detection, Predictor, PredictorRegistry, Rectangle};
use crate::messaging::{Channel, EventCreated, Publisher};
use crate::notification::{PushNotification, PushNotifier};
use crate::storage::MediaStore;
use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
pub struct InMemoryEvents {
    events: Mutex<Vec<Event>>,
    next_id: AtomicI32,
}

impl InMemoryEvents {
    /// Insert an event directly, as if recorded earlier
    pub fn seed(&self, path: Option<&str>, labels: &[&str]) -> i32 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let bounding_boxes = labels
            .iter()
            .enumerate()
            .map(|(i, label)| BoundingBox {
                id: id * 100 + i as i32,
                event_id: id,
                label: label.to_string(),
                confidence: 0.9,
                x: 0,
                y: 0,
                width: 10,
                height: 10,
            })
            .collect();
        self.events.lock().unwrap().push(Event {
            id,
            date: Utc::now(),
            camera_id: 1,
            path: path.map(str::to_string),
            event_video_id: None,
            bounding_boxes,
        });
        id
    }

    pub fn all(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventStore for InMemoryEvents {
    async fn create(&self, event: &NewEvent) -> Result<Event> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let created = Event {
            id,
            date: event.date,
            camera_id: event.camera_id,
            path: event.path.clone(),
            event_video_id: None,
            bounding_boxes: Vec::new(),
        };
        self.events.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn get_all(&self, ids: &[i32]) -> Result<Vec<Event>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| ids.contains(&e.id))
            .cloned()
            .collect())
    }

    async fn update(&self, event: &Event) -> Result<()> {
        let mut events = self.events.lock().unwrap();
        let stored = events
            .iter_mut()
            .find(|e| e.id == event.id)
            .ok_or_else(|| Error::Database(format!("Event {} not found", event.id)))?;
        if stored.event_video_id.is_some() && stored.event_video_id != event.event_video_id {
            return Err(Error::Database(format!("Event {} already linked", event.id)).into());
        }
        stored.event_video_id = event.event_video_id;
        stored.path = event.path.clone();
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBoundingBoxes {
    rows: Mutex<Vec<NewBoundingBox>>,
    calls: Mutex<usize>,
    /// Report zero rows written without storing anything
    pub drop_writes: AtomicBool,
}

impl InMemoryBoundingBoxes {
    pub fn rows(&self) -> Vec<NewBoundingBox> {
        self.rows.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl BoundingBoxStore for InMemoryBoundingBoxes {
    async fn create_many(&self, boxes: &[NewBoundingBox]) -> Result<u64> {
        *self.calls.lock().unwrap() += 1;
        if self.drop_writes.load(Ordering::SeqCst) {
            return Ok(0);
        }
        self.rows.lock().unwrap().extend_from_slice(boxes);
        Ok(boxes.len() as u64)
    }
}

#[derive(Default)]
pub struct InMemoryEventVideos {
    videos: Mutex<Vec<EventVideo>>,
}

impl InMemoryEventVideos {
    pub fn all(&self) -> Vec<EventVideo> {
        self.videos.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventVideoStore for InMemoryEventVideos {
    async fn create(&self, video: &NewEventVideo) -> Result<EventVideo> {
        let mut videos = self.videos.lock().unwrap();
        let created = EventVideo {
            id: videos.len() as i32 + 500,
            user_id: video.user_id.clone(),
            camera_id: video.camera_id,
            path: video.path.clone(),
            created_at: Utc::now(),
        };
        videos.push(created.clone());
        Ok(created)
    }
}

#[derive(Default)]
pub struct InMemoryDeviceTokens {
    tokens: Mutex<Vec<DeviceToken>>,
}

impl InMemoryDeviceTokens {
    pub fn add(&self, user_id: &str, token: &str) {
        let mut tokens = self.tokens.lock().unwrap();
        let id = tokens.len() as i32 + 1;
        tokens.push(DeviceToken {
            id,
            user_id: user_id.to_string(),
            token: token.to_string(),
        });
    }
}

#[async_trait]
impl DeviceTokenStore for InMemoryDeviceTokens {
    async fn get_all_by_user_id(&self, user_id: &str) -> Result<Vec<DeviceToken>> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<(Channel, Vec<u8>)>>,
}

impl RecordingPublisher {
    pub fn acks(&self) -> Vec<EventCreated> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(channel, _)| *channel == Channel::EventCreate)
            .map(|(_, body)| serde_json::from_slice(body).unwrap())
            .collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, channel: Channel, payload: Vec<u8>) -> Result<()> {
        self.messages.lock().unwrap().push((channel, payload));
        Ok(())
    }
}

/// Counts the numbered frames it is handed and writes a stub video
#[derive(Default)]
pub struct FakeEncoder {
    runs: Mutex<Vec<usize>>,
    pub fail: AtomicBool,
    /// Simulated encoding time
    pub delay: Mutex<Duration>,
}

impl FakeEncoder {
    /// Frame count seen by each run
    pub fn runs(&self) -> Vec<usize> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoEncoder for FakeEncoder {
    async fn encode(&self, input_pattern: &Path, output: &Path) -> Result<()> {
        let pattern = input_pattern.to_string_lossy().into_owned();
        let frames = (1..)
            .take_while(|i| Path::new(&pattern.replace("%d", &i.to_string())).exists())
            .count();
        self.runs.lock().unwrap().push(frames);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Encoder("Encoder exited with exit status: 1".to_string()).into());
        }
        std::fs::write(output, b"mp4")?;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    failing: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<(String, PushNotification)>>,
}

impl RecordingNotifier {
    pub fn fail_for(&self, token: &str) {
        self.failing.lock().unwrap().insert(token.to_string());
    }

    pub fn attempts(&self) -> Vec<(String, PushNotification)> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushNotifier for RecordingNotifier {
    async fn send(&self, token: &str, notification: &PushNotification) -> Result<()> {
        self.attempts
            .lock()
            .unwrap()
            .push((token.to_string(), notification.clone()));
        if self.failing.lock().unwrap().contains(token) {
            return Err(Error::Notification(format!("Push rejected: {}", token)).into());
        }
        Ok(())
    }
}

/// Returns the same detections for every image
pub struct FixedPredictor(pub Vec<Detection>);

impl Predictor for FixedPredictor {
    fn predict(&self, _image: &DynamicImage) -> Result<Vec<Detection>> {
        Ok(self.0.clone())
    }
}

/// Blocks for `delay` per image and records how many calls overlap
pub struct DelayedPredictor {
    delay: Duration,
    detections: Vec<Detection>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl DelayedPredictor {
    pub fn new(delay: Duration, detections: Vec<Detection>) -> Self {
        Self {
            delay,
            detections,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Highest number of simultaneous `predict` calls seen
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Predictor for DelayedPredictor {
    fn predict(&self, _image: &DynamicImage) -> Result<Vec<Detection>> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.detections.clone())
    }
}

pub fn detection(label: &str, score: f32, x: f32, y: f32, width: f32, height: f32) -> Detection {
    Detection {
        label: label.to_string(),
        score,
        rectangle: Rectangle { x, y, width, height },
    }
}

/// Solid-color JPEG as a `data:` URL
pub fn jpeg_data_url(width: u32, height: u32) -> String {
    let image = RgbImage::from_pixel(width, height, Rgb([40, 80, 120]));
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buffer, ImageFormat::Jpeg)
        .unwrap();
    format!("data:image/jpeg;base64,{}", STANDARD.encode(buffer.into_inner()))
}

/// Files directly inside `dir`, sorted
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    files.sort();
    files
}

/// A `ServiceContext` wired to in-memory collaborators and a temp directory
pub struct Harness {
    pub ctx: ServiceContext,
    pub events: Arc<InMemoryEvents>,
    pub bounding_boxes: Arc<InMemoryBoundingBoxes>,
    pub event_videos: Arc<InMemoryEventVideos>,
    pub device_tokens: Arc<InMemoryDeviceTokens>,
    pub publisher: Arc<RecordingPublisher>,
    pub encoder: Arc<FakeEncoder>,
    pub notifier: Arc<RecordingNotifier>,
    _dir: TempDir,
}

impl Harness {
    pub fn new(predictors: PredictorRegistry) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path().join("images"), dir.path().join("videos"));
        media.ensure_dirs().unwrap();

        let events = Arc::new(InMemoryEvents::default());
        let bounding_boxes = Arc::new(InMemoryBoundingBoxes::default());
        let event_videos = Arc::new(InMemoryEventVideos::default());
        let device_tokens = Arc::new(InMemoryDeviceTokens::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let encoder = Arc::new(FakeEncoder::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let ctx = ServiceContext {
            predictors: Arc::new(predictors),
            annotator: Arc::new(Annotator::outline_only()),
            media,
            repositories: Repositories {
                events: events.clone(),
                bounding_boxes: bounding_boxes.clone(),
                event_videos: event_videos.clone(),
                device_tokens: device_tokens.clone(),
            },
            publisher: publisher.clone(),
            encoder: encoder.clone(),
            notifier: notifier.clone(),
        };

        Self {
            ctx,
            events,
            bounding_boxes,
            event_videos,
            device_tokens,
            publisher,
            encoder,
            notifier,
            _dir: dir,
        }
    }

    /// Registry with a single `coco` model returning `detections`
    pub fn with_coco(detections: Vec<Detection>) -> Self {
        let mut registry = PredictorRegistry::new();
        registry.register("coco", Arc::new(FixedPredictor(detections)));
        Self::new(registry)
    }

    pub fn images(&self) -> Vec<PathBuf> {
        files_in(self.ctx.media.images_dir())
    }

    pub fn videos(&self) -> Vec<PathBuf> {
        files_in(self.ctx.media.videos_dir())
    }

    /// Write a real image file and seed an event pointing at it
    pub fn seed_event_with_image(&self, labels: &[&str]) -> i32 {
        let path = self.ctx.media.new_image_path();
        RgbImage::from_pixel(8, 8, Rgb([200, 10, 10]))
            .save_with_format(&path, ImageFormat::Jpeg)
            .unwrap();
        self.events.seed(Some(&path.to_string_lossy()), labels)
    }
}
