//! Detection models and the registry that selects them by name.

use crate::config::{InferenceConfig, StorageConfig};
use crate::error::Error;
use anyhow::Result;
use image::DynamicImage;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;

pub mod labels;
pub mod yolo;

pub use yolo::YoloV8Predictor;

/// Minimum score a detection needs to be kept
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Rectangle in source-image pixels, as predicted (may extend past the image)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One predicted object instance
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    /// Confidence in [0, 1]
    pub score: f32,
    pub rectangle: Rectangle,
}

/// Detection clamped to the image it was found in
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBox {
    pub label: String,
    pub score: f32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Detection {
    /// Clamp the rectangle into a `image_width` x `image_height` image.
    ///
    /// Origin is clamped at zero and the extent cut at the right/bottom edge.
    /// Returns `None` when nothing of the box is left inside the image.
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Option<PixelBox> {
        let rect = &self.rectangle;
        if !(rect.x.is_finite() && rect.y.is_finite() && rect.width.is_finite() && rect.height.is_finite()) {
            return None;
        }

        let x = rect.x.max(0.0) as i64;
        let y = rect.y.max(0.0) as i64;
        let width = (image_width as i64 - x).min(rect.width as i64);
        let height = (image_height as i64 - y).min(rect.height as i64);

        if width <= 0 || height <= 0 {
            return None;
        }

        Some(PixelBox {
            label: self.label.clone(),
            score: self.score.clamp(0.0, 1.0),
            x: x as u32,
            y: y as u32,
            width: width as u32,
            height: height as u32,
        })
    }
}

/// Apply the confidence policy and clamp the survivors
pub fn filter_and_clamp(detections: &[Detection], image_width: u32, image_height: u32) -> Vec<PixelBox> {
    detections
        .iter()
        .filter(|d| d.score >= CONFIDENCE_THRESHOLD)
        .filter_map(|d| d.clamp_to(image_width, image_height))
        .collect()
}

/// A loaded detection model. Implementations are shared between concurrent
/// pipelines and must tolerate parallel calls.
pub trait Predictor: Send + Sync {
    fn predict(&self, image: &DynamicImage) -> Result<Vec<Detection>>;
}

/// Name -> predictor mapping, built once at start-up
#[derive(Default, Clone)]
pub struct PredictorRegistry {
    predictors: HashMap<String, Arc<dyn Predictor>>,
}

impl PredictorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every configured model eagerly
    pub fn from_config(config: &InferenceConfig, storage: &StorageConfig) -> Result<Self> {
        let mut registry = Self::new();
        for model in &config.models {
            let path = storage.root.join(&model.path);
            let predictor = YoloV8Predictor::load(&path, model)?;
            info!("Loaded model '{}' from {:?}", model.name, path);
            registry.register(&model.name, Arc::new(predictor));
        }
        Ok(registry)
    }

    /// Register (or replace) a predictor under `name`
    pub fn register(&mut self, name: &str, predictor: Arc<dyn Predictor>) {
        self.predictors.insert(name.to_string(), predictor);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Predictor>> {
        self.predictors
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownModel(name.to_string()).into())
    }

    pub fn predict(&self, name: &str, image: &DynamicImage) -> Result<Vec<Detection>> {
        self.get(name)?.predict(image)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.predictors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
