use super::labels::coco_labels;
use super::{Detection, Predictor, Rectangle};
use crate::config::ModelConfig;
use crate::error::Error;
use anyhow::Result;
use image::{imageops::FilterType, DynamicImage};
use log::debug;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;

/// Candidates below this score are discarded before NMS
const CANDIDATE_THRESHOLD: f32 = 0.25;
/// IoU above which a lower-scored box of the same class is suppressed
const IOU_THRESHOLD: f32 = 0.45;

/// YOLOv8 ONNX export run through ONNX Runtime.
///
/// The session is behind a mutex: ONNX Runtime needs exclusive access per
/// run, and one predictor instance serves every in-flight pipeline.
pub struct YoloV8Predictor {
    session: Mutex<Session>,
    labels: Vec<String>,
    input_size: u32,
}

impl YoloV8Predictor {
    pub fn load(model_path: &Path, model: &ModelConfig) -> Result<Self> {
        let mut builder = Session::builder().map_err(|e| load_error(model_path, e))?;
        builder = builder
            .with_intra_threads(model.threads.max(1))
            .map_err(|e| load_error(model_path, e))?;
        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| load_error(model_path, e))?;

        let labels = if model.labels.is_empty() {
            coco_labels()
        } else {
            model.labels.clone()
        };

        Ok(Self {
            session: Mutex::new(session),
            labels,
            input_size: model.input_size,
        })
    }

    /// NCHW float tensor in [0, 1], stretched to the square model input
    fn preprocess(&self, image: &DynamicImage) -> Result<Tensor<f32>> {
        let size = self.input_size;
        let resized = image::imageops::resize(&image.to_rgb8(), size, size, FilterType::Triangle);

        let plane = (size * size) as usize;
        let mut data = vec![0f32; 3 * plane];
        for (idx, pixel) in resized.pixels().enumerate() {
            data[idx] = pixel[0] as f32 / 255.0;
            data[plane + idx] = pixel[1] as f32 / 255.0;
            data[2 * plane + idx] = pixel[2] as f32 / 255.0;
        }

        let shape = [1usize, 3, size as usize, size as usize];
        Tensor::from_array((shape, data.into_boxed_slice()))
            .map_err(|e| Error::Inference(format!("Failed to create input tensor: {}", e)).into())
    }
}

fn load_error(model_path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Inference(format!("Failed to load model {:?}: {}", model_path, e))
}

impl Predictor for YoloV8Predictor {
    fn predict(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let input = self.preprocess(image)?;
        let scale_x = image.width() as f32 / self.input_size as f32;
        let scale_y = image.height() as f32 / self.input_size as f32;

        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::Inference("Model session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs!["images" => input])
            .map_err(|e| Error::Inference(format!("Inference failed: {}", e)))?;

        let (shape, data) = outputs["output0"]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Inference(format!("Failed to read output tensor: {}", e)))?;

        // [1, 4 + classes, proposals]
        let dims: Vec<i64> = shape.iter().copied().collect();
        if dims.len() != 3 || dims[1] < 5 {
            return Err(Error::Inference(format!("Unexpected output shape {:?}", dims)).into());
        }

        let candidates = decode_output(
            data,
            dims[1] as usize,
            dims[2] as usize,
            &self.labels,
            scale_x,
            scale_y,
        );
        debug!("{} candidates before NMS", candidates.len());

        Ok(nms(candidates, IOU_THRESHOLD))
    }
}

/// Decode a row-major `[rows, proposals]` YOLOv8 head into best-class
/// detections in source-image pixels.
pub fn decode_output(
    data: &[f32],
    rows: usize,
    proposals: usize,
    labels: &[String],
    scale_x: f32,
    scale_y: f32,
) -> Vec<Detection> {
    let classes = rows.saturating_sub(4);
    if data.len() < rows * proposals {
        return Vec::new();
    }

    (0..proposals)
        .filter_map(|i| {
            let (class, score) = (0..classes)
                .map(|c| (c, data[(4 + c) * proposals + i]))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

            if score < CANDIDATE_THRESHOLD {
                return None;
            }

            let cx = data[i];
            let cy = data[proposals + i];
            let w = data[2 * proposals + i];
            let h = data[3 * proposals + i];

            let label = labels
                .get(class)
                .cloned()
                .unwrap_or_else(|| format!("class{}", class));

            Some(Detection {
                label,
                score: score.clamp(0.0, 1.0),
                rectangle: Rectangle {
                    x: (cx - w / 2.0) * scale_x,
                    y: (cy - h / 2.0) * scale_y,
                    width: w * scale_x,
                    height: h * scale_y,
                },
            })
        })
        .collect()
}

fn iou(a: &Rectangle, b: &Rectangle) -> f32 {
    let ix1 = a.x.max(b.x);
    let iy1 = a.y.max(b.y);
    let ix2 = (a.x + a.width).min(b.x + b.width);
    let iy2 = (a.y + a.height).min(b.y + b.height);
    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let union = a.width * a.height + b.width * b.height - inter;
    inter / union
}

/// Greedy per-class NMS: sort by score descending, suppress overlapping boxes.
pub fn nms(mut detections: Vec<Detection>, iou_thresh: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        let overlaps = kept.iter().any(|k| {
            k.label == candidate.label && iou(&k.rectangle, &candidate.rectangle) > iou_thresh
        });
        if !overlaps {
            kept.push(candidate);
        }
    }

    kept
}
