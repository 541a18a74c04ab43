use crate::context::ServiceContext;
use crate::db::models::{NewBoundingBox, NewEvent};
use crate::error::Error;
use crate::inference::{filter_and_clamp, PixelBox};
use crate::messaging::broker::publish_json;
use crate::messaging::{Channel, DetectionRequest, EventCreated};
use crate::pipeline::Outcome;
use crate::storage::ScratchFiles;
use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Run one detection request end to end.
///
/// The temporary input image is removed on every exit path. The annotated
/// event image is only kept once its Event record exists.
pub async fn handle_detection(ctx: &ServiceContext, request: DetectionRequest) -> Result<Outcome> {
    let bytes = decode_image_payload(&request.image)?;
    let image = decode_image(bytes.clone()).await?;
    let (width, height) = (image.width(), image.height());

    let mut scratch = ScratchFiles::new();
    let input_path = ctx.media.new_image_path();
    scratch.track(&input_path);
    tokio::fs::write(&input_path, &bytes)
        .await
        .map_err(|e| Error::Io(format!("Failed to write {:?}: {}", input_path, e)))?;

    let predictor = ctx.predictors.get(&request.model)?;

    let started = Instant::now();
    let detections = {
        let image = image.clone();
        tokio::task::spawn_blocking(move || predictor.predict(&image))
            .await
            .map_err(|e| Error::Service(format!("Inference task failed: {}", e)))??
    };
    info!(
        "Model '{}' found {} candidates on camera {} in {} ms",
        request.model,
        detections.len(),
        request.camera_id,
        started.elapsed().as_millis()
    );

    let boxes = filter_and_clamp(&detections, width, height);
    debug!("{} detections survive filtering", boxes.len());

    let event_path = ctx.media.new_image_path();
    scratch.track(&event_path);
    let boxes = save_annotated(ctx, image, boxes, event_path.clone()).await?;

    let event = ctx
        .repositories
        .events
        .create(&NewEvent {
            date: request.date,
            camera_id: request.camera_id,
            path: Some(path_string(&event_path)),
        })
        .await?;
    scratch.keep(&event_path);

    let rows: Vec<NewBoundingBox> = boxes
        .iter()
        .map(|b| NewBoundingBox {
            event_id: event.id,
            label: b.label.clone(),
            confidence: b.score,
            x: b.x as i32,
            y: b.y as i32,
            width: b.width as i32,
            height: b.height as i32,
        })
        .collect();

    if !rows.is_empty() {
        let written = ctx.repositories.bounding_boxes.create_many(&rows).await?;
        if written == 0 {
            return Err(Error::BoundingBoxPersist(format!(
                "No rows written for {} boxes of event {}",
                rows.len(),
                event.id
            ))
            .into());
        }
        if written < rows.len() as u64 {
            warn!("Only {} of {} boxes written for event {}", written, rows.len(), event.id);
        }
    }

    publish_json(
        ctx.publisher.as_ref(),
        Channel::EventCreate,
        &EventCreated {
            id: event.id,
            camera_id: event.camera_id,
        },
    )
    .await?;

    scratch.clear().await;

    Ok(Outcome::EventRecorded {
        event_id: event.id,
        boxes: rows.len(),
    })
}

/// Strip an optional `data:<mime>;base64,` prefix and decode
pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>> {
    let encoded = match payload.find("base64,") {
        Some(idx) if payload.starts_with("data:") => &payload[idx + "base64,".len()..],
        _ => payload,
    };
    let encoded: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    if encoded.is_empty() {
        return Err(Error::InvalidImage("Empty image payload".to_string()).into());
    }

    STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| Error::InvalidImage(format!("Bad base64: {}", e)).into())
}

async fn decode_image(bytes: Vec<u8>) -> Result<Arc<DynamicImage>> {
    let image = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await
        .map_err(|e| Error::Service(format!("Image decode task failed: {}", e)))?
        .map_err(|e| Error::InvalidImage(format!("Unreadable image: {}", e)))?;
    Ok(Arc::new(image))
}

async fn save_annotated(
    ctx: &ServiceContext,
    image: Arc<DynamicImage>,
    boxes: Vec<PixelBox>,
    path: PathBuf,
) -> Result<Vec<PixelBox>> {
    let annotator = ctx.annotator.clone();
    tokio::task::spawn_blocking(move || {
        let mut canvas = image.to_rgb8();
        annotator.annotate(&mut canvas, &boxes);
        canvas
            .save_with_format(&path, ImageFormat::Jpeg)
            .map_err(|e| Error::Io(format!("Failed to save {:?}: {}", path, e)))?;
        Ok::<_, anyhow::Error>(boxes)
    })
    .await
    .map_err(|e| Error::Service(format!("Annotation task failed: {}", e)))?
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
