use crate::context::ServiceContext;
use crate::db::models::{DeviceToken, NewEventVideo};
use crate::error::Error;
use crate::messaging::CreateVideoRequest;
use crate::notification::{PushNotification, PushNotifier};
use crate::pipeline::{NoOpReason, Outcome};
use crate::storage::ScratchFiles;
use anyhow::Result;
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Fold the requested events into one video and notify the user's devices.
///
/// Working copies are removed on every exit path; the encoded video is
/// removed too unless its EventVideo record was created.
pub async fn handle_create_video(ctx: &ServiceContext, request: CreateVideoRequest) -> Result<Outcome> {
    let fetched = ctx.repositories.events.get_all(&request.event_ids).await?;
    if fetched.is_empty() {
        info!("No events found for ids {:?}, skipping video", request.event_ids);
        return Ok(Outcome::NoOp(NoOpReason::NoMatchingEvents));
    }

    // A video link is set once; linked events stay with their first video
    let (mut events, linked): (Vec<_>, Vec<_>) = fetched
        .into_iter()
        .partition(|event| event.event_video_id.is_none());
    for event in &linked {
        warn!(
            "Event {} already belongs to video {:?}, leaving it out",
            event.id, event.event_video_id
        );
    }
    if events.is_empty() {
        info!("All requested events already belong to a video, skipping");
        return Ok(Outcome::NoOp(NoOpReason::AlreadyAssembled));
    }

    let image_paths: Vec<String> = events
        .iter()
        .filter_map(|event| event.path.clone())
        .filter(|path| !path.is_empty())
        .collect();
    if image_paths.is_empty() {
        info!("None of {} events has an image, skipping video", events.len());
        return Ok(Outcome::NoOp(NoOpReason::NoImagePaths));
    }

    let batch = Uuid::new_v4().to_string();
    let mut scratch = ScratchFiles::new();
    let mut frames = 0;
    for source in &image_paths {
        let frame = ctx.media.sequence_frame_path(&batch, frames + 1);
        scratch.track(&frame);
        match tokio::fs::copy(source, &frame).await {
            Ok(_) => frames += 1,
            // Numbering must stay contiguous for the encoder
            Err(e) => warn!("Skipping event image {}: {}", source, e),
        }
    }
    if frames == 0 {
        info!("No event image of batch {} could be read, skipping video", batch);
        return Ok(Outcome::NoOp(NoOpReason::NoImagePaths));
    }
    debug!("Copied {} frames for batch {}", frames, batch);

    let video_path = ctx.media.new_video_path();
    scratch.track(&video_path);
    ctx.encoder
        .encode(&ctx.media.sequence_pattern(&batch), &video_path)
        .await?;

    let video = ctx
        .repositories
        .event_videos
        .create(&NewEventVideo {
            user_id: request.user_id.clone(),
            camera_id: request.camera_id,
            path: video_path.to_string_lossy().into_owned(),
        })
        .await?;
    scratch.keep(&video_path);

    let mut labels = BTreeSet::new();
    for event in &mut events {
        event.event_video_id = Some(video.id);
        ctx.repositories.events.update(event).await?;
        labels.extend(event.labels().map(str::to_string));
    }
    let title = labels.into_iter().collect::<Vec<_>>().join(", ");

    let tokens = ctx
        .repositories
        .device_tokens
        .get_all_by_user_id(&request.user_id)
        .await?;
    let (notifications_sent, notifications_failed) = if tokens.is_empty() {
        info!("User {} has no registered devices, skipping notification", request.user_id);
        (0, 0)
    } else {
        let notification = PushNotification::for_video(request.camera_id, &title);
        notify_all(ctx.notifier.as_ref(), &tokens, &notification).await
    };

    scratch.clear().await;

    Ok(Outcome::VideoAssembled {
        video_id: video.id,
        title,
        notifications_sent,
        notifications_failed,
    })
}

/// Send to every token; one failing device never stops the others
async fn notify_all(
    notifier: &dyn PushNotifier,
    tokens: &[DeviceToken],
    notification: &PushNotification,
) -> (usize, usize) {
    let mut sent = 0;
    let mut failed = 0;

    for device in tokens {
        match notifier.send(&device.token, notification).await {
            Ok(()) => sent += 1,
            Err(e) => {
                failed += 1;
                match e.downcast_ref::<Error>() {
                    Some(Error::Notification(_)) => {
                        warn!("Push to device {} failed: {}", device.id, e)
                    }
                    _ => error!("Push to device {} failed: {:#}", device.id, e),
                }
            }
        }
    }

    (sent, failed)
}
