//! Message handlers: one pipeline per inbound channel.

use std::fmt::{Display, Formatter};

pub mod detection;
pub mod video;


pub use detection::handle_detection;
pub use video::handle_create_video;

/// What handling one message achieved
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Event (and its boxes) stored and acknowledged
    EventRecorded { event_id: i32, boxes: usize },
    /// Video encoded, events linked, notifications fanned out
    VideoAssembled {
        video_id: i32,
        title: String,
        notifications_sent: usize,
        notifications_failed: usize,
    },
    /// Valid request with nothing to do
    NoOp(NoOpReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    NoMatchingEvents,
    NoImagePaths,
    /// Every requested event is already part of a video
    AlreadyAssembled,
    UnroutedChannel,
}

impl Display for NoOpReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMatchingEvents => write!(f, "no matching events"),
            Self::NoImagePaths => write!(f, "no event images"),
            Self::AlreadyAssembled => write!(f, "events already in a video"),
            Self::UnroutedChannel => write!(f, "unrouted channel"),
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EventRecorded { event_id, boxes } => {
                write!(f, "event {} recorded with {} boxes", event_id, boxes)
            }
            Self::VideoAssembled {
                video_id,
                title,
                notifications_sent,
                notifications_failed,
            } => write!(
                f,
                "video {} assembled ('{}'), {} notifications sent, {} failed",
                video_id, title, notifications_sent, notifications_failed
            ),
            Self::NoOp(reason) => write!(f, "nothing to do: {}", reason),
        }
    }
}
