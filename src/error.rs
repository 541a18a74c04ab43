use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Bounding box persist failure: {0}")]
    BoundingBoxPersist(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Service error: {0}")]
    Service(String),
}

impl Error {
    /// Short stable name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidImage(_) => "InvalidImage",
            Self::UnknownModel(_) => "UnknownModel",
            Self::BoundingBoxPersist(_) => "BoundingBoxPersistFailure",
            Self::Encoder(_) => "EncoderFailure",
            Self::Inference(_) => "Inference",
            Self::Notification(_) => "Notification",
            Self::Config(_) => "Config",
            Self::Database(_) => "Database",
            Self::Io(_) => "Io",
            Self::Serialization(_) => "Serialization",
            Self::Service(_) => "Service",
        }
    }
}

/// Kind of an error that went through `anyhow`, or "Other" when it did not
/// originate from this crate
pub fn error_kind(err: &anyhow::Error) -> &'static str {
    match err.downcast_ref::<Error>() {
        Some(e) => e.kind(),
        None if err.downcast_ref::<std::io::Error>().is_some() => "Io",
        None if err.downcast_ref::<serde_json::Error>().is_some() => "Serialization",
        None => "Other",
    }
}
