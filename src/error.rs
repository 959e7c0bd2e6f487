use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to read label file {path:?}: {source}")]
    LabelFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to load class index {path:?}: {reason}")]
    ClassIndex { path: PathBuf, reason: String },
    #[error("Failed to discover images under {path:?}: {source}")]
    Discovery {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to decode image {path:?}: {source}")]
    ImageDecode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Model loading failed: {0}")]
    ModelLoad(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("Failed to serialize results: {0}")]
    Output(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PredictionError>;
