mod discovery;
mod labels;
mod model_service;
mod ort_service;
mod preprocess;
mod results;

pub mod app;
pub mod config;
pub mod error;

pub use app::{start_app, Pipeline};
pub use discovery::discover_images;
pub use error::PredictionError;
pub use labels::{load_labels, CatDog, LabelSets};
pub use model_service::{ClassIndex, ImageClassifier, Prediction};
pub use ort_service::OrtClassifier;
pub use preprocess::ImagePreprocessor;
pub use results::{ResultRow, ResultTable};
