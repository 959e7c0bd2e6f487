use crate::error::{PredictionError, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub model: ModelConfig,
    pub labels: LabelsConfig,
    pub images: ImagesConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> std::result::Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

pub trait Validatable {
    fn get_path(&self) -> PathBuf;

    fn validate(&self) -> Result<()> {
        let path = self.get_path();
        if !path.exists() {
            return Err(PredictionError::InvalidConfig(format!(
                "File not found: {:?}",
                path
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub model_dir: PathBuf,
    pub onnx_file: String,
    pub class_index_file: String,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default)]
    pub normalization: Normalization,
    #[serde(default)]
    pub layout: TensorLayout,
    #[serde(default)]
    pub interpolation: Interpolation,
    #[serde(default)]
    pub apply_softmax: bool,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_model_instances() -> usize {
    1
}

fn default_input_size() -> u32 {
    224
}

fn default_top_k() -> usize {
    1
}

impl ModelConfig {
    pub fn get_class_index_path(&self) -> PathBuf {
        self.model_dir.join(&self.class_index_file)
    }
}

impl Validatable for ModelConfig {
    fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }

    fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(PredictionError::InvalidConfig(
                "model.input_size must be at least 1".to_string(),
            ));
        }
        if self.num_instances == 0 {
            return Err(PredictionError::InvalidConfig(
                "model.num_instances must be at least 1".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(PredictionError::InvalidConfig(
                "model.top_k must be at least 1".to_string(),
            ));
        }
        for path in [self.get_path(), self.get_class_index_path()] {
            if !path.exists() {
                return Err(PredictionError::InvalidConfig(format!(
                    "Model file not found: {:?}",
                    path
                )));
            }
        }
        Ok(())
    }
}

/// Input normalization the classifier was trained with.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// BGR channel order, ImageNet mean subtracted, no scaling (VGG/Keras).
    #[default]
    Caffe,
    /// RGB scaled to [0, 1], then ImageNet mean/std.
    Torch,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    #[default]
    Nchw,
    Nhwc,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    #[default]
    Nearest,
    Bilinear,
    CatmullRom,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LabelsConfig {
    pub labels_dir: PathBuf,
    pub dog_file: String,
    pub cat_file: String,
    #[serde(default)]
    pub overlap_precedence: OverlapPrecedence,
}

impl LabelsConfig {
    pub fn get_dog_path(&self) -> PathBuf {
        self.labels_dir.join(&self.dog_file)
    }

    pub fn get_cat_path(&self) -> PathBuf {
        self.labels_dir.join(&self.cat_file)
    }
}

/// Which tag a class description receives when it is listed in both label files.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPrecedence {
    #[default]
    Dog,
    Cat,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImagesConfig {
    pub images_dir: PathBuf,
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl Validatable for ImagesConfig {
    fn get_path(&self) -> PathBuf {
        self.images_dir.clone()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
}

fn default_concurrency() -> usize {
    1
}

fn default_fail_fast() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            fail_fast: default_fail_fast(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug`, `info` or `warn`.",
                other
            )),
        }
    }
}

impl Config {
    /// Checks everything that would otherwise only fail halfway through a run.
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.images.validate()?;
        if self.pipeline.concurrency == 0 {
            return Err(PredictionError::InvalidConfig(
                "pipeline.concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn get_configuration() -> Result<Config> {
    let base_path = std::env::current_dir().map_err(|e| {
        PredictionError::InvalidConfig(format!("Failed to determine the current directory: {}", e))
    })?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(PredictionError::InvalidConfig)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config = config.try_deserialize::<Config>()?;
    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(e);
    }

    Ok(config)
}
