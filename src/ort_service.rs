use crate::{
    config::{ModelConfig, Validatable},
    error::{PredictionError, Result},
    model_service::{rank_scores, ClassIndex, ImageClassifier, Prediction},
};
use ndarray::{Array, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

/// ONNX Runtime backed classifier with a round-robin pool of sessions.
#[derive(Clone)]
pub struct OrtClassifier {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    output_name: String,
    class_index: Arc<ClassIndex>,
    apply_softmax: bool,
    top_k: usize,
}

fn build_session(model_config: &ModelConfig) -> std::result::Result<Session, ort::Error> {
    let builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "cuda")]
    let builder = builder.with_execution_providers([
        ort::execution_providers::CUDAExecutionProvider::default().build(),
    ])?;

    builder.commit_from_file(model_config.get_path())
}

impl OrtClassifier {
    pub fn new(model_config: &ModelConfig) -> Result<Self> {
        model_config.validate()?;
        let class_index = ClassIndex::load(&model_config.get_class_index_path())?;

        tracing::info!(
            "Loading classification model from {:?}",
            model_config.get_path()
        );
        let num_instances = model_config.num_instances;
        let sessions = (0..num_instances)
            .map(|_| build_session(model_config).map(|session| Arc::new(Mutex::new(session))))
            .collect::<std::result::Result<Vec<_>, ort::Error>>()
            .map_err(|e| PredictionError::ModelLoad(e.to_string()))?;

        let output_name = sessions
            .first()
            .and_then(|session| session.lock().ok())
            .and_then(|session| session.outputs.first().map(|output| output.name.clone()))
            .ok_or_else(|| PredictionError::ModelLoad("model has no outputs".to_string()))?;

        tracing::info!(
            "Created {} ONNX sessions, reading output '{}' over {} classes",
            num_instances,
            output_name,
            class_index.len()
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            output_name,
            class_index: Arc::new(class_index),
            apply_softmax: model_config.apply_softmax,
            top_k: model_config.top_k,
        })
    }

    pub fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let session_arc = &self.sessions[index];
        let mut session = session_arc
            .lock()
            .map_err(|e| PredictionError::Inference(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Running inference on session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().into_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| PredictionError::Inference(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| PredictionError::Inference(e.to_string()))?;

        let (_, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| PredictionError::Inference(format!("failed to extract tensor: {}", e)))?;

        Ok(data.to_vec())
    }
}

impl ImageClassifier for OrtClassifier {
    fn classify(&self, input: &Array<f32, Ix4>) -> Result<Vec<Prediction>> {
        let scores = self.run_inference(input)?;
        rank_scores(&self.class_index, scores, self.apply_softmax, self.top_k)
    }
}
