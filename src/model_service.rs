use crate::error::{PredictionError, Result};
use ndarray::{Array, Ix4};
use serde::Serialize;
use std::{collections::HashMap, fs, path::Path};

/// One ranked class prediction for a single image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub class_name: String,
    pub class_description: String,
    pub score: f32,
}

/// A pretrained classifier: ranked predictions for a batch-of-one tensor,
/// best first.
pub trait ImageClassifier: Send + Sync + 'static {
    fn classify(&self, input: &Array<f32, Ix4>) -> Result<Vec<Prediction>>;
}

/// ImageNet class index: position in the score vector to `(wnid, description)`.
#[derive(Debug, Clone)]
pub struct ClassIndex {
    classes: Vec<(String, String)>,
}

impl ClassIndex {
    pub fn new(classes: Vec<(String, String)>) -> Self {
        Self { classes }
    }

    /// Parses the `{"0": ["n01440764", "tench"], ...}` layout.
    pub fn from_json(json: &str) -> std::result::Result<Self, String> {
        let raw: HashMap<String, (String, String)> =
            serde_json::from_str(json).map_err(|e| e.to_string())?;

        let mut classes = vec![None; raw.len()];
        for (key, entry) in raw {
            let index: usize = key
                .parse()
                .map_err(|_| format!("Invalid class index key: {}", key))?;
            let slot = classes
                .get_mut(index)
                .ok_or_else(|| format!("Class index {} out of range", index))?;
            *slot = Some(entry);
        }

        let classes = classes
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| "Class index has gaps".to_string())?;

        Ok(Self { classes })
    }

    pub fn load(filepath: &Path) -> Result<Self> {
        let to_error = |reason| PredictionError::ClassIndex {
            path: filepath.to_path_buf(),
            reason,
        };
        let json = fs::read_to_string(filepath).map_err(|e| to_error(e.to_string()))?;
        Self::from_json(&json).map_err(to_error)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Pairs scores with class names and keeps the `top_k` highest, best first.
    pub fn decode(&self, scores: &[f32], top_k: usize) -> Result<Vec<Prediction>> {
        if scores.len() != self.classes.len() {
            return Err(PredictionError::Inference(format!(
                "model returned {} scores for {} classes",
                scores.len(),
                self.classes.len()
            )));
        }

        let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(top_k);

        Ok(ranked
            .into_iter()
            .map(|(index, score)| {
                let (class_name, class_description) = &self.classes[index];
                Prediction {
                    class_name: class_name.clone(),
                    class_description: class_description.clone(),
                    score,
                }
            })
            .collect())
    }
}

/// Turns a raw score vector into ranked predictions, converting logits to
/// probabilities first when the model does not end in a softmax.
pub fn rank_scores(
    class_index: &ClassIndex,
    scores: Vec<f32>,
    apply_softmax: bool,
    top_k: usize,
) -> Result<Vec<Prediction>> {
    let scores = if apply_softmax {
        softmax(&scores)
    } else {
        scores
    };

    class_index.decode(&scores, top_k)
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}
