use crate::config::{LabelsConfig, OverlapPrecedence};
use crate::error::{PredictionError, Result};
use serde::Serialize;
use std::{
    collections::HashSet,
    fmt,
    fs::File,
    io::{self, BufRead},
    path::Path,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CatDog {
    Dog,
    Cat,
}

impl CatDog {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatDog::Dog => "Dog",
            CatDog::Cat => "Cat",
        }
    }
}

impl fmt::Display for CatDog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalizes one line of a label file into its class names.
///
/// Tokens are comma separated, trimmed, and have every space replaced by an
/// underscore so they compare equal to the classifier's class descriptions.
pub fn parse_label_line(line: &str) -> impl Iterator<Item = String> + '_ {
    line.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| token.replace(' ', "_"))
}

pub fn read_labels<R: BufRead>(reader: R) -> io::Result<HashSet<String>> {
    let mut labels = HashSet::new();
    for line_result in reader.lines() {
        let line = line_result?;
        labels.extend(parse_label_line(&line));
    }
    Ok(labels)
}

pub fn load_labels(filepath: &Path) -> Result<HashSet<String>> {
    let to_error = |source| PredictionError::LabelFile {
        path: filepath.to_path_buf(),
        source,
    };
    let file = File::open(filepath).map_err(to_error)?;
    read_labels(io::BufReader::new(file)).map_err(to_error)
}

/// The dog and cat breed sets, loaded once and shared read-only.
#[derive(Debug, Clone)]
pub struct LabelSets {
    dog_labels: HashSet<String>,
    cat_labels: HashSet<String>,
    precedence: OverlapPrecedence,
}

impl LabelSets {
    pub fn new(
        dog_labels: HashSet<String>,
        cat_labels: HashSet<String>,
        precedence: OverlapPrecedence,
    ) -> Self {
        let overlap = dog_labels.intersection(&cat_labels).count();
        if overlap > 0 {
            tracing::warn!(
                "{} class names are listed as both dog and cat, {:?} takes precedence",
                overlap,
                precedence
            );
        }

        Self {
            dog_labels,
            cat_labels,
            precedence,
        }
    }

    pub fn load(labels_cfg: &LabelsConfig) -> Result<Self> {
        let dog_labels = load_labels(&labels_cfg.get_dog_path())?;
        let cat_labels = load_labels(&labels_cfg.get_cat_path())?;
        tracing::info!(
            "Loaded {} dog labels and {} cat labels",
            dog_labels.len(),
            cat_labels.len()
        );

        Ok(Self::new(
            dog_labels,
            cat_labels,
            labels_cfg.overlap_precedence,
        ))
    }

    pub fn categorize(&self, class_description: &str) -> Option<CatDog> {
        let is_dog = self.dog_labels.contains(class_description);
        let is_cat = self.cat_labels.contains(class_description);

        match (is_dog, is_cat, self.precedence) {
            (true, true, OverlapPrecedence::Cat) => Some(CatDog::Cat),
            (true, _, _) => Some(CatDog::Dog),
            (false, true, _) => Some(CatDog::Cat),
            (false, false, _) => None,
        }
    }
}
