use crate::labels::{CatDog, LabelSets};
use crate::model_service::Prediction;
use serde::Serialize;
use std::{fmt, path::PathBuf};

const HEADERS: [&str; 4] = ["class_description", "score", "catdog", "file_name"];
const UNSET_TAG: &str = "NaN";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    /// Position of the image in discovery order.
    pub index: usize,
    pub class_description: String,
    pub score: f32,
    pub catdog: Option<CatDog>,
    pub file_name: PathBuf,
}

impl ResultRow {
    pub fn new(index: usize, file_name: PathBuf, top: Prediction, labels: &LabelSets) -> Self {
        let catdog = labels.categorize(&top.class_description);
        Self {
            index,
            class_description: top.class_description,
            score: top.score,
            catdog,
            file_name,
        }
    }

    fn cells(&self) -> [String; 4] {
        [
            self.class_description.clone(),
            format!("{:.6}", self.score),
            self.catdog
                .map_or_else(|| UNSET_TAG.to_string(), |tag| tag.to_string()),
            self.file_name.display().to_string(),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultTable {
    rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn new(rows: Vec<ResultRow>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, row: ResultRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Orders rows by score, highest first. Stable, so ties keep discovery order.
    pub fn sort_by_score(&mut self) {
        self.rows.sort_by(|a, b| b.score.total_cmp(&a.score));
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<(String, [String; 4])> = self
            .rows
            .iter()
            .map(|row| (row.index.to_string(), row.cells()))
            .collect();

        let index_width = cells.iter().map(|(index, _)| index.len()).max().unwrap_or(0);
        let mut widths = HEADERS.map(str::len);
        for (_, row) in &cells {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        write!(f, "{:index_width$}", "")?;
        for (header, width) in HEADERS.iter().zip(widths) {
            write!(f, "  {:>width$}", header)?;
        }
        writeln!(f)?;

        for (index, row) in &cells {
            write!(f, "{:<index_width$}", index)?;
            for (cell, width) in row.iter().zip(widths) {
                write!(f, "  {:>width$}", cell)?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}
