use crate::{
    config::{Config, OutputFormat, PipelineConfig},
    discovery::discover_images,
    error::{PredictionError, Result},
    labels::LabelSets,
    model_service::{ImageClassifier, Prediction},
    ort_service::OrtClassifier,
    preprocess::ImagePreprocessor,
    results::{ResultRow, ResultTable},
};
use futures::{stream, StreamExt};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

fn classify_file<C: ImageClassifier>(
    classifier: &C,
    preprocessor: &ImagePreprocessor,
    path: &Path,
) -> Result<Prediction> {
    let input = preprocessor.load(path)?;
    classifier
        .classify(&input)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            PredictionError::Inference(format!("no prediction returned for {:?}", path))
        })
}

/// Classifies images and assembles the cat/dog result table.
///
/// The classifier and label sets are built once and shared read-only by every
/// worker.
pub struct Pipeline<C: ImageClassifier> {
    classifier: Arc<C>,
    preprocessor: ImagePreprocessor,
    labels: Arc<LabelSets>,
    concurrency: usize,
    fail_fast: bool,
}

impl<C: ImageClassifier> Pipeline<C> {
    pub fn new(
        classifier: C,
        preprocessor: ImagePreprocessor,
        labels: LabelSets,
        pipeline_cfg: &PipelineConfig,
    ) -> Self {
        Self {
            classifier: Arc::new(classifier),
            preprocessor,
            labels: Arc::new(labels),
            concurrency: pipeline_cfg.concurrency.max(1),
            fail_fast: pipeline_cfg.fail_fast,
        }
    }

    /// Rows come back in file order, sorted by score before returning.
    pub async fn run(&self, image_files: Vec<PathBuf>) -> Result<ResultTable> {
        let mut outcomes = stream::iter(image_files.into_iter().enumerate())
            .map(|(index, path)| {
                let classifier = self.classifier.clone();
                let preprocessor = self.preprocessor.clone();
                tokio::task::spawn_blocking(move || {
                    let top = classify_file(classifier.as_ref(), &preprocessor, &path);
                    (index, path, top)
                })
            })
            .buffered(self.concurrency);

        let mut table = ResultTable::default();
        while let Some(joined) = outcomes.next().await {
            let (index, path, top) = joined?;
            match top {
                Ok(top) => {
                    let row = ResultRow::new(index, path, top, &self.labels);
                    tracing::debug!(
                        "{:?}: {} ({:.3}) -> {:?}",
                        row.file_name,
                        row.class_description,
                        row.score,
                        row.catdog
                    );
                    table.push(row);
                }
                Err(e) if !self.fail_fast => {
                    tracing::warn!("Skipping {:?}: {}", path, e);
                }
                Err(e) => return Err(e),
            }
        }

        table.sort_by_score();
        Ok(table)
    }
}

pub fn render(table: &ResultTable, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table.to_string()),
        OutputFormat::Json => Ok(table.to_json()?),
    }
}

pub async fn start_app(config: Config) -> Result<()> {
    tracing::debug!("{:?}", config);
    let labels = LabelSets::load(&config.labels)?;
    let classifier = OrtClassifier::new(&config.model)?;
    let preprocessor = ImagePreprocessor::new(&config.model);
    let image_files = discover_images(&config.images)?;

    let pipeline = Pipeline::new(classifier, preprocessor, labels, &config.pipeline);
    let table = pipeline.run(image_files).await?;
    tracing::info!("Classified {} images", table.len());

    println!("{}", render(&table, config.output.format)?.trim_end());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        Interpolation, ModelConfig, Normalization, OverlapPrecedence, TensorLayout,
    };
    use crate::labels::{read_labels, CatDog};
    use image::{ImageBuffer, Rgb};
    use ndarray::{Array, Ix4};
    use std::{fs, io::Cursor};

    /// Reads the red channel of the first pixel back out of a caffe/NCHW
    /// tensor and looks the class up by it.
    struct MockClassifier {
        by_red: Vec<(u8, &'static str, f32)>,
    }

    impl ImageClassifier for MockClassifier {
        fn classify(&self, input: &Array<f32, Ix4>) -> Result<Vec<Prediction>> {
            let red = (input[[0, 2, 0, 0]] + 123.68).round() as u8;
            self.by_red
                .iter()
                .find(|(r, _, _)| *r == red)
                .map(|(_, description, score)| {
                    vec![Prediction {
                        class_name: format!("n{:08}", red),
                        class_description: description.to_string(),
                        score: *score,
                    }]
                })
                .ok_or_else(|| PredictionError::Inference(format!("unknown red {}", red)))
        }
    }

    fn mock() -> MockClassifier {
        MockClassifier {
            by_red: vec![
                (10, "Chihuahua", 0.777919),
                (20, "tabby", 0.47775),
                (30, "Egyptian_cat", 0.449422),
                (40, "chow", 0.278078),
                (50, "lynx", 0.147593),
                (60, "boxer", 0.107166),
                (70, "tennis_ball", 0.5),
            ],
        }
    }

    fn model_config() -> ModelConfig {
        ModelConfig {
            model_dir: PathBuf::from("models"),
            onnx_file: "vgg19.onnx".to_string(),
            class_index_file: "imagenet_class_index.json".to_string(),
            num_instances: 1,
            input_size: 32,
            normalization: Normalization::Caffe,
            layout: TensorLayout::Nchw,
            interpolation: Interpolation::Nearest,
            apply_softmax: false,
            top_k: 1,
        }
    }

    fn labels() -> LabelSets {
        LabelSets::new(
            read_labels(Cursor::new("Chihuahua, boxer, chow")).unwrap(),
            read_labels(Cursor::new("tabby, Egyptian_cat, lynx")).unwrap(),
            OverlapPrecedence::Dog,
        )
    }

    fn pipeline(concurrency: usize, fail_fast: bool) -> Pipeline<MockClassifier> {
        Pipeline::new(
            mock(),
            ImagePreprocessor::new(&model_config()),
            labels(),
            &PipelineConfig {
                concurrency,
                fail_fast,
            },
        )
    }

    fn write_images(name: &str, images: &[(&str, u8)]) -> (PathBuf, Vec<PathBuf>) {
        let dir = std::env::temp_dir().join(format!("catdog_app_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let mut paths = Vec::new();
        for (file, red) in images {
            let path = dir.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(12, 9, Rgb([*red, 100, 200]))
                .save(&path)
                .unwrap();
            paths.push(path);
        }
        (dir, paths)
    }

    const IMAGES: [(&str, u8); 6] = [
        ("ambiguous/tonks_jasper_bone.png", 40),
        ("cats/goober_lounging.png", 30),
        ("cats/google_tabby_cat.png", 20),
        ("cats/lilly_perch.png", 50),
        ("dogs/tonks_beer.png", 60),
        ("dogs/tonks_scary_sneeze.png", 10),
    ];

    #[tokio::test]
    async fn test_run_sorts_and_tags() -> Result<()> {
        let (dir, paths) = write_images("sorts", &IMAGES);

        let table = pipeline(1, true).run(paths.clone()).await?;

        let rows: Vec<(&str, Option<CatDog>, &Path)> = table
            .rows()
            .iter()
            .map(|row| {
                (
                    row.class_description.as_str(),
                    row.catdog,
                    row.file_name.as_path(),
                )
            })
            .collect();
        assert_eq!(
            rows,
            vec![
                ("Chihuahua", Some(CatDog::Dog), paths[5].as_path()),
                ("tabby", Some(CatDog::Cat), paths[2].as_path()),
                ("Egyptian_cat", Some(CatDog::Cat), paths[1].as_path()),
                ("chow", Some(CatDog::Dog), paths[0].as_path()),
                ("lynx", Some(CatDog::Cat), paths[3].as_path()),
                ("boxer", Some(CatDog::Dog), paths[4].as_path()),
            ]
        );
        assert!(table
            .rows()
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score));

        fs::remove_dir_all(&dir).unwrap();
        Ok(())
    }

    #[tokio::test]
    async fn test_run_concurrent_matches_sequential() -> Result<()> {
        let (dir, paths) = write_images("concurrent", &IMAGES);

        let sequential = pipeline(1, true).run(paths.clone()).await?;
        let concurrent = pipeline(4, true).run(paths.clone()).await?;
        let again = pipeline(4, true).run(paths).await?;

        assert_eq!(sequential, concurrent);
        assert_eq!(concurrent, again);

        fs::remove_dir_all(&dir).unwrap();
        Ok(())
    }

    #[tokio::test]
    async fn test_run_untagged_prediction() -> Result<()> {
        let (dir, paths) = write_images("untagged", &[("misc/ball.png", 70)]);

        let table = pipeline(1, true).run(paths).await?;

        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].catdog, None);

        fs::remove_dir_all(&dir).unwrap();
        Ok(())
    }

    #[tokio::test]
    async fn test_run_fail_fast() {
        let (dir, mut paths) = write_images("fail_fast", &IMAGES[..2]);
        let broken = dir.join("cats/broken.png");
        fs::write(&broken, b"not a png").unwrap();
        paths.push(broken);

        let result = pipeline(2, true).run(paths).await;

        assert!(matches!(result, Err(PredictionError::ImageDecode { .. })));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_run_skips_failures_when_lenient() -> Result<()> {
        let (dir, mut paths) = write_images("lenient", &IMAGES[..2]);
        paths.insert(1, dir.join("cats/missing.png"));

        let table = pipeline(2, false).run(paths).await?;

        let indices: Vec<usize> = table.rows().iter().map(|row| row.index).collect();
        assert_eq!(indices, vec![2, 0]);

        fs::remove_dir_all(&dir).unwrap();
        Ok(())
    }

    #[test]
    fn test_render_formats() -> Result<()> {
        let table = ResultTable::default();

        assert!(render(&table, OutputFormat::Table)?.contains("catdog"));
        assert_eq!(render(&table, OutputFormat::Json)?, "[]");
        Ok(())
    }
}
