use crate::config::{Interpolation, ModelConfig, Normalization, TensorLayout};
use crate::error::{PredictionError, Result};
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array, Ix4};
use std::path::Path;

// Per channel, in the channel order each mode feeds to the network.
const CAFFE_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];
const TORCH_MEAN_RGB: [f32; 3] = [0.485, 0.456, 0.406];
const TORCH_STD_RGB: [f32; 3] = [0.229, 0.224, 0.225];

impl From<Interpolation> for FilterType {
    fn from(interpolation: Interpolation) -> Self {
        match interpolation {
            Interpolation::Nearest => FilterType::Nearest,
            Interpolation::Bilinear => FilterType::Triangle,
            Interpolation::CatmullRom => FilterType::CatmullRom,
        }
    }
}

/// Turns image files into the batch-of-one tensor the classifier expects.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    input_size: u32,
    normalization: Normalization,
    layout: TensorLayout,
    filter: FilterType,
}

impl ImagePreprocessor {
    pub fn new(model_config: &ModelConfig) -> Self {
        Self {
            input_size: model_config.input_size,
            normalization: model_config.normalization,
            layout: model_config.layout,
            filter: model_config.interpolation.into(),
        }
    }

    pub fn load(&self, path: &Path) -> Result<Array<f32, Ix4>> {
        let to_error = |source| PredictionError::ImageDecode {
            path: path.to_path_buf(),
            source,
        };
        let image = image::ImageReader::open(path)
            .map_err(|e| to_error(image::ImageError::IoError(e)))?
            .with_guessed_format()
            .map_err(|e| to_error(image::ImageError::IoError(e)))?
            .decode()
            .map_err(to_error)?;

        Ok(self.transform(&image))
    }

    pub fn transform(&self, image: &DynamicImage) -> Array<f32, Ix4> {
        let size = self.input_size;
        let img = image.resize_exact(size, size, self.filter).to_rgb8();

        let side = size as usize;
        let mut input: Array<f32, Ix4> = match self.layout {
            TensorLayout::Nchw => Array::zeros((1, 3, side, side)),
            TensorLayout::Nhwc => Array::zeros((1, side, side, 3)),
        };

        for (x, y, pixel) in img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            let values = self.normalize(pixel.0);
            for (channel, value) in values.into_iter().enumerate() {
                match self.layout {
                    TensorLayout::Nchw => input[[0, channel, y, x]] = value,
                    TensorLayout::Nhwc => input[[0, y, x, channel]] = value,
                }
            }
        }

        input
    }

    fn normalize(&self, [r, g, b]: [u8; 3]) -> [f32; 3] {
        match self.normalization {
            Normalization::Caffe => {
                let bgr = [b as f32, g as f32, r as f32];
                [
                    bgr[0] - CAFFE_MEAN_BGR[0],
                    bgr[1] - CAFFE_MEAN_BGR[1],
                    bgr[2] - CAFFE_MEAN_BGR[2],
                ]
            }
            Normalization::Torch => {
                let rgb = [r as f32 / 255., g as f32 / 255., b as f32 / 255.];
                [
                    (rgb[0] - TORCH_MEAN_RGB[0]) / TORCH_STD_RGB[0],
                    (rgb[1] - TORCH_MEAN_RGB[1]) / TORCH_STD_RGB[1],
                    (rgb[2] - TORCH_MEAN_RGB[2]) / TORCH_STD_RGB[2],
                ]
            }
        }
    }
}
