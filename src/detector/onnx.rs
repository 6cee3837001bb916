//! YOLOv8 detection backend on ONNX Runtime.

use crate::detector::adapter::{DetectorBackend, RawDetection};
use crate::error::DetectorError;
use image::RgbImage;
use ndarray::Array;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use std::path::Path;
use tracing::{debug, info};

/// Candidates below this score are dropped before leaving the backend.
/// Stays well under the adapter's hard confidence floor.
const PREFILTER_SCORE: f32 = 0.25;

const NUM_CLASSES: usize = 80;

/// YOLOv8 ONNX backend. Decodes the `[1, 84, 8400]` output head into raw
/// candidates in letterboxed input coordinates.
pub struct OnnxBackend {
    session: Session,
    input_size: u32,
}

impl OnnxBackend {
    /// Load a YOLOv8 model from disk.
    pub fn load<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self, DetectorError> {
        let path = model_path.as_ref();
        let model_bytes = std::fs::read(path).map_err(|e| DetectorError::ModelLoad {
            path: path.display().to_string(),
            details: e.to_string(),
        })?;

        let session = Session::builder()
            .map_err(|e| DetectorError::ModelLoad {
                path: path.display().to_string(),
                details: e.to_string(),
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| DetectorError::ModelLoad {
                path: path.display().to_string(),
                details: e.to_string(),
            })?
            .commit_from_memory(&model_bytes)
            .map_err(|e| DetectorError::ModelLoad {
                path: path.display().to_string(),
                details: e.to_string(),
            })?;

        info!(
            "Detection model loaded from {} (input {}x{})",
            path.display(),
            input_size,
            input_size
        );

        Ok(Self {
            session,
            input_size,
        })
    }

    /// HWC image to normalized NCHW tensor.
    fn preprocess(&self, input: &RgbImage) -> Result<Value, DetectorError> {
        let (w, h) = (self.input_size as usize, self.input_size as usize);

        let mut chw_data: Vec<f32> = Vec::with_capacity(3 * h * w);
        for c in 0..3 {
            for y in 0..h {
                for x in 0..w {
                    let pixel = input.get_pixel(x as u32, y as u32);
                    chw_data.push(pixel[c] as f32 / 255.0);
                }
            }
        }

        let shape = vec![1usize, 3, h, w];
        Tensor::from_array((shape, chw_data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| DetectorError::Inference {
                details: format!("failed to create input tensor: {}", e),
            })
    }
}

impl DetectorBackend for OnnxBackend {
    fn infer(&mut self, input: &RgbImage) -> Result<Vec<RawDetection>, DetectorError> {
        if input.width() != self.input_size || input.height() != self.input_size {
            return Err(DetectorError::Inference {
                details: format!(
                    "expected {}x{} input, got {}x{}",
                    self.input_size,
                    self.input_size,
                    input.width(),
                    input.height()
                ),
            });
        }

        let tensor = self.preprocess(input)?;

        let outputs =
            self.session
                .run(ort::inputs![tensor])
                .map_err(|e| DetectorError::Inference {
                    details: e.to_string(),
                })?;

        let output = outputs
            .get("output0")
            .ok_or_else(|| DetectorError::OutputShape {
                details: "missing output0 tensor".to_string(),
            })?;

        let (_, data) =
            output
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::OutputShape {
                    details: format!("failed to extract tensor: {}", e),
                })?;
        let values: Vec<f32> = data.to_vec();

        let num_features = 4 + NUM_CLASSES;
        if values.len() % num_features != 0 {
            return Err(DetectorError::OutputShape {
                details: format!(
                    "output length {} is not a multiple of {}",
                    values.len(),
                    num_features
                ),
            });
        }
        let num_boxes = values.len() / num_features;

        // Output is [84, 8400]; transpose to walk candidates row-wise
        let output_array = Array::from_shape_vec((num_features, num_boxes), values).map_err(
            |e| DetectorError::OutputShape {
                details: e.to_string(),
            },
        )?;
        let transposed = output_array.t();

        let mut candidates = Vec::new();
        for i in 0..num_boxes {
            let mut best_class = 0usize;
            let mut best_score = 0.0f32;
            for c in 0..NUM_CLASSES {
                let score = transposed[[i, 4 + c]];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }

            if best_score < PREFILTER_SCORE {
                continue;
            }

            candidates.push(RawDetection {
                class_id: best_class,
                score: best_score,
                cx: transposed[[i, 0]],
                cy: transposed[[i, 1]],
                w: transposed[[i, 2]],
                h: transposed[[i, 3]],
            });
        }

        debug!(
            "Model produced {} candidates above {}",
            candidates.len(),
            PREFILTER_SCORE
        );

        Ok(candidates)
    }
}
