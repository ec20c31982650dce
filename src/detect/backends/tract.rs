#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectionQuery, DetectorBackend};
use crate::detect::labels::{load_labels, ClassLabels};
use crate::detect::nms::filter_and_suppress;
use crate::detect::result::{BoundingBox, Detection, DetectionSet};

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// The model takes a `[1, 3, size, size]` RGB tensor scaled to 0..1 and emits
/// `[1, 4 + classes, anchors]` rows of `(cx, cy, w, h, class scores...)` in
/// model-input pixels.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    labels: ClassLabels,
    input_size: u32,
    class_index: Option<usize>,
}

impl TractBackend {
    /// Load an ONNX model and its class labels from disk.
    pub fn new<P: AsRef<Path>, L: AsRef<Path>>(
        model_path: P,
        labels_path: L,
        input_size: u32,
    ) -> Result<Self> {
        let labels = load_labels(labels_path.as_ref())?;
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "tract backend loaded {} ({} classes, input {}x{})",
            model_path.display(),
            labels.len(),
            input_size,
            input_size
        );

        Ok(Self {
            model,
            labels,
            input_size,
            class_index: None,
        })
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let size = self.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
        let size = size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        input.into_tensor()
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        class_index: usize,
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected model output shape {:?}", shape));
        }
        let rows = shape[1];
        let anchors = shape[2];
        if rows != 4 + self.labels.len() {
            return Err(anyhow!(
                "model output has {} rows but the label list implies {}",
                rows,
                4 + self.labels.len()
            ));
        }

        let scale_x = width as f32 / self.input_size as f32;
        let scale_y = height as f32 / self.input_size as f32;
        let max_x = width as f32;
        let max_y = height as f32;

        let mut candidates = Vec::new();
        for i in 0..anchors {
            let score = view[[0, 4 + class_index, i]];
            if !score.is_finite() || score <= 0.0 {
                continue;
            }
            let cx = view[[0, 0, i]] * scale_x;
            let cy = view[[0, 1, i]] * scale_y;
            let w = view[[0, 2, i]] * scale_x;
            let h = view[[0, 3, i]] * scale_y;
            if !(w > 0.0 && h > 0.0) {
                continue;
            }
            let bbox = BoundingBox::new(
                (cx - w / 2.0).clamp(0.0, max_x),
                (cy - h / 2.0).clamp(0.0, max_y),
                (cx + w / 2.0).clamp(0.0, max_x),
                (cy + h / 2.0).clamp(0.0, max_y),
            );
            candidates.push(Detection::from_box(score.min(1.0), bbox));
        }
        Ok(candidates)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn prepare(&mut self, query: &DetectionQuery) -> Result<()> {
        self.class_index = Some(self.labels.index_of(&query.target_class)?);
        Ok(())
    }

    fn detect(&mut self, image: &RgbImage, query: &DetectionQuery) -> Result<DetectionSet> {
        let class_index = match self.class_index {
            Some(index) => index,
            None => self.labels.index_of(&query.target_class)?,
        };
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let candidates = self.decode(outputs, class_index, image.width(), image.height())?;
        Ok(filter_and_suppress(
            candidates,
            query.min_confidence,
            query.nms_threshold,
        ))
    }
}
