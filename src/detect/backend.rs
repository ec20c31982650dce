use anyhow::Result;
use image::RgbImage;

use crate::config::PipelineConfig;
use crate::detect::result::DetectionSet;

/// What a detector is asked to report for each frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionQuery {
    pub target_class: String,
    pub min_confidence: f32,
    pub nms_threshold: f32,
}

impl DetectionQuery {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            target_class: config.target_class.clone(),
            min_confidence: config.min_confidence,
            nms_threshold: config.nms_threshold,
        }
    }
}

/// Detector backend trait.
///
/// Backends own confidence filtering and non-maximum suppression: the pipeline
/// uses the returned set as-is. Coordinates are in the pixel space of the image
/// passed to `detect`.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Validate that the backend can serve `query` (e.g. the target class is
    /// in its label list). Called once before streaming starts.
    fn prepare(&mut self, _query: &DetectionQuery) -> Result<()> {
        Ok(())
    }

    /// Run detection on a frame, restricted to `query.target_class`.
    fn detect(&mut self, image: &RgbImage, query: &DetectionQuery) -> Result<DetectionSet>;
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn prepare(&mut self, query: &DetectionQuery) -> Result<()> {
        (**self).prepare(query)
    }

    fn detect(&mut self, image: &RgbImage, query: &DetectionQuery) -> Result<DetectionSet> {
        (**self).detect(image, query)
    }
}
