//! Frames as they move through the pipeline.
//!
//! - `Frame`: RGB pixels plus the frame's position in the stream.
//! - `ProcessedFrame`: an annotated frame with the data it was annotated from.
//!
//! The stream loop owns a `Frame` while processing it. Once wrapped in a
//! `ProcessedFrame` and yielded, it belongs to the consumer.

use image::imageops::FilterType;
use image::RgbImage;

use crate::annotate::Annotation;
use crate::detect::DetectionSet;
use crate::proximity::ViolationSet;

/// One frame of the stream in processing coordinates.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    /// 0-based position in the stream.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub(crate) fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// Resize to `width`, keeping the aspect ratio. Frames already at `width`
/// are returned untouched.
pub fn resize_to_width(image: RgbImage, width: u32) -> RgbImage {
    if image.width() == width || image.width() == 0 || width == 0 {
        return image;
    }
    let ratio = width as f64 / image.width() as f64;
    let height = ((image.height() as f64 * ratio).round() as u32).max(1);
    image::imageops::resize(&image, width, height, FilterType::Triangle)
}

/// Result of running one frame through detection, analysis and annotation.
#[derive(Clone, Debug)]
pub struct ProcessedFrame {
    pub frame: Frame,
    pub detections: DetectionSet,
    /// Too-close pairs `(i, j)`, `i < j`, in row-major order.
    pub violating_pairs: Vec<(usize, usize)>,
    /// Union of the members of `violating_pairs`.
    pub violations: ViolationSet,
    pub annotation: Annotation,
}

impl ProcessedFrame {
    pub fn sequence(&self) -> u64 {
        self.frame.sequence()
    }

    /// Detections implicated in at least one violation.
    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }
}
