use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use serde::Serialize;

use crate::config::AnnotationSettings;
use crate::detect::{BoundingBox, Centroid, DetectionSet};
use crate::proximity::ViolationSet;

pub const SAFE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const VIOLATION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const BOX_THICKNESS: i32 = 2;
const CENTROID_RADIUS: i32 = 5;
const TEXT_SCALE: f32 = 24.0;
const TEXT_LEFT: i32 = 10;
const TEXT_BASELINE_FROM_BOTTOM: i32 = 25;

/// Counter font used when no `annotation.font_path` is configured.
const BUNDLED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

/// What was drawn for one detection.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MarkedDetection {
    pub index: usize,
    pub bbox: BoundingBox,
    pub centroid: Centroid,
    pub in_violation: bool,
}

/// Record of one frame's annotation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Annotation {
    pub marks: Vec<MarkedDetection>,
    /// Detections in the violation set (not violating pairs).
    pub violation_count: usize,
    pub counter_text: String,
    /// False only for an `Annotator` built without a font.
    pub counter_drawn: bool,
}

pub fn counter_text(violation_count: usize) -> String {
    format!("Social Distancing Violations: {}", violation_count)
}

/// Draws detection boxes, centroid markers and the violation counter.
pub struct Annotator {
    font: Option<FontArc>,
}

impl Annotator {
    /// Annotator with an optional counter font. Without one, boxes and
    /// centroids are drawn but the counter only lands in the `Annotation`.
    pub fn new(font: Option<FontArc>) -> Self {
        Self { font }
    }

    /// Annotator drawing the counter with the bundled DejaVu Sans.
    pub fn bundled() -> Result<Self> {
        let font = FontArc::try_from_slice(BUNDLED_FONT)
            .map_err(|e| anyhow!("bundled counter font is invalid: {}", e))?;
        Ok(Self::new(Some(font)))
    }

    /// Use the font named in the settings, or the bundled one.
    pub fn from_settings(settings: &AnnotationSettings) -> Result<Self> {
        let Some(path) = &settings.font_path else {
            return Self::bundled();
        };
        let data =
            std::fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontArc::try_from_vec(data)
            .map_err(|e| anyhow!("invalid font {}: {}", path.display(), e))?;
        log::debug!("counter font loaded from {}", path.display());
        Ok(Self::new(Some(font)))
    }

    /// Draw onto `image`. Detection and violation data are only read.
    pub fn annotate(
        &self,
        image: &mut RgbImage,
        detections: &DetectionSet,
        violations: &ViolationSet,
    ) -> Annotation {
        let mut marks = Vec::with_capacity(detections.len());
        for (index, det) in detections.iter().enumerate() {
            let in_violation = violations.contains(index);
            let color = if in_violation {
                VIOLATION_COLOR
            } else {
                SAFE_COLOR
            };
            let (bbox, centroid) = (det.bbox(), det.centroid());
            draw_box(image, &bbox, color);
            let center = (centroid.x.round() as i32, centroid.y.round() as i32);
            draw_hollow_circle_mut(image, center, CENTROID_RADIUS, color);
            marks.push(MarkedDetection {
                index,
                bbox,
                centroid,
                in_violation,
            });
        }

        let violation_count = violations.len();
        let text = counter_text(violation_count);
        let counter_drawn = match &self.font {
            Some(font) => {
                let top = image.height() as i32 - TEXT_BASELINE_FROM_BOTTOM - TEXT_SCALE as i32;
                draw_text_mut(
                    image,
                    VIOLATION_COLOR,
                    TEXT_LEFT,
                    top.max(0),
                    PxScale::from(TEXT_SCALE),
                    font,
                    &text,
                );
                true
            }
            None => false,
        };

        Annotation {
            marks,
            violation_count,
            counter_text: text,
            counter_drawn,
        }
    }
}

fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let x = bbox.x_min.round() as i32;
    let y = bbox.y_min.round() as i32;
    let w = bbox.width().round() as i32;
    let h = bbox.height().round() as i32;
    for inset in 0..BOX_THICKNESS {
        let inner_w = w - 2 * inset;
        let inner_h = h - 2 * inset;
        if inner_w < 1 || inner_h < 1 {
            break;
        }
        let rect = Rect::at(x + inset, y + inset).of_size(inner_w as u32, inner_h as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;
    use crate::proximity::analyze;

    fn det(x: f32, y: f32) -> Detection {
        Detection::from_box(0.9, BoundingBox::new(x, y, x + 20.0, y + 40.0))
    }

    fn run(detections: &DetectionSet) -> (RgbImage, Annotation) {
        let violations = analyze(&detections.centroids(), 50.0);
        // Tall enough that the counter band stays below every test box.
        let mut image = RgbImage::new(200, 300);
        let annotation = Annotator::bundled()
            .expect("bundled font")
            .annotate(&mut image, detections, &violations);
        (image, annotation)
    }

    #[test]
    fn colors_follow_violation_membership() {
        let detections =
            DetectionSet::new(vec![det(10.0, 10.0), det(20.0, 10.0), det(150.0, 150.0)]);
        let (image, annotation) = run(&detections);

        // Top-left corner of each box carries its color.
        assert_eq!(*image.get_pixel(10, 10), VIOLATION_COLOR);
        assert_eq!(*image.get_pixel(150, 150), SAFE_COLOR);
        let flags: Vec<bool> = annotation.marks.iter().map(|m| m.in_violation).collect();
        assert_eq!(flags, vec![true, true, false]);
    }

    #[test]
    fn box_is_two_pixels_thick() {
        let detections = DetectionSet::new(vec![det(100.0, 100.0)]);
        let (image, _) = run(&detections);
        assert_eq!(*image.get_pixel(105, 100), SAFE_COLOR);
        assert_eq!(*image.get_pixel(105, 101), SAFE_COLOR);
        assert_eq!(*image.get_pixel(105, 102), Rgb([0, 0, 0]));
    }

    #[test]
    fn counter_counts_detections_not_pairs() {
        let detections = DetectionSet::new(vec![det(0.0, 0.0), det(10.0, 0.0), det(20.0, 0.0)]);
        let (_, annotation) = run(&detections);
        assert_eq!(annotation.violation_count, 3);
        assert_eq!(annotation.counter_text, "Social Distancing Violations: 3");
        assert!(annotation.counter_drawn);
    }

    #[test]
    fn default_settings_draw_counter_near_bottom_left() -> Result<()> {
        let annotator = Annotator::from_settings(&AnnotationSettings::default())?;
        let detections = DetectionSet::new(vec![det(100.0, 20.0), det(110.0, 20.0)]);
        let violations = analyze(&detections.centroids(), 50.0);
        let mut image = RgbImage::new(700, 400);
        let annotation = annotator.annotate(&mut image, &detections, &violations);

        assert!(annotation.counter_drawn);
        let band_top = 400 - TEXT_BASELINE_FROM_BOTTOM as u32 - TEXT_SCALE as u32;
        let red_in_band = (band_top..400 - TEXT_BASELINE_FROM_BOTTOM as u32)
            .flat_map(|y| (0..400).map(move |x| (x, y)))
            .filter(|&(x, y)| {
                let p = image.get_pixel(x, y);
                p[0] > 200 && p[1] == 0 && p[2] == 0
            })
            .count();
        assert!(red_in_band > 0, "counter text not rasterized");
        Ok(())
    }

    #[test]
    fn fontless_annotator_skips_counter_text() {
        let detections = DetectionSet::new(vec![det(0.0, 0.0), det(10.0, 0.0)]);
        let violations = analyze(&detections.centroids(), 50.0);
        let mut image = RgbImage::new(200, 200);
        let annotation = Annotator::new(None).annotate(&mut image, &detections, &violations);
        assert!(!annotation.counter_drawn);
        assert_eq!(annotation.counter_text, "Social Distancing Violations: 2");
    }

    #[test]
    fn annotation_leaves_inputs_untouched() {
        let detections = DetectionSet::new(vec![det(0.0, 0.0), det(10.0, 0.0)]);
        let violations = analyze(&detections.centroids(), 50.0);
        let before = (detections.clone(), violations.clone());
        let mut image = RgbImage::new(64, 64);
        Annotator::new(None).annotate(&mut image, &detections, &violations);
        assert_eq!((detections, violations), before);
    }

    #[test]
    fn empty_frame_reports_zero() {
        let (image, annotation) = run(&DetectionSet::default());
        assert!(annotation.marks.is_empty());
        assert_eq!(annotation.violation_count, 0);
        assert_eq!(annotation.counter_text, "Social Distancing Violations: 0");
        let band_top = image.height() - TEXT_BASELINE_FROM_BOTTOM as u32 - TEXT_SCALE as u32;
        assert!(image
            .enumerate_pixels()
            .filter(|(_, y, _)| *y < band_top)
            .all(|(_, _, p)| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn missing_font_file_is_an_error() {
        let settings = AnnotationSettings {
            font_path: Some("/nonexistent/font.ttf".into()),
        };
        assert!(Annotator::from_settings(&settings).is_err());
    }
}
