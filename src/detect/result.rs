use anyhow::Result;
use serde::Serialize;

/// Axis-aligned bounding box in pixel coordinates of the processed frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y_max - self.y_min).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Centroid {
        Centroid {
            x: (self.x_min + self.x_max) / 2.0,
            y: (self.y_min + self.y_max) / 2.0,
        }
    }

    pub fn contains(&self, point: Centroid) -> bool {
        point.x >= self.x_min
            && point.x <= self.x_max
            && point.y >= self.y_min
            && point.y <= self.y_max
    }

    /// Intersection over union with another box. Zero when the union is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x_min.max(other.x_min);
        let y1 = self.y_min.max(other.y_min);
        let x2 = self.x_max.min(other.x_max);
        let y2 = self.y_max.min(other.y_max);

        let intersection = if x2 > x1 && y2 > y1 {
            (x2 - x1) * (y2 - y1)
        } else {
            0.0
        };
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    fn is_finite(&self) -> bool {
        self.x_min.is_finite()
            && self.y_min.is_finite()
            && self.x_max.is_finite()
            && self.y_max.is_finite()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Centroid {
    pub x: f32,
    pub y: f32,
}

impl Centroid {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Centroid) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        dx.hypot(dy)
    }
}

/// One instance of the target class found in a frame. Read-only once built.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    confidence: f32,
    bbox: BoundingBox,
    centroid: Centroid,
}

impl Detection {
    /// Detection with an adapter-supplied centroid. Consistency with the box
    /// is checked by `DetectionSet::validate`, not here.
    pub fn new(confidence: f32, bbox: BoundingBox, centroid: Centroid) -> Self {
        Self {
            confidence,
            bbox,
            centroid,
        }
    }

    /// Detection whose centroid is the center of its box.
    pub fn from_box(confidence: f32, bbox: BoundingBox) -> Self {
        Self::new(confidence, bbox, bbox.center())
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn centroid(&self) -> Centroid {
        self.centroid
    }
}

/// Ordered detections for one frame. The position of a detection is its index
/// in the frame's violation set.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DetectionSet {
    detections: Vec<Detection>,
}

impl DetectionSet {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Detection> {
        self.detections.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    pub fn centroids(&self) -> Vec<Centroid> {
        self.detections.iter().map(|d| d.centroid).collect()
    }

    /// Check the adapter contract for a frame of the given size.
    ///
    /// Coordinates must be finite, boxes well-ordered, confidences in [0, 1]
    /// and every centroid inside its box. Boxes may touch the frame edge but
    /// a box lying entirely outside the frame is rejected.
    pub fn validate(&self, width: u32, height: u32) -> Result<()> {
        for (index, det) in self.detections.iter().enumerate() {
            let finite =
                det.bbox.is_finite() && det.centroid.x.is_finite() && det.centroid.y.is_finite();
            let reason = if !finite {
                Some("non-finite coordinates")
            } else if !(0.0..=1.0).contains(&det.confidence) {
                Some("confidence outside [0, 1]")
            } else if det.bbox.x_min > det.bbox.x_max || det.bbox.y_min > det.bbox.y_max {
                Some("inverted bounding box")
            } else if !det.bbox.contains(det.centroid) {
                Some("centroid outside bounding box")
            } else if det.bbox.x_min > width as f32
                || det.bbox.y_min > height as f32
                || det.bbox.x_max < 0.0
                || det.bbox.y_max < 0.0
            {
                Some("bounding box outside frame")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(ContractViolation {
                    index,
                    reason: reason.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

impl From<Vec<Detection>> for DetectionSet {
    fn from(detections: Vec<Detection>) -> Self {
        Self::new(detections)
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.iter()
    }
}

/// A detector returned data that breaks the detection contract.
#[derive(Debug)]
pub struct ContractViolation {
    pub index: usize,
    pub reason: String,
}

impl std::fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DETECTOR_CONTRACT_VIOLATION: detection {}: {}",
            self.index, self.reason
        )
    }
}

impl std::error::Error for ContractViolation {}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Detection {
        Detection::from_box(0.9, BoundingBox::new(x_min, y_min, x_max, y_max))
    }

    #[test]
    fn centroid_is_box_center() {
        let d = det(10.0, 20.0, 30.0, 60.0);
        assert_eq!(d.centroid(), Centroid::new(20.0, 40.0));
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((b.iou(&b) - 1.0).abs() < 1e-6);
        let far = BoundingBox::new(50.0, 50.0, 60.0, 60.0);
        assert_eq!(b.iou(&far), 0.0);
    }

    #[test]
    fn validate_accepts_well_formed_set() {
        let set = DetectionSet::new(vec![
            det(0.0, 0.0, 10.0, 10.0),
            det(0.0, 0.0, 10.0, 10.0),
        ]);
        assert!(set.validate(100, 100).is_ok());
    }

    #[test]
    fn validate_reports_centroid_outside_box() {
        let bad = Detection::new(
            0.9,
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            Centroid::new(50.0, 5.0),
        );
        let set = DetectionSet::new(vec![det(0.0, 0.0, 10.0, 10.0), bad]);

        let err = set.validate(100, 100).unwrap_err();
        let violation = err.downcast_ref::<ContractViolation>().expect("typed error");
        assert_eq!(violation.index, 1);
        assert!(violation.reason.contains("centroid"));
    }

    #[test]
    fn validate_rejects_confidence_out_of_range() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let bad = Detection::new(1.5, bbox, bbox.center());
        let set = DetectionSet::new(vec![bad]);
        assert!(set.validate(100, 100).is_err());
    }
}
