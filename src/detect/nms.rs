use std::cmp::Ordering;

use crate::detect::result::{Detection, DetectionSet};

/// Keep candidates scoring strictly above `min_confidence`, then greedily
/// suppress overlaps.
///
/// Candidates are visited in descending confidence order; a candidate is kept
/// when its IoU with every already-kept detection is at most `nms_threshold`.
/// The returned set is ordered by descending confidence.
pub fn filter_and_suppress(
    candidates: Vec<Detection>,
    min_confidence: f32,
    nms_threshold: f32,
) -> DetectionSet {
    let mut sorted: Vec<Detection> = candidates
        .into_iter()
        .filter(|det| det.confidence() > min_confidence)
        .collect();
    sorted.sort_by(|a, b| {
        b.confidence()
            .partial_cmp(&a.confidence())
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::with_capacity(sorted.len());
    for det in sorted {
        if keep
            .iter()
            .all(|kept| kept.bbox().iou(&det.bbox()) <= nms_threshold)
        {
            keep.push(det);
        }
    }
    DetectionSet::new(keep)
}
