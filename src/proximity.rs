//! Pairwise proximity analysis.
//!
//! A violation is an unordered pair of detections whose centroids are strictly
//! closer than the configured minimum distance. The analysis is a pure
//! function of one frame's centroids: no state crosses frame boundaries.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::detect::Centroid;

/// Indices of the detections that take part in at least one violation.
///
/// Only the analyzer builds these; callers get read access.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ViolationSet {
    indices: BTreeSet<usize>,
}

impl ViolationSet {
    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    /// Number of implicated detections (not the number of pairs).
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }

    /// Union of the members of `pairs`.
    pub(crate) fn from_pairs(pairs: &[(usize, usize)]) -> Self {
        let indices = pairs.iter().flat_map(|&(i, j)| [i, j]).collect();
        Self { indices }
    }
}

/// Every unordered pair `(i, j)`, `i < j`, closer than `min_distance`.
///
/// Walks the strict upper triangle of the distance matrix, so each pair is
/// measured once. Pairs come out in row-major order.
pub fn violating_pairs(centroids: &[Centroid], min_distance: f32) -> Vec<(usize, usize)> {
    let threshold = f64::from(min_distance);
    let mut pairs = Vec::new();
    for (i, a) in centroids.iter().enumerate() {
        for (offset, b) in centroids[i + 1..].iter().enumerate() {
            if a.distance(b) < threshold {
                pairs.push((i, i + 1 + offset));
            }
        }
    }
    pairs
}

/// Indices of all centroids involved in at least one too-close pair.
///
/// Empty when fewer than two centroids are given. Both members of a
/// violating pair are always added together.
pub fn analyze(centroids: &[Centroid], min_distance: f32) -> ViolationSet {
    if centroids.len() < 2 {
        return ViolationSet::default();
    }
    ViolationSet::from_pairs(&violating_pairs(centroids, min_distance))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(points: &[(f32, f32)]) -> Vec<Centroid> {
        points.iter().map(|&(x, y)| Centroid::new(x, y)).collect()
    }

    #[test]
    fn fewer_than_two_centroids_never_violate() {
        assert!(analyze(&[], 50.0).is_empty());
        assert!(analyze(&pts(&[(0.0, 0.0)]), 50.0).is_empty());
        assert!(analyze(&pts(&[(0.0, 0.0)]), 1e9).is_empty());
    }

    #[test]
    fn close_pair_is_flagged() {
        let set = analyze(&pts(&[(0.0, 0.0), (10.0, 0.0)]), 50.0);
        assert_eq!(set.to_vec(), vec![0, 1]);
    }

    #[test]
    fn distant_pair_is_clear() {
        let set = analyze(&pts(&[(0.0, 0.0), (100.0, 0.0)]), 50.0);
        assert!(set.is_empty());
    }

    #[test]
    fn unrelated_detection_is_excluded() {
        let set = analyze(&pts(&[(0.0, 0.0), (10.0, 0.0), (200.0, 200.0)]), 50.0);
        assert_eq!(set.to_vec(), vec![0, 1]);
        assert!(!set.contains(2));
    }

    #[test]
    fn chained_violations_count_detections_not_pairs() {
        let centroids = pts(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]);
        let set = analyze(&centroids, 50.0);
        assert_eq!(set.to_vec(), vec![0, 1, 2]);
        assert_eq!(set.len(), 3);
        assert_eq!(violating_pairs(&centroids, 50.0), vec![(0, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn chain_with_far_ends_flags_every_link() {
        // 0-1 and 1-2 are close, 0-2 are not: 3 detections, 2 pairs.
        let centroids = pts(&[(0.0, 0.0), (40.0, 0.0), (80.0, 0.0)]);
        assert_eq!(analyze(&centroids, 50.0).len(), 3);
        assert_eq!(violating_pairs(&centroids, 50.0).len(), 2);
    }

    #[test]
    fn set_is_union_of_pair_members() {
        let centroids = pts(&[(0.0, 0.0), (40.0, 0.0), (80.0, 0.0), (400.0, 0.0)]);
        let pairs = violating_pairs(&centroids, 50.0);
        assert_eq!(pairs, vec![(0, 1), (1, 2)]);
        assert_eq!(ViolationSet::from_pairs(&pairs), analyze(&centroids, 50.0));
    }

    #[test]
    fn distance_equal_to_threshold_is_not_a_violation() {
        let set = analyze(&pts(&[(0.0, 0.0), (30.0, 40.0)]), 50.0);
        assert!(set.is_empty());
    }

    #[test]
    fn relabeling_preserves_membership() {
        let a = (3.0, 4.0);
        let b = (20.0, 9.0);
        assert_eq!(analyze(&pts(&[a, b]), 50.0).to_vec(), vec![0, 1]);
        assert_eq!(analyze(&pts(&[b, a]), 50.0).to_vec(), vec![0, 1]);
    }

    #[test]
    fn analysis_is_idempotent() {
        let centroids = pts(&[(0.0, 0.0), (49.0, 0.0), (300.0, 0.0), (320.0, 10.0)]);
        let first = analyze(&centroids, 50.0);
        let second = analyze(&centroids, 50.0);
        assert_eq!(first, second);
        assert_eq!(first.to_vec(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn duplicate_centroids_violate() {
        let set = analyze(&pts(&[(5.0, 5.0), (5.0, 5.0)]), 1.0);
        assert_eq!(set.to_vec(), vec![0, 1]);
    }

    #[test]
    fn matches_brute_force_over_a_grid() {
        let mut points = Vec::new();
        for i in 0..6 {
            for j in 0..4 {
                points.push((i as f32 * 37.0, j as f32 * 61.0 + (i % 2) as f32 * 13.0));
            }
        }
        let centroids = pts(&points);
        let set = analyze(&centroids, 45.0);

        for (i, a) in centroids.iter().enumerate() {
            let implicated = centroids
                .iter()
                .enumerate()
                .any(|(j, b)| i != j && a.distance(b) < 45.0);
            assert_eq!(set.contains(i), implicated, "index {}", i);
        }
    }
}
