use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::{DetectionQuery, DetectorBackend};
use crate::detect::labels::ClassLabels;
use crate::detect::nms::filter_and_suppress;
use crate::detect::result::{BoundingBox, Detection, DetectionSet};

enum Script {
    /// Raw candidates per frame, in call order.
    Frames { frames: Vec<Vec<Detection>>, repeat: bool },
    /// Figures walking across the frame, positioned relative to its size.
    Walkers,
}

/// Stub backend for testing and synthetic runs. Plays back scripted
/// candidates and applies confidence filtering and NMS like a model would.
pub struct StubBackend {
    labels: ClassLabels,
    script: Script,
    calls: usize,
}

impl StubBackend {
    /// Three figures: two approach each other along a line, one stays apart.
    pub fn walkers() -> Self {
        Self::with_script(Script::Walkers)
    }

    /// Play back `frames` once; later calls return no detections.
    pub fn scripted(frames: Vec<Vec<Detection>>) -> Self {
        Self::with_script(Script::Frames {
            frames,
            repeat: false,
        })
    }

    /// Play back `frames` in a loop.
    pub fn cycling(frames: Vec<Vec<Detection>>) -> Self {
        Self::with_script(Script::Frames {
            frames,
            repeat: true,
        })
    }

    /// Replace the default single `person` label list.
    pub fn with_labels(mut self, labels: ClassLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Number of `detect` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls
    }

    fn with_script(script: Script) -> Self {
        Self {
            labels: ClassLabels::single("person"),
            script,
            calls: 0,
        }
    }

    fn candidates(&self, call: usize, width: u32, height: u32) -> Vec<Detection> {
        match &self.script {
            Script::Frames { frames, repeat } => {
                if frames.is_empty() {
                    return Vec::new();
                }
                let index = if *repeat { call % frames.len() } else { call };
                frames.get(index).cloned().unwrap_or_default()
            }
            Script::Walkers => walker_candidates(call, width, height),
        }
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn prepare(&mut self, query: &DetectionQuery) -> Result<()> {
        self.labels.index_of(&query.target_class)?;
        Ok(())
    }

    fn detect(&mut self, image: &RgbImage, query: &DetectionQuery) -> Result<DetectionSet> {
        let candidates = self.candidates(self.calls, image.width(), image.height());
        self.calls += 1;
        Ok(filter_and_suppress(
            candidates,
            query.min_confidence,
            query.nms_threshold,
        ))
    }
}

fn walker_candidates(call: usize, width: u32, height: u32) -> Vec<Detection> {
    let w = width as f32;
    let h = height as f32;
    let box_w = w * 0.06;
    let box_h = h * 0.3;
    let top = h * 0.4;

    // Phase runs 0..1 over 100 frames, then repeats.
    let phase = (call % 100) as f32 / 100.0;
    let left_x = w * (0.1 + 0.35 * phase);
    let right_x = w * (0.85 - 0.35 * phase);
    let loner_x = w * 0.5;

    [
        (0.91, left_x, top),
        (0.88, right_x, top),
        (0.75, loner_x, h * 0.05),
    ]
    .into_iter()
    .map(|(confidence, x, y)| {
        let x_min = x.clamp(0.0, w - box_w);
        let y_min = y.clamp(0.0, h - box_h);
        Detection::from_box(
            confidence,
            BoundingBox::new(x_min, y_min, x_min + box_w, y_min + box_h),
        )
    })
    .collect()
}
