//! The per-frame stream loop.
//!
//! `StreamLoop` is a single-pass, pull-based iterator. Each call to `next`
//! runs one frame through acquire → resize → detect → analyze → annotate and
//! yields it. The loop moves through `Starting → Streaming → (Done |
//! Cancelled)`; once terminal it yields nothing more and cannot be restarted.
//! Processing the same source again takes a new loop.

use anyhow::{Context, Result};
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::annotate::Annotator;
use crate::config::PipelineConfig;
use crate::detect::{DetectionQuery, DetectorBackend};
use crate::frame::{resize_to_width, Frame, ProcessedFrame};
use crate::ingest::FrameSource;
use crate::proximity::{violating_pairs, ViolationSet};

/// Cooperative cancellation flag, shared between the loop and whoever may
/// ask it to stop (a signal handler, a UI thread).
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Source and detector are being opened (inside `StreamLoop::start`).
    Starting,
    Streaming,
    Done,
    Cancelled,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Done | StreamState::Cancelled)
    }
}

/// Why the loop stopped producing frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The source ran out of frames.
    Exhausted,
    /// Cancellation was requested.
    Cancelled,
}

/// One item of the stream.
#[derive(Debug)]
pub enum StreamEvent {
    /// A processed frame; more may follow.
    Frame(Box<ProcessedFrame>),
    /// The producer has terminated; nothing follows.
    End(Termination),
}

impl StreamEvent {
    /// The `continue` flag: true while frames keep coming.
    pub fn is_continue(&self) -> bool {
        matches!(self, StreamEvent::Frame(_))
    }

    pub fn into_frame(self) -> Option<ProcessedFrame> {
        match self {
            StreamEvent::Frame(frame) => Some(*frame),
            StreamEvent::End(_) => None,
        }
    }
}

/// Pull-based frame processing loop.
pub struct StreamLoop<S, D> {
    source: S,
    detector: D,
    annotator: Annotator,
    config: Arc<PipelineConfig>,
    query: DetectionQuery,
    cancel: CancelToken,
    state: StreamState,
    next_sequence: u64,
}

impl<S: FrameSource, D: DetectorBackend> StreamLoop<S, D> {
    /// Open the source and prepare the detector, then enter `Streaming`.
    ///
    /// Any failure here is fatal: there is no retry and no loop is returned.
    pub fn start(
        mut source: S,
        mut detector: D,
        annotator: Annotator,
        config: Arc<PipelineConfig>,
        cancel: CancelToken,
    ) -> Result<Self> {
        let query = DetectionQuery::from_config(&config);
        log::debug!("stream loop starting (detector={})", detector.name());
        source.connect().context("failed to open frame source")?;
        detector.prepare(&query).with_context(|| {
            format!(
                "detector '{}' cannot serve target class '{}'",
                detector.name(),
                query.target_class
            )
        })?;

        log::info!(
            "stream loop streaming: target={} min_distance={}px width={}",
            query.target_class,
            config.min_distance_px,
            config.processing_width
        );
        Ok(Self {
            source,
            detector,
            annotator,
            config,
            query,
            cancel,
            state: StreamState::Streaming,
            next_sequence: 0,
        })
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Frames yielded so far.
    pub fn frames_processed(&self) -> u64 {
        self.next_sequence
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn step(&mut self) -> Result<StreamEvent> {
        if self.cancel.is_cancelled() {
            self.state = StreamState::Cancelled;
            log::info!("stream cancelled after {} frames", self.next_sequence);
            return Ok(StreamEvent::End(Termination::Cancelled));
        }

        let Some(raw) = self.source.next_frame().context("failed to read frame")? else {
            self.state = StreamState::Done;
            log::info!("video stream has ended after {} frames", self.next_sequence);
            return Ok(StreamEvent::End(Termination::Exhausted));
        };

        let mut frame = Frame::new(
            resize_to_width(raw, self.config.processing_width),
            self.next_sequence,
        );

        let detections = self
            .detector
            .detect(frame.image(), &self.query)
            .with_context(|| format!("detection failed on frame {}", frame.sequence()))?;
        detections.validate(frame.width(), frame.height())?;

        let pairs = violating_pairs(&detections.centroids(), self.config.min_distance_px);
        let violations = ViolationSet::from_pairs(&pairs);
        let annotation = self
            .annotator
            .annotate(frame.image_mut(), &detections, &violations);

        log::debug!(
            "frame {}: {} detections, {} pairs too close, {} in violation",
            frame.sequence(),
            detections.len(),
            pairs.len(),
            violations.len()
        );

        self.next_sequence += 1;
        Ok(StreamEvent::Frame(Box::new(ProcessedFrame {
            frame,
            detections,
            violating_pairs: pairs,
            violations,
            annotation,
        })))
    }
}

impl<S: FrameSource, D: DetectorBackend> Iterator for StreamLoop<S, D> {
    type Item = Result<StreamEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            StreamState::Streaming => {}
            StreamState::Starting | StreamState::Done | StreamState::Cancelled => return None,
        }
        let item = self.step();
        if item.is_err() {
            self.state = StreamState::Done;
        }
        Some(item)
    }
}

impl<S: FrameSource, D: DetectorBackend> FusedIterator for StreamLoop<S, D> {}
