//! proximity-watch
//!
//! Per-frame social-distancing analysis for video. Each frame is resized,
//! run through an object detector for one target class, checked for pairs of
//! detections whose centroids are closer than a pixel threshold, and
//! annotated with colored boxes and a violation counter.
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (synthetic, image directories, video files, memory)
//! - `detect`: detector backends and the detection data model
//! - `proximity`: pairwise distance analysis (`analyze`)
//! - `annotate`: drawing boxes, centroids and the counter
//! - `stream`: the pull-based `StreamLoop` state machine
//! - `sink`: consumers of processed frames and `drive`
//! - `config`: `PipelineConfig` loading and validation

pub mod annotate;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod proximity;
pub mod sink;
pub mod stream;

pub use annotate::{Annotation, Annotator};
pub use config::{AnnotationSettings, DetectorSettings, PipelineConfig};
pub use detect::{
    open_backend, BoundingBox, Centroid, ContractViolation, Detection, DetectionQuery,
    DetectionSet, DetectorBackend, StubBackend,
};
pub use frame::{Frame, ProcessedFrame};
pub use ingest::{FileConfig, FileSource, FrameSource, MemorySource};
pub use proximity::{analyze, violating_pairs, ViolationSet};
pub use sink::{drive, FrameDirectorySink, FrameSink, JsonReportSink, RunSummary};
#[cfg(feature = "output-video-ffmpeg")]
pub use sink::VideoFileSink;
pub use stream::{CancelToken, StreamEvent, StreamLoop, StreamState, Termination};
