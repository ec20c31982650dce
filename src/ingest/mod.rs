//! Frame sources.
//!
//! - Synthetic frames (`stub://` paths, testing and demos)
//! - Image sequences (a directory of still images, sorted by file name)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - In-memory frames (`MemorySource`)
//!
//! Sources hand out frames at their native size. Resizing to the processing
//! width happens in the stream loop.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod memory;

pub use file::{FileConfig, FileSource};
pub use memory::MemorySource;

use anyhow::Result;
use image::RgbImage;

/// Counters reported by a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub location: String,
}

/// A single-pass stream of frames.
pub trait FrameSource {
    /// Open the underlying stream. Failure is fatal for the pipeline.
    fn connect(&mut self) -> Result<()>;

    /// Next frame, or `None` once the stream is exhausted. Exhaustion is
    /// permanent: every later call also returns `None`.
    ///
    /// May block until a frame is available.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        (**self).next_frame()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}
