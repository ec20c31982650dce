//! Consumers of processed frames.
//!
//! `drive` pulls a stream loop to completion and hands every frame to each
//! sink, then tells each sink how the stream ended.
//!
//! - `FrameDirectorySink`: one JPEG per frame
//! - `JsonReportSink`: one JSON line per frame
//! - `VideoFileSink`: an MJPEG video file (feature: output-video-ffmpeg)

#[cfg(feature = "output-video-ffmpeg")]
mod video_ffmpeg;

#[cfg(feature = "output-video-ffmpeg")]
pub use video_ffmpeg::{VideoFileSink, DEFAULT_OUTPUT_FPS};

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::detect::DetectionSet;
use crate::frame::ProcessedFrame;
use crate::stream::{StreamEvent, Termination};

/// Receives frames from the stream loop.
pub trait FrameSink {
    /// Called once per processed frame. `drive` owns the frame and lends it
    /// to each sink in turn; a sink that keeps it past this call must clone it.
    fn accept(&mut self, frame: &ProcessedFrame) -> Result<()>;

    /// Called once when the producer terminates; no frames follow.
    fn finish(&mut self, _termination: Termination) -> Result<()> {
        Ok(())
    }
}

/// Writes each annotated frame as `<dir>/<prefix><sequence>.jpg`.
pub struct FrameDirectorySink {
    dir: PathBuf,
    prefix: String,
    written: u64,
}

impl FrameDirectorySink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        Ok(Self {
            dir,
            prefix: "frame".to_string(),
            written: 0,
        })
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    fn path_for(&self, sequence: u64) -> PathBuf {
        self.dir.join(format!("{}{}.jpg", self.prefix, sequence))
    }
}

impl FrameSink for FrameDirectorySink {
    fn accept(&mut self, frame: &ProcessedFrame) -> Result<()> {
        let path = self.path_for(frame.sequence());
        frame
            .frame
            .image()
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self, termination: Termination) -> Result<()> {
        log::info!(
            "wrote {} frames to {} ({:?})",
            self.written,
            self.dir.display(),
            termination
        );
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ReportLine<'a> {
    Frame {
        sequence: u64,
        width: u32,
        height: u32,
        detections: &'a DetectionSet,
        violations: Vec<usize>,
        violating_pairs: &'a [(usize, usize)],
        violation_count: usize,
    },
    End {
        termination: Termination,
        frames: u64,
    },
}

/// Writes one JSON object per line: a `frame` line per processed frame and a
/// final `end` line.
pub struct JsonReportSink<W: Write> {
    writer: W,
    frames: u64,
}

impl JsonReportSink<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("failed to create report {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonReportSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, frames: 0 }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, line: &ReportLine<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.writer, line)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write> FrameSink for JsonReportSink<W> {
    fn accept(&mut self, frame: &ProcessedFrame) -> Result<()> {
        self.write_line(&ReportLine::Frame {
            sequence: frame.sequence(),
            width: frame.frame.width(),
            height: frame.frame.height(),
            detections: &frame.detections,
            violations: frame.violations.to_vec(),
            violating_pairs: &frame.violating_pairs,
            violation_count: frame.violation_count(),
        })?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self, termination: Termination) -> Result<()> {
        let frames = self.frames;
        self.write_line(&ReportLine::End {
            termination,
            frames,
        })?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Totals from a completed run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    /// Sum of per-frame violation counts.
    pub total_violations: u64,
    pub max_violations: usize,
    pub termination: Termination,
}

/// Pull `stream` to completion, feeding every frame to each sink.
///
/// Stream and sink errors abort the run. `finish` is called on every sink
/// once the stream ends.
pub fn drive<I>(stream: I, sinks: &mut [Box<dyn FrameSink>]) -> Result<RunSummary>
where
    I: IntoIterator<Item = Result<StreamEvent>>,
{
    let mut frames = 0u64;
    let mut total_violations = 0u64;
    let mut max_violations = 0usize;
    let mut termination = Termination::Exhausted;

    for event in stream {
        match event? {
            StreamEvent::Frame(frame) => {
                for sink in sinks.iter_mut() {
                    sink.accept(&frame)?;
                }
                frames += 1;
                total_violations += frame.violation_count() as u64;
                max_violations = max_violations.max(frame.violation_count());
            }
            StreamEvent::End(reason) => {
                termination = reason;
                break;
            }
        }
    }

    for sink in sinks.iter_mut() {
        sink.finish(termination)?;
    }

    Ok(RunSummary {
        frames,
        total_violations,
        max_violations,
        termination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::Annotator;
    use crate::detect::{BoundingBox, Detection};
    use crate::frame::Frame;
    use crate::proximity::{violating_pairs, ViolationSet};
    use image::RgbImage;

    fn processed(sequence: u64, xs: &[f32]) -> ProcessedFrame {
        let detections = DetectionSet::new(
            xs.iter()
                .map(|&x| Detection::from_box(0.9, BoundingBox::new(x, 0.0, x + 10.0, 20.0)))
                .collect(),
        );
        let pairs = violating_pairs(&detections.centroids(), 50.0);
        let violations = ViolationSet::from_pairs(&pairs);
        let mut image = RgbImage::new(120, 40);
        let annotation = Annotator::new(None).annotate(&mut image, &detections, &violations);
        ProcessedFrame {
            frame: Frame::new(image, sequence),
            detections,
            violating_pairs: pairs,
            violations,
            annotation,
        }
    }

    #[test]
    fn report_sink_writes_frame_and_end_lines() -> Result<()> {
        let mut sink = JsonReportSink::new(Vec::new());
        sink.accept(&processed(0, &[0.0, 10.0, 20.0]))?;
        sink.finish(Termination::Exhausted)?;

        let text = String::from_utf8(sink.into_inner())?;
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "frame");
        assert_eq!(lines[0]["violation_count"], 3);
        assert_eq!(lines[0]["violating_pairs"].as_array().map(|a| a.len()), Some(3));
        assert_eq!(lines[0]["detections"][1]["centroid"]["x"], 15.0);
        assert_eq!(lines[1]["kind"], "end");
        assert_eq!(lines[1]["termination"], "exhausted");
        assert_eq!(lines[1]["frames"], 1);
        Ok(())
    }

    #[test]
    fn report_pairs_agree_with_violations() -> Result<()> {
        // Chain: 0-1 and 1-2 are close, 0-2 are not.
        let mut sink = JsonReportSink::new(Vec::new());
        sink.accept(&processed(0, &[0.0, 40.0, 80.0]))?;

        let text = String::from_utf8(sink.into_inner())?;
        let line: serde_json::Value = serde_json::from_str(text.trim())?;
        assert_eq!(line["violating_pairs"], serde_json::json!([[0, 1], [1, 2]]));
        assert_eq!(line["violations"], serde_json::json!([0, 1, 2]));
        Ok(())
    }

    #[test]
    fn directory_sink_names_files_by_sequence() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = FrameDirectorySink::new(dir.path().join("frames"))?;
        sink.accept(&processed(0, &[0.0]))?;
        sink.accept(&processed(1, &[0.0]))?;

        assert!(dir.path().join("frames/frame0.jpg").is_file());
        assert!(dir.path().join("frames/frame1.jpg").is_file());
        assert_eq!(sink.written(), 2);
        Ok(())
    }

    #[test]
    fn drive_stops_at_end_and_finishes_sinks() -> Result<()> {
        let events = vec![
            Ok(StreamEvent::Frame(Box::new(processed(0, &[0.0, 10.0])))),
            Ok(StreamEvent::Frame(Box::new(processed(1, &[0.0, 100.0])))),
            Ok(StreamEvent::End(Termination::Cancelled)),
        ];
        let mut sinks: Vec<Box<dyn FrameSink>> = Vec::new();
        let summary = drive(events, &mut sinks)?;
        assert_eq!(
            summary,
            RunSummary {
                frames: 2,
                total_violations: 2,
                max_violations: 2,
                termination: Termination::Cancelled,
            }
        );
        Ok(())
    }

    #[test]
    fn drive_propagates_stream_errors() {
        let events: Vec<Result<StreamEvent>> = vec![Err(anyhow::anyhow!("decoder failed"))];
        let mut sinks: Vec<Box<dyn FrameSink>> = Vec::new();
        assert!(drive(events, &mut sinks).is_err());
    }
}
