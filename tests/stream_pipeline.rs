use std::sync::Arc;

use anyhow::Result;

use proximity_watch::{
    drive, Annotator, BoundingBox, CancelToken, Detection, FileConfig, FileSource,
    FrameDirectorySink, FrameSink, JsonReportSink, MemorySource, PipelineConfig, StreamEvent,
    StreamLoop, StubBackend, Termination,
};

fn config(width: u32) -> Arc<PipelineConfig> {
    Arc::new(PipelineConfig {
        processing_width: width,
        ..PipelineConfig::default()
    })
}

/// A 10x10 box centered on (x, y).
fn centered(confidence: f32, x: f32, y: f32) -> Detection {
    Detection::from_box(confidence, BoundingBox::new(x - 5.0, y - 5.0, x + 5.0, y + 5.0))
}

fn report_lines(path: &std::path::Path) -> Result<Vec<serde_json::Value>> {
    let text = std::fs::read_to_string(path)?;
    let lines = text
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    Ok(lines)
}

#[test]
fn chained_neighbours_all_count_as_violations() -> Result<()> {
    let detector = StubBackend::scripted(vec![vec![
        centered(0.9, 10.0, 20.0),
        centered(0.9, 50.0, 20.0),
        centered(0.9, 90.0, 20.0),
    ]]);
    let mut stream = StreamLoop::start(
        MemorySource::blank(1, 100, 80),
        detector,
        Annotator::bundled()?,
        config(100),
        CancelToken::new(),
    )?;

    let frame = stream
        .next()
        .expect("frame event")?
        .into_frame()
        .expect("processed frame");
    assert_eq!(frame.violations.to_vec(), vec![0, 1, 2]);
    assert_eq!(frame.annotation.violation_count, 3);
    assert!(frame.annotation.counter_drawn);
    assert_eq!(
        frame.annotation.counter_text,
        "Social Distancing Violations: 3"
    );
    assert!(matches!(
        stream.next().expect("end event")?,
        StreamEvent::End(Termination::Exhausted)
    ));
    Ok(())
}

#[test]
fn low_confidence_and_duplicate_boxes_are_dropped_before_analysis() -> Result<()> {
    let detector = StubBackend::scripted(vec![vec![
        centered(0.9, 20.0, 20.0),
        // Same person, overlapping box with lower confidence.
        centered(0.6, 21.0, 20.0),
        // Below the default confidence floor.
        centered(0.2, 40.0, 20.0),
        centered(0.8, 90.0, 60.0),
    ]]);
    let mut stream = StreamLoop::start(
        MemorySource::blank(1, 100, 80),
        detector,
        Annotator::bundled()?,
        config(100),
        CancelToken::new(),
    )?;

    let frame = stream
        .next()
        .expect("frame event")?
        .into_frame()
        .expect("processed frame");
    assert_eq!(frame.detections.len(), 2);
    assert!(frame.violations.is_empty());
    Ok(())
}

#[test]
fn synthetic_input_writes_frames_and_report() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let frames_dir = dir.path().join("frames");
    let report_path = dir.path().join("report.jsonl");

    let source = FileSource::new(FileConfig {
        path: "stub://crossing".to_string(),
        max_frames: Some(4),
        width: 320,
        height: 240,
    })?;
    let stream = StreamLoop::start(
        source,
        StubBackend::walkers(),
        Annotator::bundled()?,
        config(160),
        CancelToken::new(),
    )?;

    let mut sinks: Vec<Box<dyn FrameSink>> = vec![
        Box::new(FrameDirectorySink::new(&frames_dir)?),
        Box::new(JsonReportSink::create(&report_path)?),
    ];
    let summary = drive(stream, &mut sinks)?;
    drop(sinks);

    assert_eq!(summary.frames, 4);
    assert_eq!(summary.termination, Termination::Exhausted);
    for n in 0..4 {
        let image = image::open(frames_dir.join(format!("frame{n}.jpg")))?;
        assert_eq!((image.width(), image.height()), (160, 120));
    }

    let lines = report_lines(&report_path)?;
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0]["sequence"], 0);
    assert_eq!(lines[0]["detections"].as_array().map(|d| d.len()), Some(3));
    assert_eq!(lines[4]["kind"], "end");
    assert_eq!(lines[4]["termination"], "exhausted");
    Ok(())
}

#[test]
fn cancelled_run_still_finishes_sinks() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let report_path = dir.path().join("report.jsonl");

    let cancel = CancelToken::new();
    let stream = StreamLoop::start(
        MemorySource::blank(10, 100, 80),
        StubBackend::walkers(),
        Annotator::bundled()?,
        config(100),
        cancel.clone(),
    )?;
    cancel.cancel();

    let mut sinks: Vec<Box<dyn FrameSink>> =
        vec![Box::new(JsonReportSink::create(&report_path)?)];
    let summary = drive(stream, &mut sinks)?;
    drop(sinks);

    assert_eq!(summary.frames, 0);
    assert_eq!(summary.termination, Termination::Cancelled);
    let lines = report_lines(&report_path)?;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["termination"], "cancelled");
    Ok(())
}

#[test]
fn each_loop_is_single_pass() -> Result<()> {
    let mut stream = StreamLoop::start(
        MemorySource::blank(2, 100, 80),
        StubBackend::walkers(),
        Annotator::bundled()?,
        config(100),
        CancelToken::new(),
    )?;
    let events: Vec<_> = stream.by_ref().collect::<Result<_>>()?;
    assert_eq!(events.len(), 3);
    assert!(stream.next().is_none());
    assert!(stream.state().is_terminal());
    Ok(())
}
