//! Annotated-video output using FFmpeg.
//!
//! Frames are encoded as Motion JPEG at a fixed frame rate. The encoder is
//! opened on the first frame and sized from it; every later frame must have
//! the same dimensions. A run that yields no frames writes no file.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::path::{Path, PathBuf};

use super::FrameSink;
use crate::frame::ProcessedFrame;
use crate::stream::Termination;

pub const DEFAULT_OUTPUT_FPS: i32 = 25;

/// Writes every processed frame into one video file.
pub struct VideoFileSink {
    path: PathBuf,
    fps: i32,
    encoder: Option<MjpegEncoder>,
}

impl VideoFileSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            fps: DEFAULT_OUTPUT_FPS,
            encoder: None,
        }
    }

    pub fn with_fps(mut self, fps: i32) -> Self {
        self.fps = fps.max(1);
        self
    }

    pub fn frames_written(&self) -> i64 {
        self.encoder.as_ref().map_or(0, |encoder| encoder.next_pts)
    }
}

impl FrameSink for VideoFileSink {
    fn accept(&mut self, frame: &ProcessedFrame) -> Result<()> {
        let image = frame.frame.image();
        let encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None => MjpegEncoder::open(&self.path, image.width(), image.height(), self.fps)?,
        };
        self.encoder.insert(encoder).write(image)
    }

    fn finish(&mut self, termination: Termination) -> Result<()> {
        match self.encoder.take() {
            Some(mut encoder) => {
                encoder.finish()?;
                log::info!(
                    "wrote {} frames to {} ({:?})",
                    encoder.next_pts,
                    self.path.display(),
                    termination
                );
            }
            None => log::warn!("no frames produced; {} not written", self.path.display()),
        }
        Ok(())
    }
}

struct MjpegEncoder {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::video::Encoder,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
    width: u32,
    height: u32,
    next_pts: i64,
}

impl MjpegEncoder {
    fn open(path: &Path, width: u32, height: u32, fps: i32) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let mut output = ffmpeg::format::output(&path)
            .with_context(|| format!("failed to create video output {}", path.display()))?;
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MJPEG)
            .ok_or_else(|| anyhow!("ffmpeg was built without an MJPEG encoder"))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let mut stream = output.add_stream(codec).context("add video stream")?;
        let stream_index = stream.index();

        let mut config = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .context("load video encoder parameters")?
            .encoder()
            .video()
            .context("create MJPEG encoder")?;
        let time_base = ffmpeg::Rational::new(1, fps);
        config.set_width(width);
        config.set_height(height);
        config.set_format(ffmpeg::util::format::pixel::Pixel::YUVJ420P);
        config.set_time_base(time_base);
        config.set_frame_rate(Some(ffmpeg::Rational::new(fps, 1)));
        if global_header {
            config.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = config.open_as(codec).context("open MJPEG encoder")?;
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);

        output
            .write_header()
            .with_context(|| format!("failed to write header to {}", path.display()))?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            ffmpeg::util::format::pixel::Pixel::RGB24,
            width,
            height,
            ffmpeg::util::format::pixel::Pixel::YUVJ420P,
            width,
            height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "VideoFileSink: writing {} ({}x{} @ {} fps, MJPEG)",
            path.display(),
            width,
            height,
            fps
        );

        Ok(Self {
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base: time_base,
            width,
            height,
            next_pts: 0,
        })
    }

    fn write(&mut self, image: &RgbImage) -> Result<()> {
        if image.dimensions() != (self.width, self.height) {
            return Err(anyhow!(
                "frame is {}x{} but the video was opened at {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height
            ));
        }
        let rgb = image_to_frame(image);
        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut yuv)
            .context("convert frame to YUV")?;
        yuv.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder
            .send_frame(&yuv)
            .context("send frame to MJPEG encoder")?;
        self.drain()
    }

    fn finish(&mut self) -> Result<()> {
        self.encoder.send_eof().context("flush MJPEG encoder")?;
        self.drain()?;
        self.output
            .write_trailer()
            .context("failed to finalize video file")?;
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        let stream_time_base = self
            .output
            .stream(self.stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| anyhow!("video stream disappeared"))?;
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .context("write video packet")?;
        }
        Ok(())
    }
}

fn image_to_frame(image: &RgbImage) -> ffmpeg::frame::Video {
    let (width, height) = image.dimensions();
    let mut frame =
        ffmpeg::frame::Video::new(ffmpeg::util::format::pixel::Pixel::RGB24, width, height);
    let row_bytes = width as usize * 3;
    let stride = frame.stride(0);
    let data = frame.data_mut(0);
    for (row, pixels) in image.as_raw().chunks_exact(row_bytes).enumerate() {
        let start = row * stride;
        data[start..start + row_bytes].copy_from_slice(pixels);
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::Annotator;
    use crate::detect::DetectionSet;
    use crate::frame::Frame;
    use crate::proximity::ViolationSet;

    fn blank(sequence: u64, width: u32, height: u32) -> ProcessedFrame {
        let mut image = RgbImage::new(width, height);
        let detections = DetectionSet::default();
        let violations = ViolationSet::default();
        let annotation = Annotator::new(None).annotate(&mut image, &detections, &violations);
        ProcessedFrame {
            frame: Frame::new(image, sequence),
            detections,
            violating_pairs: Vec::new(),
            violations,
            annotation,
        }
    }

    #[test]
    fn encodes_frames_sized_from_the_first() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.avi");
        let mut sink = VideoFileSink::new(&path);
        for sequence in 0..3 {
            sink.accept(&blank(sequence, 64, 48))?;
        }
        assert_eq!(sink.frames_written(), 3);
        sink.finish(Termination::Exhausted)?;
        assert!(std::fs::metadata(&path)?.len() > 0);
        Ok(())
    }

    #[test]
    fn rejects_frames_of_a_different_size() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = VideoFileSink::new(dir.path().join("out.avi"));
        sink.accept(&blank(0, 64, 48))?;
        assert!(sink.accept(&blank(1, 32, 48)).is_err());
        Ok(())
    }

    #[test]
    fn empty_run_writes_no_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.avi");
        let mut sink = VideoFileSink::new(&path);
        sink.finish(Termination::Cancelled)?;
        assert!(!path.exists());
        Ok(())
    }
}
