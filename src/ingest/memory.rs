use anyhow::{anyhow, Result};
use image::RgbImage;
use std::collections::VecDeque;

use super::{FrameSource, SourceStats};

/// Frames supplied up front, handed out once in order.
pub struct MemorySource {
    frames: VecDeque<RgbImage>,
    frames_captured: u64,
    connected: bool,
    fail_connect: bool,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            frames: frames.into(),
            frames_captured: 0,
            connected: false,
            fail_connect: false,
        }
    }

    /// `count` blank frames of the given size.
    pub fn blank(count: usize, width: u32, height: u32) -> Self {
        Self::new((0..count).map(|_| RgbImage::new(width, height)).collect())
    }

    /// A source whose `connect` always fails.
    pub fn unavailable() -> Self {
        Self {
            fail_connect: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MemorySource {
    fn connect(&mut self) -> Result<()> {
        if self.fail_connect {
            return Err(anyhow!("memory source is unavailable"));
        }
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if !self.connected {
            return Err(anyhow!("memory source is not connected"));
        }
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.frames_captured += 1;
        }
        Ok(frame)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            location: "memory".to_string(),
        }
    }
}
