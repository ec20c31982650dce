//! Local file frame source.
//!
//! `FileSource` picks a backend from the configured path:
//! - `stub://<name>`: synthetic frames generated in memory
//! - an existing directory: still images decoded in file-name order
//! - any other local path: a video file decoded with FFmpeg
//!   (feature: ingest-file-ffmpeg)
//!
//! Remote URLs are rejected.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceStats};
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local path, image directory, or `stub://<name>`.
    pub path: String,
    /// Stop after this many frames, even if the input has more.
    pub max_frames: Option<u64>,
    /// Synthetic frame width.
    pub width: u32,
    /// Synthetic frame height.
    pub height: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            max_frames: None,
            width: 640,
            height: 480,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
    max_frames: Option<u64>,
    frames_captured: u64,
    location: String,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    Images(ImageSequenceSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        let backend = if config.path.starts_with("stub://") {
            FileBackend::Synthetic(SyntheticFileSource::new(&config))
        } else if Path::new(&config.path).is_dir() {
            FileBackend::Images(ImageSequenceSource::new(Path::new(&config.path))?)
        } else {
            open_video(&config)?
        };
        Ok(Self {
            backend,
            max_frames: config.max_frames,
            frames_captured: 0,
            location: config.path,
        })
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(_) => {
                log::info!("FileSource: connected to {} (synthetic)", self.location);
                Ok(())
            }
            FileBackend::Images(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self
            .max_frames
            .is_some_and(|max| self.frames_captured >= max)
        {
            return Ok(None);
        }
        let frame = match &mut self.backend {
            FileBackend::Synthetic(source) => Some(source.next_frame()),
            FileBackend::Images(source) => source.next_frame()?,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame()?,
        };
        if frame.is_some() {
            self.frames_captured += 1;
        }
        Ok(frame)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            location: self.location.clone(),
        }
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_video(config: &FileConfig) -> Result<FileBackend> {
    Ok(FileBackend::Ffmpeg(FfmpegFileSource::new(&config.path)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_video(config: &FileConfig) -> Result<FileBackend> {
    if !Path::new(&config.path).exists() {
        return Err(anyhow!("input {} does not exist", config.path));
    }
    Err(anyhow!(
        "video file ingestion requires the ingest-file-ffmpeg feature"
    ))
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    width: u32,
    height: u32,
    frame_count: u64,
}

impl SyntheticFileSource {
    fn new(config: &FileConfig) -> Self {
        Self {
            width: config.width.max(1),
            height: config.height.max(1),
            frame_count: 0,
        }
    }

    fn next_frame(&mut self) -> RgbImage {
        self.frame_count += 1;
        let shift = self.frame_count;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let v = ((x as u64 + y as u64 + shift) % 256) as u8;
            image::Rgb([v, v / 2, 255 - v])
        })
    }
}

// ----------------------------------------------------------------------------
// Image directory source
// ----------------------------------------------------------------------------

struct ImageSequenceSource {
    dir: PathBuf,
    paths: Vec<PathBuf>,
    position: usize,
}

impl ImageSequenceSource {
    fn new(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("failed to list image directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_supported_image(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(Self {
            dir: dir.to_path_buf(),
            paths,
            position: 0,
        })
    }

    fn connect(&mut self) -> Result<()> {
        if self.paths.is_empty() {
            return Err(anyhow!("no images found in {}", self.dir.display()));
        }
        log::info!(
            "FileSource: connected to {} ({} images)",
            self.dir.display(),
            self.paths.len()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.paths.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        let image = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?;
        Ok(Some(image.to_rgb8()))
    }
}

fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| matches!(ext.as_str(), "jpg" | "jpeg" | "png"))
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
