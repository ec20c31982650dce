use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_MIN_DISTANCE_PX: f32 = 50.0;
const DEFAULT_TARGET_CLASS: &str = "person";
const DEFAULT_MIN_CONFIDENCE: f32 = 0.3;
const DEFAULT_NMS_THRESHOLD: f32 = 0.3;
const DEFAULT_PROCESSING_WIDTH: u32 = 700;
const DEFAULT_DETECTOR_BACKEND: &str = "stub";
const DEFAULT_MODEL_DIR: &str = "yolo-coco";
const DEFAULT_MODEL_FILE: &str = "yolov8n.onnx";
const DEFAULT_LABELS_FILE: &str = "coco.names";
const DEFAULT_INPUT_SIZE: u32 = 640;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    min_distance_px: Option<f32>,
    target_class: Option<String>,
    min_confidence: Option<f32>,
    nms_threshold: Option<f32>,
    use_gpu: Option<bool>,
    processing_width: Option<u32>,
    detector: Option<DetectorConfigFile>,
    annotation: Option<AnnotationConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_dir: Option<PathBuf>,
    model_file: Option<String>,
    labels_file: Option<String>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotationConfigFile {
    font_path: Option<PathBuf>,
}

/// Process-wide pipeline settings. Loaded once at startup and shared
/// read-only (wrap in `Arc` before handing to the stream loop).
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Centroids closer than this many pixels are a violation.
    pub min_distance_px: f32,
    pub target_class: String,
    pub min_confidence: f32,
    pub nms_threshold: f32,
    pub use_gpu: bool,
    /// Frames are resized to this width (aspect kept) before detection.
    pub processing_width: u32,
    pub detector: DetectorSettings,
    pub annotation: AnnotationSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_dir: PathBuf,
    pub model_file: String,
    pub labels_file: String,
    pub input_size: u32,
}

impl DetectorSettings {
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_file)
    }

    pub fn labels_path(&self) -> PathBuf {
        self.model_dir.join(&self.labels_file)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationSettings {
    pub font_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_distance_px: DEFAULT_MIN_DISTANCE_PX,
            target_class: DEFAULT_TARGET_CLASS.to_string(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
            use_gpu: false,
            processing_width: DEFAULT_PROCESSING_WIDTH,
            detector: DetectorSettings {
                backend: DEFAULT_DETECTOR_BACKEND.to_string(),
                model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
                model_file: DEFAULT_MODEL_FILE.to_string(),
                labels_file: DEFAULT_LABELS_FILE.to_string(),
                input_size: DEFAULT_INPUT_SIZE,
            },
            annotation: AnnotationSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from the file named by `PROXIMITY_CONFIG` (if set), apply
    /// environment overrides, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PROXIMITY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit file, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Override the target class (command-line flag) and re-validate.
    pub fn with_target_class(mut self, target_class: &str) -> Result<Self> {
        self.target_class = target_class.to_string();
        self.validate()?;
        Ok(self)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let defaults = Self::default();
        let detector = file.detector.unwrap_or_default();
        Self {
            min_distance_px: file.min_distance_px.unwrap_or(defaults.min_distance_px),
            target_class: file.target_class.unwrap_or(defaults.target_class),
            min_confidence: file.min_confidence.unwrap_or(defaults.min_confidence),
            nms_threshold: file.nms_threshold.unwrap_or(defaults.nms_threshold),
            use_gpu: file.use_gpu.unwrap_or(defaults.use_gpu),
            processing_width: file.processing_width.unwrap_or(defaults.processing_width),
            detector: DetectorSettings {
                backend: detector.backend.unwrap_or(defaults.detector.backend),
                model_dir: detector.model_dir.unwrap_or(defaults.detector.model_dir),
                model_file: detector.model_file.unwrap_or(defaults.detector.model_file),
                labels_file: detector
                    .labels_file
                    .unwrap_or(defaults.detector.labels_file),
                input_size: detector.input_size.unwrap_or(defaults.detector.input_size),
            },
            annotation: AnnotationSettings {
                font_path: file.annotation.and_then(|annotation| annotation.font_path),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(value) = env_f32("PROXIMITY_MIN_DISTANCE_PX")? {
            self.min_distance_px = value;
        }
        if let Ok(target) = std::env::var("PROXIMITY_TARGET_CLASS") {
            if !target.trim().is_empty() {
                self.target_class = target.trim().to_string();
            }
        }
        if let Some(value) = env_f32("PROXIMITY_MIN_CONFIDENCE")? {
            self.min_confidence = value;
        }
        if let Some(value) = env_f32("PROXIMITY_NMS_THRESHOLD")? {
            self.nms_threshold = value;
        }
        if let Ok(flag) = std::env::var("PROXIMITY_USE_GPU") {
            self.use_gpu = parse_bool(&flag)
                .ok_or_else(|| anyhow!("PROXIMITY_USE_GPU must be true/false/1/0"))?;
        }
        if let Ok(width) = std::env::var("PROXIMITY_PROCESSING_WIDTH") {
            self.processing_width = width
                .trim()
                .parse()
                .map_err(|_| anyhow!("PROXIMITY_PROCESSING_WIDTH must be an integer"))?;
        }
        if let Ok(backend) = std::env::var("PROXIMITY_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(dir) = std::env::var("PROXIMITY_MODEL_DIR") {
            if !dir.trim().is_empty() {
                self.detector.model_dir = PathBuf::from(dir);
            }
        }
        if let Ok(font) = std::env::var("PROXIMITY_FONT") {
            if !font.trim().is_empty() {
                self.annotation.font_path = Some(PathBuf::from(font));
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !self.min_distance_px.is_finite() || self.min_distance_px <= 0.0 {
            return Err(anyhow!("min_distance_px must be a positive number"));
        }
        if self.target_class.trim().is_empty() {
            return Err(anyhow!("target_class must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(anyhow!("min_confidence must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.nms_threshold) {
            return Err(anyhow!("nms_threshold must be within [0, 1]"));
        }
        if self.processing_width == 0 {
            return Err(anyhow!("processing_width must be greater than zero"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input_size must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_f32(key: &str) -> Result<Option<f32>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a number", key)),
        _ => Ok(None),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
