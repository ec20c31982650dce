pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;
use crate::detect::backend::DetectorBackend;

/// Construct the backend named in the detector settings.
pub fn open_backend(
    settings: &DetectorSettings,
    use_gpu: bool,
) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend.as_str() {
        "stub" => {
            log::info!("using stub detector backend (synthetic walkers)");
            Ok(Box::new(StubBackend::walkers()))
        }
        "tract" => open_tract(settings, use_gpu),
        other => Err(anyhow!("unknown detector backend '{}'", other)),
    }
}

#[cfg(feature = "backend-tract")]
fn open_tract(settings: &DetectorSettings, use_gpu: bool) -> Result<Box<dyn DetectorBackend>> {
    if use_gpu {
        log::warn!("GPU acceleration requested but the tract backend runs on CPU");
    }
    let backend = TractBackend::new(
        settings.model_path(),
        settings.labels_path(),
        settings.input_size,
    )?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn open_tract(
    _settings: &DetectorSettings,
    _use_gpu: bool,
) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!("the tract detector requires the backend-tract feature"))
}
