mod backend;
mod backends;
mod labels;
mod nms;
mod result;

pub use backend::{DetectionQuery, DetectorBackend};
pub use backends::{open_backend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use labels::{load_labels, ClassLabels};
pub use nms::filter_and_suppress;
pub use result::{BoundingBox, Centroid, ContractViolation, Detection, DetectionSet};
