mod backend;
pub mod backends;
pub mod filter;
mod gate;
mod result;

pub use backend::DetectorBackend;
pub use backends::{load_backend, StubBackend};
pub use filter::{admit, CONFIDENCE_THRESHOLD};
pub use gate::{ModelGate, ModelStatus};
pub use result::{BoundingBox, ClassCounts, Detection, DetectionBatch, RawDetection, VehicleClass};
