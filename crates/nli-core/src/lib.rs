pub mod labels;
pub mod pair;
pub mod wire;

pub use labels::{Label, LabelError, LabelMap, LabelSource};
pub use pair::{ClassificationResult, Pair};
pub use wire::{ErrorBody, HealthResponse, NliRequest, NliResponse, ServiceDescriptor};
