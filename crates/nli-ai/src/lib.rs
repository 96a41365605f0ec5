//! NLI inference layer: checkpoint resolution, ONNX Runtime sequence
//! classification, and a bounded pool of compute workers.

pub mod checkpoint;
pub mod classifier;
pub mod device;
pub mod hub;
pub mod pool;

#[cfg(feature = "onnx")]
mod onnx;

pub use checkpoint::{CheckpointFiles, ModelConfig};
pub use classifier::{BatchClassifier, NliModel, softmax};
pub use device::{Device, UnknownDevice};
pub use hub::{CheckpointResolver, HubClient, HubError};
pub use pool::{PoolError, WorkerPool};

#[cfg(feature = "onnx")]
pub use onnx::{LoadOptions, OnnxNliModel, select_device};
