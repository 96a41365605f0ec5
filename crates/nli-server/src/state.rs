//! Service lifecycle: `uninitialized -> ready -> shutting down`.

use std::sync::{Arc, PoisonError, RwLock};

use nli_ai::Device;
use tracing::info;

use crate::error::ServiceError;
use crate::orchestrator::Engine;

enum Phase {
    Uninitialized,
    Ready(Arc<Engine>),
    ShuttingDown,
}

/// Process-wide state shared by every handler.
///
/// The engine is only reachable while the service is ready. The phase lock
/// is held just long enough to clone the `Arc`, never across compute.
pub struct ServiceState {
    model_id: String,
    device: Device,
    phase: RwLock<Phase>,
}

impl ServiceState {
    /// `model_id` and `device` are the configured values, reported before the
    /// engine is loaded.
    pub fn new(model_id: impl Into<String>, device: Device) -> Self {
        Self {
            model_id: model_id.into(),
            device,
            phase: RwLock::new(Phase::Uninitialized),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Device in use once ready, otherwise the configured one.
    pub fn device(&self) -> Device {
        self.engine().map_or(self.device, |engine| engine.device())
    }

    /// Publish a loaded engine. Allowed once, from `uninitialized`.
    pub fn mark_ready(&self, engine: Arc<Engine>) -> anyhow::Result<()> {
        let mut phase = self.phase.write().unwrap_or_else(PoisonError::into_inner);
        anyhow::ensure!(
            matches!(*phase, Phase::Uninitialized),
            "service can only become ready once"
        );
        info!(model = %engine.model_id(), device = %engine.device(), "service ready");
        *phase = Phase::Ready(engine);
        Ok(())
    }

    /// Stop handing out the engine. Returns `false` if already shutting down.
    pub fn begin_shutdown(&self) -> bool {
        let mut phase = self.phase.write().unwrap_or_else(PoisonError::into_inner);
        if matches!(*phase, Phase::ShuttingDown) {
            return false;
        }
        *phase = Phase::ShuttingDown;
        info!("service shutting down, rejecting new requests");
        true
    }

    /// The engine, if the service is ready to take requests.
    pub fn engine(&self) -> Result<Arc<Engine>, ServiceError> {
        match &*self.phase.read().unwrap_or_else(PoisonError::into_inner) {
            Phase::Ready(engine) => Ok(Arc::clone(engine)),
            Phase::Uninitialized => Err(ServiceError::NotReady),
            Phase::ShuttingDown => Err(ServiceError::ShuttingDown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::tests::engine;

    #[test]
    fn starts_uninitialized() {
        let state = ServiceState::new("test/nli", Device::Cuda);
        assert!(state.engine().is_err());
        assert!(matches!(state.engine(), Err(ServiceError::NotReady)));
        assert_eq!(state.device(), Device::Cuda);
    }

    #[test]
    fn ready_exactly_once() {
        let state = ServiceState::new("test/nli", Device::Cuda);
        state.mark_ready(Arc::new(engine(16).0)).unwrap();
        assert!(state.engine().is_ok());
        assert_eq!(state.device(), Device::Cpu, "reports the effective device");

        assert!(state.mark_ready(Arc::new(engine(16).0)).is_err());
    }

    #[test]
    fn shutdown_rejects_new_work() {
        let state = ServiceState::new("test/nli", Device::Cpu);
        state.mark_ready(Arc::new(engine(16).0)).unwrap();

        assert!(state.begin_shutdown());
        assert!(!state.begin_shutdown());
        assert!(matches!(state.engine(), Err(ServiceError::ShuttingDown)));
        assert!(state.mark_ready(Arc::new(engine(16).0)).is_err());
    }
}
