//! Request orchestration: validate, split into batches, reassemble in order.

use std::time::{Duration, Instant};

use nli_ai::{Device, WorkerPool};
use nli_core::{ClassificationResult, NliRequest, NliResponse, Pair};
use tracing::{debug, info};

use crate::error::ServiceError;
use crate::state::ServiceState;

/// Upper bound on pairs accepted in one request.
pub const MAX_PAIRS_PER_REQUEST: usize = 100;

/// The loaded model and everything needed to run requests against it.
pub struct Engine {
    pool: WorkerPool,
    model_id: String,
    device: Device,
    batch_size: usize,
    batch_timeout: Duration,
}

impl Engine {
    pub fn new(
        pool: WorkerPool,
        model_id: impl Into<String>,
        device: Device,
        batch_size: usize,
        batch_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            model_id: model_id.into(),
            device,
            batch_size: batch_size.max(1),
            batch_timeout,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Device the models actually run on.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Classify `pairs`, one result per pair in input order.
    ///
    /// Pairs go to the workers in contiguous batches of `batch_size`, one
    /// batch at a time. Any failing batch fails the whole request.
    pub async fn classify(&self, pairs: Vec<Pair>) -> Result<Vec<ClassificationResult>, ServiceError> {
        if pairs.is_empty() {
            return Ok(vec![]);
        }
        if pairs.len() > MAX_PAIRS_PER_REQUEST {
            return Err(ServiceError::TooManyPairs {
                count: pairs.len(),
                max: MAX_PAIRS_PER_REQUEST,
            });
        }

        let started = Instant::now();
        let mut results = Vec::with_capacity(pairs.len());
        let mut batches = 0;
        for batch in pairs.chunks(self.batch_size) {
            let batch_results = tokio::time::timeout(self.batch_timeout, self.pool.submit(batch.to_vec()))
                .await
                .map_err(|_| ServiceError::Timeout(self.batch_timeout))??;
            results.extend(batch_results);
            batches += 1;
        }

        info!(
            pairs = pairs.len(),
            batches,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "classified request"
        );
        Ok(results)
    }

    /// Join the compute workers. Blocks until running batches finish.
    pub fn shutdown(self) {
        self.pool.shutdown();
    }
}

/// Handle one `POST /nli` body against the current service state.
pub async fn handle(state: &ServiceState, request: NliRequest) -> Result<NliResponse, ServiceError> {
    let engine = state.engine()?;

    if let Some(requested) = &request.model
        && requested != engine.model_id()
    {
        debug!(requested = %requested, active = %engine.model_id(), "ignoring per-request model");
    }

    let results = engine.classify(request.pairs).await?;
    Ok(NliResponse { results })
}
