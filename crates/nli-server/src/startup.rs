//! Startup: resolve the checkpoint, choose labels and device, load workers.

use anyhow::Context;
use nli_ai::{
    BatchClassifier, CheckpointResolver, LoadOptions, ModelConfig, OnnxNliModel, WorkerPool,
    select_device,
};
use nli_core::LabelMap;
use tracing::info;

use crate::config::Config;
use crate::orchestrator::Engine;

/// Build the engine described by `config`. Any failure is fatal.
pub async fn load_engine(config: &Config) -> anyhow::Result<Engine> {
    let resolver = CheckpointResolver::new(config.models_dir.clone(), config.hub());
    let files = resolver
        .resolve(&config.model)
        .await
        .with_context(|| format!("resolving model {}", config.model))?;

    let model_config = ModelConfig::load(files.config.as_deref())?;
    let (labels, source) =
        LabelMap::resolve(&config.model, model_config.id2label.as_ref(), config.label_order)?;
    info!(labels = %labels, source = %source, "label map selected");

    let device = select_device(config.device, config.strict_device)?;
    let opts = LoadOptions {
        device,
        max_length: config.max_length,
        intra_threads: config.intra_threads,
    };
    let max_chars = config.max_chars();
    let (workers, queue_depth) = (config.workers, config.queue_depth);

    info!(
        model = %config.model,
        dir = %files.dir.display(),
        %device,
        workers,
        "loading model"
    );
    let pool = tokio::task::spawn_blocking(move || {
        WorkerPool::start(workers, queue_depth, move |_| {
            let model = OnnxNliModel::load(&files, &model_config, &opts)?;
            BatchClassifier::new(model, labels, max_chars)
        })
    })
    .await
    .context("model loading task panicked")??;

    Ok(Engine::new(
        pool,
        config.model.clone(),
        device,
        config.batch_size,
        config.batch_timeout(),
    ))
}
