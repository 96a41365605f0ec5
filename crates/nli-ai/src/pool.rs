//! Bounded pool of compute workers.
//!
//! Forward passes are blocking and CPU/accelerator bound, so they run on
//! dedicated OS threads rather than on the async runtime. Each worker owns its
//! own [`BatchClassifier`] (and therefore its own model session); batches are
//! queued on a bounded channel and each result comes back on a oneshot.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use nli_core::{ClassificationResult, Pair};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::classifier::{BatchClassifier, NliModel};

type BatchResult = anyhow::Result<Vec<ClassificationResult>>;

struct Job {
    pairs: Vec<Pair>,
    reply: oneshot::Sender<BatchResult>,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("compute pool is shut down")]
    Closed,
    #[error("compute worker exited before finishing the batch")]
    WorkerLost,
    #[error("inference failed: {0:#}")]
    Inference(anyhow::Error),
}

pub struct WorkerPool {
    jobs: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` threads, each building its own classifier with `factory`.
    ///
    /// Blocks until every worker has loaded its model. If any worker fails,
    /// the others are stopped and the first error is returned.
    pub fn start<M, F>(workers: usize, queue_depth: usize, factory: F) -> anyhow::Result<Self>
    where
        M: NliModel + 'static,
        F: Fn(usize) -> anyhow::Result<BatchClassifier<M>> + Send + Sync + 'static,
    {
        anyhow::ensure!(workers > 0, "worker count must be at least 1");
        anyhow::ensure!(queue_depth > 0, "queue depth must be at least 1");

        let (tx, rx) = mpsc::channel::<Job>(queue_depth);
        let rx = Arc::new(Mutex::new(rx));
        let factory = Arc::new(factory);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<anyhow::Result<()>>();

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let rx = Arc::clone(&rx);
            let factory = Arc::clone(&factory);
            let ready = ready_tx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("nli-worker-{id}"))
                .spawn(move || match (*factory)(id) {
                    Ok(classifier) => {
                        let _ = ready.send(Ok(()));
                        drop(ready);
                        run_worker(id, classifier, rx);
                    }
                    Err(e) => {
                        let _ = ready.send(Err(e.context(format!("loading model for worker {id}"))));
                    }
                })?;
            handles.push(handle);
        }
        drop(ready_tx);

        let mut pool = Self {
            jobs: Some(tx),
            workers: handles,
        };

        for _ in 0..workers {
            let loaded = ready_rx
                .recv()
                .unwrap_or_else(|_| Err(anyhow::anyhow!("compute worker panicked while loading")));
            if let Err(e) = loaded {
                pool.stop();
                return Err(e);
            }
        }

        info!(workers, queue_depth, "compute pool ready");
        Ok(pool)
    }

    /// Queue `pairs` as one batch and wait for its results.
    ///
    /// Waits for queue capacity when all workers are busy. Dropping the
    /// returned future before a worker picks the batch up cancels it.
    pub async fn submit(&self, pairs: Vec<Pair>) -> Result<Vec<ClassificationResult>, PoolError> {
        let jobs = self.jobs.as_ref().ok_or(PoolError::Closed)?;
        let (reply, result) = oneshot::channel();
        jobs.send(Job { pairs, reply })
            .await
            .map_err(|_| PoolError::Closed)?;

        match result.await {
            Ok(Ok(results)) => Ok(results),
            Ok(Err(e)) => Err(PoolError::Inference(e)),
            Err(_) => Err(PoolError::WorkerLost),
        }
    }

    /// Close the queue and join every worker. Queued batches still run.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.jobs.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("compute worker panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker<M: NliModel>(
    id: usize,
    mut classifier: BatchClassifier<M>,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
) {
    debug!(worker = id, labels = %classifier.labels(), "compute worker started");
    loop {
        let job = jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .blocking_recv();
        let Some(job) = job else { break };

        if job.reply.is_closed() {
            debug!(worker = id, size = job.pairs.len(), "skipping abandoned batch");
            continue;
        }

        let started = Instant::now();
        // A panic fails only this batch; the worker keeps serving.
        let result = panic::catch_unwind(AssertUnwindSafe(|| classifier.classify(&job.pairs)))
            .unwrap_or_else(|payload| {
                let reason = panic_message(payload.as_ref());
                error!(worker = id, size = job.pairs.len(), %reason, "forward pass panicked");
                Err(anyhow::anyhow!("forward pass panicked: {reason}"))
            });
        debug!(
            worker = id,
            size = job.pairs.len(),
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch classified"
        );
        let _ = job.reply.send(result);
    }
    debug!(worker = id, "compute worker stopped");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::tests::LexicalModel;
    use nli_core::LabelMap;

    fn start(workers: usize) -> WorkerPool {
        WorkerPool::start(workers, 8, |_| {
            BatchClassifier::new(LexicalModel::new(), LabelMap::ENTAILMENT_FIRST, 256)
        })
        .unwrap()
    }

    fn pairs(n: usize) -> Vec<Pair> {
        (0..n)
            .map(|i| Pair::new(format!("premise {i}"), format!("hypothesis {i}")))
            .collect()
    }

    #[tokio::test]
    async fn submit_returns_one_result_per_pair() {
        let pool = start(1);
        let results = pool.submit(pairs(5)).await.unwrap();
        assert_eq!(results.len(), 5);
    }

    #[tokio::test]
    async fn workers_run_batches_concurrently() {
        let pool = Arc::new(start(3));

        let mut tasks = Vec::new();
        for n in 1..=6 {
            let pool = Arc::clone(&pool);
            tasks.push(tokio::spawn(async move { pool.submit(pairs(n)).await }));
        }
        for (i, task) in tasks.into_iter().enumerate() {
            let results = task.await.unwrap().unwrap();
            assert_eq!(results.len(), i + 1);
        }
    }

    #[test]
    fn load_failure_stops_startup() {
        let err = WorkerPool::start(2, 4, |id| {
            if id == 1 {
                anyhow::bail!("weights missing");
            }
            BatchClassifier::new(LexicalModel::new(), LabelMap::ENTAILMENT_FIRST, 256)
        })
        .err()
        .unwrap();
        assert!(format!("{err:#}").contains("weights missing"), "{err:#}");
    }

    #[test]
    fn zero_workers_is_rejected() {
        let result = WorkerPool::start(0, 4, |_| {
            BatchClassifier::new(LexicalModel::new(), LabelMap::ENTAILMENT_FIRST, 256)
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn inference_errors_reach_the_caller() {
        struct Broken;
        impl NliModel for Broken {
            fn num_classes(&self) -> usize {
                3
            }
            fn forward(&mut self, _: &[(&str, &str)]) -> anyhow::Result<Vec<Vec<f32>>> {
                anyhow::bail!("session run failed")
            }
        }

        let pool = WorkerPool::start(1, 2, |_| {
            BatchClassifier::new(Broken, LabelMap::ENTAILMENT_FIRST, 256)
        })
        .unwrap();
        let err = pool.submit(pairs(2)).await.unwrap_err();
        assert!(matches!(err, PoolError::Inference(_)));
        assert!(err.to_string().contains("session run failed"));
    }

    /// Panics on its first forward pass, then behaves.
    struct PanicsOnce {
        panicked: bool,
    }

    impl NliModel for PanicsOnce {
        fn num_classes(&self) -> usize {
            3
        }
        fn forward(&mut self, pairs: &[(&str, &str)]) -> anyhow::Result<Vec<Vec<f32>>> {
            if !self.panicked {
                self.panicked = true;
                panic!("tensor shape mismatch");
            }
            Ok(vec![vec![0.0, 1.0, 0.0]; pairs.len()])
        }
    }

    #[tokio::test]
    async fn panic_fails_only_its_batch() {
        let pool = WorkerPool::start(1, 2, |_| {
            BatchClassifier::new(PanicsOnce { panicked: false }, LabelMap::ENTAILMENT_FIRST, 256)
        })
        .unwrap();

        let err = pool.submit(pairs(2)).await.unwrap_err();
        assert!(matches!(err, PoolError::Inference(_)), "{err}");
        assert!(err.to_string().contains("tensor shape mismatch"), "{err}");

        let results = pool.submit(pairs(3)).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    /// Sleeps on every forward pass and counts them.
    struct Slow {
        calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl NliModel for Slow {
        fn num_classes(&self) -> usize {
            3
        }
        fn forward(&mut self, pairs: &[(&str, &str)]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(300));
            Ok(vec![vec![0.0; 3]; pairs.len()])
        }
    }

    #[tokio::test]
    async fn abandoned_queued_batch_is_skipped() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let pool = Arc::new(
            WorkerPool::start(1, 4, move |_| {
                BatchClassifier::new(
                    Slow {
                        calls: Arc::clone(&counter),
                    },
                    LabelMap::ENTAILMENT_FIRST,
                    256,
                )
            })
            .unwrap(),
        );

        let busy = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.submit(pairs(1)).await })
        };
        // Let the worker pick up the first batch.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let queued = tokio::time::timeout(Duration::from_millis(20), pool.submit(pairs(1))).await;
        assert!(queued.is_err(), "second batch should still be queued");

        busy.await.unwrap().unwrap();
        // The worker has now seen the abandoned batch; a live one proves it moved on.
        pool.submit(pairs(1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2, "abandoned batch never ran");
    }

    #[tokio::test]
    async fn shutdown_joins_workers() {
        let pool = start(2);
        pool.submit(pairs(1)).await.unwrap();
        tokio::task::spawn_blocking(move || pool.shutdown())
            .await
            .unwrap();
    }
}
