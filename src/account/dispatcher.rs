use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::error::{DeployerError, Result};

/// A unit of work submitted to the pool. Failures travel back through the
/// dispatcher's error channel.
pub type Job = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

/// Bounded worker pool used by the account deployer. `run` starts the
/// workers, `add_job` enqueues without blocking up to the queue depth, and
/// `stop` drains the queue and collects every error the jobs produced.
pub struct Dispatcher {
    tx: Option<mpsc::Sender<Job>>,
    rx: Option<mpsc::Receiver<Job>>,
    max_concurrent: usize,
    workers: Vec<JoinHandle<()>>,
    err_tx: mpsc::UnboundedSender<DeployerError>,
    err_rx: mpsc::UnboundedReceiver<DeployerError>,
}

impl Dispatcher {
    pub fn new(max_concurrent: usize, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        Self {
            tx: Some(tx),
            rx: Some(rx),
            max_concurrent: max_concurrent.max(1),
            workers: Vec::new(),
            err_tx,
            err_rx,
        }
    }

    /// Start the workers. Must be called exactly once before `add_job`.
    pub fn run(&mut self) {
        let Some(rx) = self.rx.take() else {
            return;
        };
        let rx = Arc::new(Mutex::new(rx));
        for _ in 0..self.max_concurrent {
            let rx = rx.clone();
            let err_tx = self.err_tx.clone();
            self.workers.push(tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else {
                        return;
                    };
                    if let Err(err) = job.await {
                        let _ = err_tx.send(err);
                    }
                }
            }));
        }
    }

    /// Enqueue a job. Suspends only when the queue is at capacity.
    pub async fn add_job(&self, job: Job) -> Result<()> {
        let Some(tx) = &self.tx else {
            return Err(DeployerError::Other(
                "dispatcher is already stopped".to_string(),
            ));
        };
        tx.send(job)
            .await
            .map_err(|_| DeployerError::Other("dispatcher workers are gone".to_string()))
    }

    /// Drain the queue, stop the workers, and return every collected error.
    pub async fn stop(mut self) -> Vec<DeployerError> {
        self.tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.await;
        }
        let mut errors = Vec::new();
        while let Ok(err) = self.err_rx.try_recv() {
            errors.push(err);
        }
        errors
    }

    /// Drain like [`Self::stop`], but reduce to the first error.
    pub async fn stop_first_error(self) -> Result<()> {
        let mut errors = self.stop().await;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.remove(0))
        }
    }
}
