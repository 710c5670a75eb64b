//! Serial execution lane for platform BLE calls.
//! Jobs run one at a time in submission order, so platform callbacks never
//! interleave.

use std::future::Future;
use std::pin::Pin;

use log::debug;
use tokio::sync::{mpsc, oneshot};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Clone)]
pub struct BleLane {
    jobs: mpsc::UnboundedSender<Job>,
}

impl BleLane {
    /// Spawns the lane task; must be called inside a tokio runtime.
    pub fn new() -> Self {
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = queue.recv().await {
                job.await;
            }
            debug!("BLE lane closed");
        });
        Self { jobs }
    }

    /// Queues a job without waiting for it.
    pub fn dispatch(&self, job: impl Future<Output = ()> + Send + 'static) {
        if self.jobs.send(Box::pin(job)).is_err() {
            debug!("BLE lane closed, dropping job");
        }
    }

    /// Queues a job and waits for its result. `None` if the lane is gone.
    pub async fn run<T: Send + 'static>(&self, job: impl Future<Output = T> + Send + 'static) -> Option<T> {
        let (reply, result) = oneshot::channel();
        self.dispatch(async move {
            let _ = reply.send(job.await);
        });
        result.await.ok()
    }
}
