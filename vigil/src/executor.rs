use std::{num::NonZeroUsize, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use tokio::sync::{mpsc::Receiver, Mutex};
use tracing::{debug, error, instrument, trace, Instrument};

use crate::{
    context::{self, AppContext},
    error::{Error, ErrorHandler, ErrorHandlers, Result},
    jobs::JobDefinition,
    registry::Registry,
};

/// Runs jobs inside their ambient context and reports failures.
#[derive(Debug, Clone)]
pub(crate) struct Executor {
    pool_size: NonZeroUsize,
    registry: Arc<Registry>,
    error_handlers: ErrorHandlers,
}

impl Executor {
    pub(crate) fn new(
        pool_size: NonZeroUsize,
        registry: Registry,
        error_handlers: ErrorHandlers,
    ) -> Self {
        Self {
            pool_size,
            registry: Arc::new(registry),
            error_handlers,
        }
    }

    pub(crate) fn pool_size(&self) -> NonZeroUsize {
        self.pool_size
    }

    pub(crate) fn error_handlers(&self) -> &ErrorHandlers {
        &self.error_handlers
    }

    #[instrument(name = "execute_job", skip(self, job, context), fields(job_id = %job.id, func = %job.func))]
    pub(crate) async fn execute(&self, job: &JobDefinition, context: AppContext) -> Result<()> {
        let result = match self.registry.get(&job.func) {
            Some(handler) => {
                let run = AssertUnwindSafe(handler.perform(job)).catch_unwind();
                match context::scope(context, run).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::JobPanicked(job.clone())),
                }
            }
            None => Err(Error::NoHandler(job.clone())),
        };

        match &result {
            Ok(()) => debug!("job completed"),
            Err(e) => {
                error!("job failed: {}", e);
                self.error_handlers.job_failed(&job.id, &job.func, e);
            }
        }
        result
    }

    /// Spawns the fixed worker pool. Each worker takes the next queued job and
    /// hands it to `run`; workers exit once every sender is dropped.
    pub(crate) fn spawn_workers<F, Fut>(
        &self,
        queue: Receiver<JobDefinition>,
        run: F,
    ) -> Vec<tokio::task::JoinHandle<()>>
    where
        F: Fn(JobDefinition) -> Fut + Clone + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let queue = Arc::new(Mutex::new(queue));
        (0..self.pool_size.get())
            .map(|worker| {
                let queue = queue.clone();
                let run = run.clone();
                tokio::spawn(
                    async move {
                        loop {
                            let next = queue.lock().await.recv().await;
                            match next {
                                Some(job) => {
                                    trace!(job_id = %job.id, "worker picked up job");
                                    run(job).await;
                                }
                                None => break,
                            }
                        }
                        debug!("worker stopping");
                    }
                    .instrument(tracing::info_span!("executor_worker", worker)),
                )
            })
            .collect()
    }
}
