use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Utc;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time,
};
use tracing::{debug, error, info, instrument, warn, Instrument};

use super::{Acknowledgement, Schedule, Scheduler};
use crate::{
    backends::JobStore,
    context::{AppContext, Resources},
    error::{Error, ErrorHandler, Result},
    executor::Executor,
    jobs::{JobDefinition, JobRun},
    registry::Registry,
    settings::ExecutorSettings,
};

struct Running {
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

struct Inner {
    store: Arc<dyn JobStore>,
    executor: Executor,
    resources: Resources,
    poll_rate: Duration,
    batch_size: NonZeroUsize,
    running: Mutex<Option<Running>>,
}

/// Scheduler backend that owns the job store and runs jobs in this process.
#[derive(Clone)]
pub struct EmbeddedScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EmbeddedScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedScheduler")
            .field("poll_rate", &self.inner.poll_rate)
            .field("pool_size", &self.inner.executor.pool_size())
            .finish()
    }
}

fn non_zero(name: &str, value: usize) -> Result<NonZeroUsize> {
    NonZeroUsize::new(value).ok_or_else(|| Error::invalid_argument(name, "must be positive"))
}

impl EmbeddedScheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Registry,
        resources: Resources,
        settings: &ExecutorSettings,
    ) -> Result<Self> {
        if settings.poll_interval_ms == 0 {
            return Err(Error::invalid_argument(
                "executor.poll_interval_ms",
                "must be positive",
            ));
        }
        let executor = Executor::new(
            non_zero("executor.pool_size", settings.pool_size)?,
            registry,
            Default::default(),
        );
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                executor,
                resources,
                poll_rate: Duration::from_millis(settings.poll_interval_ms),
                batch_size: non_zero("executor.batch_size", settings.batch_size)?,
                running: Mutex::new(None),
            }),
        })
    }

    pub fn store(&self) -> &dyn JobStore {
        self.inner.store.as_ref()
    }

    pub fn add_error_handler(&self, handler: impl ErrorHandler + 'static) {
        self.inner.executor.error_handlers().add(handler);
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .running
            .lock()
            .map(|running| running.is_some())
            .unwrap_or(false)
    }

    fn context_for(&self, job: &JobDefinition) -> AppContext {
        AppContext::new(
            self.inner.resources.clone(),
            Scheduler::Embedded(self.clone()),
            job.id.clone(),
        )
    }

    /// Executes `job` on the calling task under a fresh context, without
    /// going through the store, and records the run.
    #[instrument(skip(self, job), fields(job_id = %job.id, func = %job.func))]
    pub async fn run_now(&self, job: JobDefinition) -> Result<()> {
        let result = self.inner.executor.execute(&job, self.context_for(&job)).await;
        self.record(&job, &result).await;
        result
    }

    /// Runs every job currently due on the calling task. Individual job
    /// failures are recorded and reported, not returned.
    #[instrument(skip(self))]
    pub async fn run_due(&self) -> Result<usize> {
        let mut ran = 0;
        loop {
            let jobs = self
                .inner
                .store
                .pull_due(Utc::now(), self.inner.batch_size)
                .await?;
            if jobs.is_empty() {
                break;
            }
            for job in jobs {
                let _ = self.run_now(job).await;
                ran += 1;
            }
        }
        Ok(ran)
    }

    async fn record(&self, job: &JobDefinition, result: &Result<()>) {
        if let Err(e) = self.inner.store.record_run(&JobRun::new(job, result)).await {
            error!(job_id = %job.id, "failed to record job run: {}", e);
        }
    }

    /// Stops polling and waits for the workers to finish queued jobs.
    pub async fn shutdown(&self) {
        let running = match self.inner.running.lock() {
            Ok(mut running) => running.take(),
            Err(e) => {
                error!("failed to lock scheduler state: {}", e);
                None
            }
        };
        if let Some(running) = running {
            let _ = running.shutdown_tx.send(());
            for handle in running.handles {
                if let Err(e) = handle.await {
                    warn!("scheduler task ended abnormally: {}", e);
                }
            }
            info!("embedded scheduler stopped");
        }
    }

    fn spawn_poller(
        &self,
        tx: mpsc::Sender<JobDefinition>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let rate = self.inner.poll_rate;
        let store = self.inner.store.clone();
        let batch_size = self.inner.batch_size;
        tokio::spawn(
            async move {
                let mut interval = time::interval(rate);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {}
                        _ = shutdown_rx.recv() => {
                            info!("poller stopping");
                            break;
                        }
                    }
                    match store.pull_due(Utc::now(), batch_size).await {
                        Ok(jobs) => {
                            for job in jobs {
                                debug!(job_id = %job.id, "dispatching due job");
                                if tx.send(job).await.is_err() {
                                    warn!("executor queue closed");
                                    return;
                                }
                            }
                        }
                        Err(e) => error!("failed to pull due jobs: {}", e),
                    }
                }
            }
            .instrument(tracing::info_span!("poller_loop_task")),
        )
    }
}

#[async_trait::async_trait]
impl Schedule for EmbeddedScheduler {
    #[instrument(skip(self, job), fields(job_id = %job.id, func = %job.func))]
    async fn add_job(&self, job: JobDefinition) -> Result<Acknowledgement> {
        debug!(run_date = %job.run_date, "storing job");
        self.inner.store.upsert(&job).await?;
        Ok(Acknowledgement::Stored { id: job.id })
    }

    async fn start(&self) -> Result<()> {
        let mut running = self
            .inner
            .running
            .lock()
            .map_err(|e| Error::Poisoned(e.to_string()))?;
        if running.is_some() {
            warn!("already started");
            return Ok(());
        }

        let pool_size = self.inner.executor.pool_size();
        let (tx, rx) = mpsc::channel(pool_size.get() * 2);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let scheduler = self.clone();
        let mut handles = self.inner.executor.spawn_workers(rx, move |job| {
            let scheduler = scheduler.clone();
            async move {
                let _ = scheduler.run_now(job).await;
            }
        });
        handles.push(self.spawn_poller(tx, shutdown_rx));

        *running = Some(Running {
            shutdown_tx,
            handles,
        });
        info!(pool_size = pool_size.get(), "embedded scheduler started");
        Ok(())
    }
}
