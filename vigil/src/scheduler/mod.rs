pub(crate) mod embedded;
pub(crate) mod remote;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::{
    backends::JobStore,
    context::Resources,
    jobs::{JobArgs, JobDefinition, JobHandler, JobId},
    registry::Registry,
    settings::Settings,
    Result,
};

pub use embedded::EmbeddedScheduler;
pub use remote::{Credentials, RemoteScheduler};

/// What a backend returns once it has taken a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Persisted in the local job store.
    Stored { id: JobId },
    /// Accepted by a remote scheduler; `body` is its raw response.
    Accepted { id: JobId, body: String },
    /// No scheduler is configured for this process; the job was discarded.
    Dropped { id: JobId },
}

impl Acknowledgement {
    pub fn id(&self) -> &JobId {
        match self {
            Self::Stored { id } | Self::Accepted { id, .. } | Self::Dropped { id } => id,
        }
    }
}

/// The contract both scheduler backends implement.
#[async_trait::async_trait]
pub trait Schedule: Send + Sync {
    async fn add_job(&self, job: JobDefinition) -> Result<Acknowledgement>;
    /// Idempotent; starting an already started scheduler does nothing.
    async fn start(&self) -> Result<()>;
}

/// The process-wide scheduler, constructed once at startup and passed to
/// everything that schedules work.
#[derive(Debug, Clone)]
pub enum Scheduler {
    Embedded(EmbeddedScheduler),
    Remote(RemoteScheduler),
}

impl Scheduler {
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn JobStore>,
        registry: Registry,
        resources: Resources,
    ) -> Result<Self> {
        if settings.embedded {
            info!("using embedded scheduler");
            Ok(Self::Embedded(EmbeddedScheduler::new(
                store,
                registry,
                resources,
                &settings.executor,
            )?))
        } else {
            info!(url = ?settings.remote.url, "using remote scheduler");
            Ok(Self::Remote(RemoteScheduler::from_settings(&settings.remote)?))
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self, Self::Embedded(_))
    }

    pub async fn add_job_for<H: JobHandler>(
        &self,
        id: Option<JobId>,
        run_date: DateTime<Utc>,
        args: JobArgs,
    ) -> Result<Acknowledgement> {
        self.add_job(JobDefinition::for_handler::<H>(id, run_date, args))
            .await
    }
}

#[async_trait::async_trait]
impl Schedule for Scheduler {
    async fn add_job(&self, job: JobDefinition) -> Result<Acknowledgement> {
        match self {
            Self::Embedded(scheduler) => scheduler.add_job(job).await,
            Self::Remote(scheduler) => scheduler.add_job(job).await,
        }
    }

    async fn start(&self) -> Result<()> {
        match self {
            Self::Embedded(scheduler) => scheduler.start().await,
            Self::Remote(scheduler) => scheduler.start().await,
        }
    }
}

impl From<EmbeddedScheduler> for Scheduler {
    fn from(scheduler: EmbeddedScheduler) -> Self {
        Self::Embedded(scheduler)
    }
}

impl From<RemoteScheduler> for Scheduler {
    fn from(scheduler: RemoteScheduler) -> Self {
        Self::Remote(scheduler)
    }
}
