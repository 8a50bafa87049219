//! Ambient execution context for job functions.
//!
//! Jobs run on executor tasks that have nothing in scope. The executor enters
//! a fresh [`AppContext`] scope around every invocation and the scope ends on
//! every exit path, so a handler can call [`current`] to reach the study
//! repository, the mailer, the cluster submitter and the scheduler itself.

use std::{future::Future, sync::Arc};

use crate::{
    cluster::ClusterSubmitter,
    domain::StudyRepository,
    error::{Error, Result},
    jobs::JobId,
    notify::Mailer,
    scheduler::Scheduler,
};

tokio::task_local! {
    static CURRENT: AppContext;
}

/// Shared services a job may touch, owned by the process running jobs.
#[derive(Clone)]
pub struct Resources {
    pub studies: Arc<dyn StudyRepository>,
    pub mailer: Arc<dyn Mailer>,
    pub cluster: ClusterSubmitter,
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resources")
            .field("cluster", &self.cluster)
            .finish()
    }
}

impl Resources {
    pub fn new(
        studies: Arc<dyn StudyRepository>,
        mailer: Arc<dyn Mailer>,
        cluster: ClusterSubmitter,
    ) -> Self {
        Self {
            studies,
            mailer,
            cluster,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppContext {
    pub resources: Resources,
    pub scheduler: Scheduler,
    pub job_id: JobId,
}

impl AppContext {
    pub(crate) fn new(resources: Resources, scheduler: Scheduler, job_id: JobId) -> Self {
        Self {
            resources,
            scheduler,
            job_id,
        }
    }

    pub fn studies(&self) -> &dyn StudyRepository {
        self.resources.studies.as_ref()
    }

    pub fn mailer(&self) -> &dyn Mailer {
        self.resources.mailer.as_ref()
    }

    pub fn cluster(&self) -> &ClusterSubmitter {
        &self.resources.cluster
    }
}

/// The context of the job running on this task.
pub fn current() -> Result<AppContext> {
    CURRENT.try_with(AppContext::clone).map_err(|_| Error::NoContext)
}

pub fn is_active() -> bool {
    CURRENT.try_with(|_| ()).is_ok()
}

pub(crate) async fn scope<F>(context: AppContext, f: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(context, f).await
}
