use crate::{
    jobs::{JobDefinition, JobId, JobRun},
    Error, Result,
};
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    num::NonZeroUsize,
    sync::{Arc, Mutex, MutexGuard},
};

#[derive(Debug, Default)]
struct Jobs {
    pending: HashMap<JobId, JobDefinition>,
    runs: HashMap<JobId, JobRun>,
}

#[derive(Debug, Clone, Default)]
pub struct Store {
    jobs: Arc<Mutex<Jobs>>,
}

impl Store {
    fn lock(&self) -> Result<MutexGuard<'_, Jobs>> {
        self.jobs.lock().map_err(|e| Error::Poisoned(e.to_string()))
    }
}

fn by_run_date(mut jobs: Vec<JobDefinition>) -> Vec<JobDefinition> {
    jobs.sort_by_key(|job| job.run_date);
    jobs
}

#[async_trait::async_trait]
impl super::JobStore for Store {
    async fn upsert(&self, job_def: &JobDefinition) -> Result<()> {
        self.lock()?
            .pending
            .insert(job_def.id.clone(), job_def.clone());
        Ok(())
    }

    async fn pull_due(
        &self,
        now: DateTime<Utc>,
        count: NonZeroUsize,
    ) -> Result<Vec<JobDefinition>> {
        let mut jobs = self.lock()?;
        let due = by_run_date(
            jobs.pending
                .values()
                .filter(|job| job.is_due(now))
                .cloned()
                .collect(),
        );
        let due = due.into_iter().take(count.get()).collect::<Vec<_>>();
        for job in &due {
            jobs.pending.remove(&job.id);
        }
        Ok(due)
    }

    async fn record_run(&self, run: &JobRun) -> Result<()> {
        self.lock()?.runs.insert(run.job_id.clone(), run.clone());
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<JobDefinition>> {
        Ok(self.lock()?.pending.get(id).cloned())
    }

    async fn pending(&self) -> Result<Vec<JobDefinition>> {
        Ok(by_run_date(self.lock()?.pending.values().cloned().collect()))
    }

    async fn last_run(&self, id: &JobId) -> Result<Option<JobRun>> {
        Ok(self.lock()?.runs.get(id).cloned())
    }
}
