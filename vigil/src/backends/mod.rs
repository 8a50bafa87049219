pub(crate) mod memory;
#[cfg(feature = "backend-redis")]
pub(crate) mod redis;

use chrono::{DateTime, Utc};

use crate::{
    jobs::{JobDefinition, JobId, JobRun},
    Result,
};
use std::num::NonZeroUsize;

/// Durable, time-indexed storage for pending jobs and their last run.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts the job, replacing any pending job with the same id.
    async fn upsert(&self, job_def: &JobDefinition) -> Result<()>;
    /// Removes and returns up to `count` jobs due at `now`, earliest first.
    async fn pull_due(&self, now: DateTime<Utc>, count: NonZeroUsize)
        -> Result<Vec<JobDefinition>>;
    async fn record_run(&self, run: &JobRun) -> Result<()>;
    async fn get(&self, id: &JobId) -> Result<Option<JobDefinition>>;
    async fn pending(&self) -> Result<Vec<JobDefinition>>;
    async fn last_run(&self, id: &JobId) -> Result<Option<JobRun>>;
}
