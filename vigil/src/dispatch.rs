use chrono::Utc;
use tracing::{debug, instrument};

use crate::{
    error::Result,
    jobs::{JobArgs, JobDefinition, JobHandler},
    scheduler::{Acknowledgement, Schedule, Scheduler},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// Ran to completion on the calling task.
    Ran,
    /// Handed to the scheduler to run as soon as possible.
    Scheduled(Acknowledgement),
}

/// Runs `H` with `args` now if this process runs jobs itself, otherwise
/// schedules it with a run date of now so it executes where the context
/// lives.
#[instrument(skip(scheduler, args), fields(func = H::NAME))]
pub async fn dispatch<H: JobHandler>(scheduler: &Scheduler, args: JobArgs) -> Result<Dispatched> {
    let job = JobDefinition::for_handler::<H>(None, Utc::now(), args);
    match scheduler {
        Scheduler::Embedded(embedded) => {
            debug!(job_id = %job.id(), "running inline");
            embedded.run_now(job).await?;
            Ok(Dispatched::Ran)
        }
        Scheduler::Remote(_) => {
            debug!(job_id = %job.id(), "deferring to scheduler");
            Ok(Dispatched::Scheduled(scheduler.add_job(job).await?))
        }
    }
}
