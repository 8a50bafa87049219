//! Monitors: check a condition later, re-check until a deadline, and notify
//! when it never resolves.
//!
//! A monitor is nothing but a chain of one-shot jobs. Each firing evaluates
//! the condition against current state and [`next_state`] decides whether
//! the chain ends silently, re-arms, or expires with a notification.

pub mod pipeline;
pub mod scans;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument};

use crate::{
    domain::{Session, StudyRepository},
    error::{Error, MonitorError, Result},
    jobs::{JobArgs, JobHandler, JobId},
    scheduler::{Acknowledgement, Scheduler},
};

/// A relative offset from now. All parts default to zero, which means
/// "as soon as possible".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delay {
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
}

impl Delay {
    pub fn now() -> Self {
        Self::default()
    }

    pub fn days(days: u32) -> Self {
        Self {
            days,
            ..Self::default()
        }
    }

    pub fn hours(hours: u32) -> Self {
        Self {
            hours,
            ..Self::default()
        }
    }

    pub fn minutes(minutes: u32) -> Self {
        Self {
            minutes,
            ..Self::default()
        }
    }

    pub fn and_hours(self, hours: u32) -> Self {
        Self { hours, ..self }
    }

    pub fn and_minutes(self, minutes: u32) -> Self {
        Self { minutes, ..self }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::days(self.days as i64)
            + Duration::hours(self.hours as i64)
            + Duration::minutes(self.minutes as i64)
    }

    /// `now` plus this delay; fails when the result is past chrono's range.
    pub fn after(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        offset(now, self.as_duration(), "delay")
    }
}

pub(crate) fn offset(
    now: DateTime<Utc>,
    by: Duration,
    name: &str,
) -> Result<DateTime<Utc>> {
    now.checked_add_signed(by).ok_or_else(|| {
        Error::invalid_argument(name, format!("{} after {} is out of range", by, now))
    })
}

/// Schedules `H` to run after `delay`. A caller-supplied `job_id` makes the
/// call idempotent: re-adding the same id replaces the earlier job.
pub async fn add_monitor<H: JobHandler>(
    scheduler: &Scheduler,
    args: JobArgs,
    job_id: Option<JobId>,
    delay: Delay,
) -> Result<Acknowledgement> {
    schedule_at::<H>(scheduler, args, job_id, delay.after(Utc::now())?).await
}

#[instrument(skip(scheduler, args), fields(func = H::NAME))]
pub async fn schedule_at<H: JobHandler>(
    scheduler: &Scheduler,
    args: JobArgs,
    job_id: Option<JobId>,
    run_date: DateTime<Utc>,
) -> Result<Acknowledgement> {
    debug!(%run_date, "arming monitor");
    scheduler.add_job_for::<H>(job_id, run_date, args).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Resolved,
    Rearmed { run_date: DateTime<Utc> },
    Expired,
}

/// Decides what a monitor does after a firing. Re-armed run dates are
/// capped at the deadline, so the last check happens at the deadline and
/// nothing is ever scheduled past it.
pub fn next_state(
    satisfied: bool,
    now: DateTime<Utc>,
    deadline: Option<DateTime<Utc>>,
    interval: Duration,
) -> MonitorState {
    if satisfied {
        return MonitorState::Resolved;
    }
    match deadline {
        Some(deadline) if now < deadline => MonitorState::Rearmed {
            // an interval too large to add lands on the deadline
            run_date: now
                .checked_add_signed(interval)
                .map_or(deadline, |next| std::cmp::min(next, deadline)),
        },
        _ => MonitorState::Expired,
    }
}

/// Explicit recipients win; otherwise the staff of the session's study.
pub(crate) async fn resolve_recipients(
    studies: &dyn StudyRepository,
    session: &Session,
    explicit: Vec<String>,
) -> Result<Vec<String>> {
    let target = format!("session {}", session.label);
    let study = studies
        .study(&session.study_id)
        .await?
        .ok_or_else(|| MonitorError::InvalidTarget {
            target: target.clone(),
            reason: format!("study {} does not exist", session.study_id),
        })?;

    let recipients = if explicit.is_empty() {
        study.staff_emails
    } else {
        explicit
    };
    if recipients.is_empty() {
        return Err(MonitorError::NoRecipients { target }.into());
    }
    Ok(recipients)
}
