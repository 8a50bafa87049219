//! Scan-arrival monitor: notify when a session still has no scans.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};

use super::{add_monitor, next_state, resolve_recipients, schedule_at, Delay, MonitorState};
use crate::{
    context,
    domain::{Session, StudyRepository},
    error::{Error, MonitorError, Result},
    jobs::{JobArgs, JobHandler, JobId},
    notify::Email,
    scheduler::{Acknowledgement, Scheduler},
};

const DEFAULT_INTERVAL_HOURS: u32 = 24;

/// Arms a scan check for one session.
#[derive(Debug, Clone, Default)]
pub struct ScanMonitor {
    /// Falls back to the study's staff when empty.
    pub recipients: Vec<String>,
    pub delay: Delay,
    /// Keep re-checking until this long after arming; one check when unset.
    pub keep_checking_for: Option<Delay>,
    pub interval_hours: Option<u32>,
    pub job_id: Option<JobId>,
}

impl ScanMonitor {
    pub fn after(delay: Delay) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn notify(mut self, recipients: Vec<String>) -> Self {
        self.recipients = recipients;
        self
    }

    pub fn until(mut self, window: Delay, interval_hours: u32) -> Self {
        self.keep_checking_for = Some(window);
        self.interval_hours = Some(interval_hours);
        self
    }

    #[instrument(skip(self, scheduler, studies, session), fields(session = %session.label))]
    pub async fn arm(
        self,
        scheduler: &Scheduler,
        studies: &dyn StudyRepository,
        session: &Session,
    ) -> Result<Acknowledgement> {
        let recipients = resolve_recipients(studies, session, self.recipients).await?;
        let mut args = JobArgs::new()
            .arg(&session.label)?
            .arg(1)?
            .kwarg("recipients", recipients)?;
        if let Some(window) = self.keep_checking_for {
            args = args.kwarg("deadline", window.after(Utc::now())?)?;
        }
        if let Some(hours) = self.interval_hours {
            args = args.kwarg("interval_hours", hours)?;
        }
        add_monitor::<CheckScans>(scheduler, args, self.job_id, self.delay).await
    }
}

#[derive(Debug, Default)]
pub struct CheckScans;

#[async_trait::async_trait]
impl JobHandler for CheckScans {
    const NAME: &'static str = "monitors.check_scans";
    type Error = Error;

    #[instrument(skip(self, args))]
    async fn perform(&self, args: JobArgs) -> Result<()> {
        let label: String = args.positional(0)?;
        let attempt: u32 = args.positional(1)?;
        let recipients: Vec<String> = args.required("recipients")?;
        let deadline: Option<DateTime<Utc>> = args.keyword("deadline")?;
        let interval = Duration::hours(
            args.keyword::<u32>("interval_hours")?
                .unwrap_or(DEFAULT_INTERVAL_HOURS) as i64,
        );

        let ctx = context::current()?;
        let session = ctx
            .studies()
            .session(&label)
            .await?
            .ok_or_else(|| MonitorError::TargetMissing {
                label: label.clone(),
            })?;

        let now = Utc::now();
        match next_state(session.has_scans_or_override(), now, deadline, interval) {
            MonitorState::Resolved => {
                info!(session = %label, attempt, "scans present");
            }
            MonitorState::Rearmed { run_date } => {
                info!(session = %label, attempt, %run_date, "no scans yet, checking again");
                let mut next = args.clone();
                next.args[1] = (attempt + 1).into();
                schedule_at::<CheckScans>(&ctx.scheduler, next, None, run_date).await?;
            }
            MonitorState::Expired => {
                info!(session = %label, attempt, "no scans, notifying");
                let email = Email::new(
                    recipients,
                    format!("No scans found for session {}", label),
                    format!(
                        "Session {} (study {}) still has no scans after {} check(s). \
                         Upload the scans or mark the session as intentionally empty.",
                        label, session.study_id, attempt
                    ),
                );
                ctx.mailer().send(&email).await?;
            }
        }
        Ok(())
    }
}
