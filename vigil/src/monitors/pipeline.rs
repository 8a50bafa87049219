//! Pipeline runs: submit to the cluster, then watch for outputs until a
//! deadline.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};

use super::{next_state, offset, resolve_recipients, schedule_at, MonitorState};
use crate::{
    context,
    dispatch::{dispatch, Dispatched},
    domain::{Session, StudyRepository},
    error::{Error, MonitorError, Result},
    jobs::{JobArgs, JobHandler},
    notify::Email,
    scheduler::Scheduler,
};

const DEFAULT_INTERVAL_MINUTES: u32 = 60;

/// A request to run `pipeline` for one session on the cluster.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub pipeline: String,
    pub script: String,
    pub script_args: Vec<String>,
    /// Falls back to the study's staff when empty.
    pub recipients: Vec<String>,
    /// How long outputs may take before someone is told.
    pub deadline_hours: u32,
    pub interval_minutes: u32,
}

impl PipelineRequest {
    pub fn new(pipeline: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            script: script.into(),
            script_args: Vec::new(),
            recipients: Vec::new(),
            deadline_hours: 24,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
        }
    }

    /// Validates the target and recipients, then dispatches the submission.
    #[instrument(skip(self, scheduler, studies, session), fields(session = %session.label, pipeline = %self.pipeline))]
    pub async fn submit(
        self,
        scheduler: &Scheduler,
        studies: &dyn StudyRepository,
        session: &Session,
    ) -> Result<Dispatched> {
        offset(
            Utc::now(),
            Duration::hours(self.deadline_hours as i64),
            "deadline_hours",
        )?;
        let recipients = resolve_recipients(studies, session, self.recipients).await?;
        let args = JobArgs::new()
            .arg(&session.label)?
            .arg(&self.pipeline)?
            .kwarg("script", &self.script)?
            .kwarg("script_args", &self.script_args)?
            .kwarg("recipients", recipients)?
            .kwarg("deadline_hours", self.deadline_hours)?
            .kwarg("interval_minutes", self.interval_minutes)?;
        dispatch::<SubmitPipeline>(scheduler, args).await
    }
}

/// Submits the pipeline script and arms the output monitor.
#[derive(Debug, Default)]
pub struct SubmitPipeline;

#[async_trait::async_trait]
impl JobHandler for SubmitPipeline {
    const NAME: &'static str = "pipelines.submit";
    type Error = Error;

    #[instrument(skip(self, args))]
    async fn perform(&self, args: JobArgs) -> Result<()> {
        let label: String = args.positional(0)?;
        let pipeline: String = args.positional(1)?;
        let script: String = args.required("script")?;
        let script_args: Vec<String> = args.keyword("script_args")?.unwrap_or_default();
        let recipients: Vec<String> = args.required("recipients")?;
        let deadline_hours: u32 = args.required("deadline_hours")?;
        let interval_minutes: u32 = args
            .keyword("interval_minutes")?
            .unwrap_or(DEFAULT_INTERVAL_MINUTES);

        let now = Utc::now();
        let deadline = offset(now, Duration::hours(deadline_hours as i64), "deadline_hours")?;

        let ctx = context::current()?;
        let job_name = format!("{}_{}", pipeline, label);
        let submission = ctx
            .cluster()
            .submit_job(&script, &script_args, Some(&job_name), None)
            .await?;
        info!(session = %label, %pipeline, cluster_job = %submission.stdout, "pipeline submitted");

        let monitor = JobArgs::new()
            .arg(&label)?
            .arg(&pipeline)?
            .kwarg("recipients", recipients)?
            .kwarg("deadline", deadline)?
            .kwarg("interval_minutes", interval_minutes)?;
        let first_check = now
            .checked_add_signed(Duration::minutes(interval_minutes as i64))
            .map_or(deadline, |check| std::cmp::min(check, deadline));
        schedule_at::<CheckPipelineOutputs>(&ctx.scheduler, monitor, None, first_check).await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CheckPipelineOutputs;

#[async_trait::async_trait]
impl JobHandler for CheckPipelineOutputs {
    const NAME: &'static str = "monitors.check_pipeline_outputs";
    type Error = Error;

    #[instrument(skip(self, args))]
    async fn perform(&self, args: JobArgs) -> Result<()> {
        let label: String = args.positional(0)?;
        let pipeline: String = args.positional(1)?;
        let recipients: Vec<String> = args.required("recipients")?;
        let deadline: DateTime<Utc> = args.required("deadline")?;
        let interval = Duration::minutes(
            args.keyword::<u32>("interval_minutes")?
                .unwrap_or(DEFAULT_INTERVAL_MINUTES) as i64,
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
        match next_state(session.has_outputs_for(&pipeline), now, Some(deadline), interval) {
            MonitorState::Resolved => {
                info!(session = %label, %pipeline, "pipeline outputs present");
            }
            MonitorState::Rearmed { run_date } => {
                info!(session = %label, %pipeline, %run_date, "outputs missing, checking again");
                schedule_at::<CheckPipelineOutputs>(&ctx.scheduler, args, None, run_date).await?;
            }
            MonitorState::Expired => {
                info!(session = %label, %pipeline, "outputs missing at deadline, notifying");
                let email = Email::new(
                    recipients,
                    format!("Pipeline {} produced no outputs for {}", pipeline, label),
                    format!(
                        "Pipeline {} was submitted for session {} but no outputs were \
                         recorded by {}. Check the cluster job logs.",
                        pipeline,
                        label,
                        deadline.to_rfc3339()
                    ),
                );
                ctx.mailer().send(&email).await?;
            }
        }
        Ok(())
    }
}
