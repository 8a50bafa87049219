use crate::error::{Error, Result, StdError};
use chrono::{DateTime, Utc};
use nanoid::nanoid;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// A function that can be scheduled by name.
///
/// `NAME` is the stable key the job is stored and transmitted under, so it
/// must not change once jobs referencing it exist. The handler reaches
/// shared state through [`crate::context::current`].
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync + Default + 'static {
    const NAME: &'static str;
    type Error: Into<StdError> + Send + Sync;

    async fn perform(&self, args: JobArgs) -> std::result::Result<(), Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}", self.0))
    }
}

impl JobId {
    pub fn random() -> Self {
        Self(nanoid!())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> From<S> for JobId
where
    S: Into<String>,
{
    fn from(s: S) -> Self {
        Self(s.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Date,
}

/// Wire-transmissible job arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobArgs {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl JobArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Serialize) -> Result<Self> {
        self.args.push(serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn kwarg(mut self, name: &str, value: impl Serialize) -> Result<Self> {
        self.kwargs
            .insert(name.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn positional<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let name = format!("args[{}]", index);
        let value = self
            .args
            .get(index)
            .ok_or_else(|| Error::invalid_argument(&name, "missing"))?;
        serde_json::from_value(value.clone()).map_err(|e| Error::invalid_argument(name, e))
    }

    pub fn keyword<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.kwargs.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| Error::invalid_argument(name, e)),
        }
    }

    pub fn required<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        self.keyword(name)?
            .ok_or_else(|| Error::invalid_argument(name, "missing"))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub(crate) id: JobId,
    pub(crate) func: String,
    pub(crate) trigger: Trigger,
    pub(crate) run_date: DateTime<Utc>,
    #[serde(flatten)]
    pub(crate) args: JobArgs,
    enqueued_at: DateTime<Utc>,
}

impl std::fmt::Debug for JobDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDefinition")
            .field("id", &self.id)
            .field("func", &self.func)
            .field("run_date", &self.run_date)
            .field("enqueued_at", &self.enqueued_at)
            .finish()
    }
}

impl JobDefinition {
    /// A random id is generated when `id` is `None`; a caller-supplied id
    /// replaces any stored job with the same id.
    pub fn new<N>(id: Option<JobId>, func: N, run_date: DateTime<Utc>, args: JobArgs) -> Self
    where
        N: Into<String>,
    {
        Self {
            id: id.unwrap_or_else(JobId::random),
            func: func.into(),
            trigger: Trigger::Date,
            run_date,
            args,
            enqueued_at: Utc::now(),
        }
    }

    pub fn for_handler<H: JobHandler>(
        id: Option<JobId>,
        run_date: DateTime<Utc>,
        args: JobArgs,
    ) -> Self {
        Self::new(id, H::NAME, run_date, args)
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn func(&self) -> &str {
        &self.func
    }

    pub fn run_date(&self) -> DateTime<Utc> {
        self.run_date
    }

    pub fn args(&self) -> &JobArgs {
        &self.args
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.run_date <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub job_id: JobId,
    pub func: String,
    pub finished_at: DateTime<Utc>,
    pub outcome: JobOutcome,
}

impl JobRun {
    pub(crate) fn new(job: &JobDefinition, result: &Result<()>) -> Self {
        let outcome = match result {
            Ok(()) => JobOutcome::Succeeded,
            Err(e) => JobOutcome::Failed(e.to_string()),
        };
        Self {
            job_id: job.id.clone(),
            func: job.func.clone(),
            finished_at: Utc::now(),
            outcome,
        }
    }

    pub fn failed(&self) -> bool {
        matches!(self.outcome, JobOutcome::Failed(_))
    }
}
