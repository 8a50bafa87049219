use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    context,
    dispatch::{dispatch, Dispatched},
    error::{Error, Result},
    jobs::{JobArgs, JobHandler},
    scheduler::Scheduler,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn new(to: Vec<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to,
            subject: subject.into(),
            body: body.into(),
        }
    }

    fn to_args(&self) -> Result<JobArgs> {
        JobArgs::new()
            .kwarg("to", &self.to)?
            .kwarg("subject", &self.subject)?
            .kwarg("body", &self.body)
    }

    fn from_args(args: &JobArgs) -> Result<Self> {
        Ok(Self {
            to: args.required("to")?,
            subject: args.required("subject")?,
            body: args.required("body")?,
        })
    }
}

#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<()>;
}

/// Writes outgoing mail to the log, for deployments without a relay.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait::async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        info!(to = ?email.to, subject = %email.subject, body = %email.body, "email");
        Ok(())
    }
}

/// Keeps every sent email in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryMailer {
    outbox: Arc<Mutex<Vec<Email>>>,
}

impl MemoryMailer {
    pub fn sent(&self) -> Vec<Email> {
        self.outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        self.outbox
            .lock()
            .map_err(|e| Error::Poisoned(e.to_string()))?
            .push(email.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SendEmail;

#[async_trait::async_trait]
impl JobHandler for SendEmail {
    const NAME: &'static str = "notify.send_email";
    type Error = Error;

    #[instrument(skip(self, args))]
    async fn perform(&self, args: JobArgs) -> Result<()> {
        let email = Email::from_args(&args)?;
        context::current()?.mailer().send(&email).await
    }
}

/// Sends `email` from wherever the caller runs: immediately when this
/// process runs jobs, otherwise through the scheduler.
pub async fn schedule_email(scheduler: &Scheduler, email: &Email) -> Result<Dispatched> {
    dispatch::<SendEmail>(scheduler, email.to_args()?).await
}
