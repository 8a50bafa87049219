use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use super::{Acknowledgement, Schedule};
use crate::{
    error::{Error, Result},
    jobs::{JobDefinition, Trigger},
    settings::RemoteSettings,
};

/// Username/password pair shared with the scheduler server.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Body of `POST /jobs`.
#[derive(Debug, Serialize)]
struct JobRequest<'a> {
    id: &'a str,
    func: &'a str,
    trigger: Trigger,
    run_date: String,
    args: &'a [Value],
    #[serde(skip_serializing_if = "no_kwargs")]
    kwargs: &'a Map<String, Value>,
}

fn no_kwargs(kwargs: &&Map<String, Value>) -> bool {
    kwargs.is_empty()
}

impl<'a> From<&'a JobDefinition> for JobRequest<'a> {
    fn from(job: &'a JobDefinition) -> Self {
        Self {
            id: job.id.as_str(),
            func: &job.func,
            trigger: job.trigger,
            run_date: job.run_date.to_rfc3339(),
            args: &job.args.args,
            kwargs: &job.args.kwargs,
        }
    }
}

/// Scheduler backend that forwards every job to a scheduler server.
///
/// Holds no job state of its own. Without a configured URL every job is
/// dropped with a warning instead of failing the caller.
#[derive(Debug, Clone)]
pub struct RemoteScheduler {
    http: reqwest::Client,
    base_url: Option<String>,
    credentials: Credentials,
}

impl RemoteScheduler {
    pub fn new(base_url: Option<String>, credentials: Credentials) -> Result<Self> {
        Self::with_timeout(base_url, credentials, Duration::from_secs(30))
    }

    pub fn with_timeout(
        base_url: Option<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    pub fn from_settings(settings: &RemoteSettings) -> Result<Self> {
        Self::with_timeout(
            settings.url.clone(),
            settings.credentials.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }
}

#[async_trait::async_trait]
impl Schedule for RemoteScheduler {
    #[instrument(skip(self, job), fields(job_id = %job.id, func = %job.func))]
    async fn add_job(&self, job: JobDefinition) -> Result<Acknowledgement> {
        let base_url = match &self.base_url {
            Some(url) => url,
            None => {
                warn!("no scheduler url configured, dropping job");
                return Ok(Acknowledgement::Dropped { id: job.id });
            }
        };

        let url = format!("{}/jobs", base_url);
        debug!(url = %url, run_date = %job.run_date, "submitting job");
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .json(&JobRequest::from(&job))
            .send()
            .await
            .map_err(|source| Error::SchedulerUnavailable {
                url: base_url.clone(),
                source,
            })?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let body = response
                    .text()
                    .await
                    .map_err(|source| Error::SchedulerUnavailable {
                        url: base_url.clone(),
                        source,
                    })?;
                debug!("job accepted");
                Ok(Acknowledgement::Accepted { id: job.id, body })
            }
            StatusCode::UNAUTHORIZED => Err(Error::SchedulerAuthentication {
                url: base_url.clone(),
            }),
            _ => {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|e| format!("<unreadable response body: {}>", e));
                Err(Error::SchedulerSubmission {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    async fn start(&self) -> Result<()> {
        info!(url = ?self.base_url, "remote scheduler needs no start");
        Ok(())
    }
}
