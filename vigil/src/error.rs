use std::{
    fmt::Debug,
    sync::{Arc, Mutex},
};

use tracing::error;

use crate::jobs::{JobDefinition, JobId};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[cfg(feature = "backend-redis")]
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("handler already registered for name '{0}'")]
    HandlerAlreadyRegistered(&'static str),
    #[error("handler not found for job {0:?}")]
    NoHandler(JobDefinition),
    #[error("job {} ({}) failed: {}", .0.func, .0.id, .1)]
    JobFailed(JobDefinition, #[source] StdError),
    #[error("job {} ({}) panicked", .0.func, .0.id)]
    JobPanicked(JobDefinition),
    #[error("lock poisoned: {0}")]
    Poisoned(String),
    #[error("no execution context is active on this task")]
    NoContext,
    #[error("invalid job argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },
    #[error("scheduler at {url} is unavailable")]
    SchedulerUnavailable {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("scheduler at {url} rejected the configured credentials")]
    SchedulerAuthentication { url: String },
    #[error("scheduler rejected job with status {status}: {body}")]
    SchedulerSubmission { status: u16, body: String },
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error("cluster submission `{command}` exited with {status:?}: {stderr}")]
    ClusterSubmission {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("no notification recipients could be resolved for {target}")]
    NoRecipients { target: String },
    #[error("invalid monitor target {target}: {reason}")]
    InvalidTarget { target: String, reason: String },
    #[error("monitored session {label} no longer exists")]
    TargetMissing { label: String },
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) type StdError = Box<dyn std::error::Error + Send + Sync + 'static>;

impl Error {
    pub(crate) fn invalid_argument(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// The underlying error a job handler returned, if this is a job failure.
    pub fn job_cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::JobFailed(_, cause) => Some(cause.as_ref()),
            _ => None,
        }
    }
}

pub trait ErrorHandler: Send + Sync {
    fn job_failed(&self, job_id: &JobId, func: &str, error: &Error);
}

#[derive(Clone, Default)]
pub struct ErrorHandlers {
    handlers: Arc<Mutex<Vec<Box<dyn ErrorHandler>>>>,
}

impl std::fmt::Debug for ErrorHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandlers").finish()
    }
}

impl ErrorHandlers {
    pub(crate) fn add(&self, handler: impl ErrorHandler + 'static) {
        match self.handlers.lock() {
            Ok(mut handlers) => handlers.push(Box::new(handler)),
            Err(e) => error!("failed to lock handlers: {}", e),
        }
    }
}

impl ErrorHandler for ErrorHandlers {
    fn job_failed(&self, job_id: &JobId, func: &str, error: &Error) {
        match self.handlers.lock() {
            Ok(handlers) => {
                for handler in handlers.iter() {
                    handler.job_failed(job_id, func, error);
                }
            }
            Err(e) => {
                error!("failed to lock handlers: {}", e);
            }
        }
    }
}
