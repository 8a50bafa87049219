mod backends;
pub mod cluster;
pub mod context;
mod dispatch;
pub mod domain;
mod error;
mod executor;
mod jobs;
pub mod monitors;
pub mod notify;
mod registry;
mod scheduler;
pub mod settings;

pub use async_trait::async_trait;
#[cfg(feature = "backend-redis")]
pub use backends::redis::Store as RedisStore;
pub use backends::{memory::Store as MemoryStore, JobStore};
pub use dispatch::{dispatch, Dispatched};
pub use error::{Error, ErrorHandler, MonitorError, Result};
pub use jobs::{JobArgs, JobDefinition, JobHandler, JobId, JobOutcome, JobRun, Trigger};
pub use registry::Registry;
pub use scheduler::{
    Acknowledgement, Credentials, EmbeddedScheduler, RemoteScheduler, Schedule, Scheduler,
};
pub use settings::Settings;
