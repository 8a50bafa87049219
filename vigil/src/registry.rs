use std::{collections::HashMap, sync::Arc};

use tracing::{instrument, warn};

use crate::{
    error::{Error, Result, StdError},
    jobs::{JobDefinition, JobHandler},
    monitors::{pipeline, scans},
    notify,
};

#[async_trait::async_trait]
pub(crate) trait AnyJobHandler: Send + Sync {
    async fn perform(&self, job: &JobDefinition) -> Result<()>;
}

#[async_trait::async_trait]
impl<T, E> AnyJobHandler for T
where
    E: Into<StdError> + Send + Sync,
    T: JobHandler<Error = E>,
{
    #[instrument(skip(self))]
    async fn perform(&self, job: &JobDefinition) -> Result<()> {
        T::perform(self, job.args.clone())
            .await
            .map_err(|e| Error::JobFailed(job.clone(), e.into()))
    }
}

type HandlerFactory = Arc<dyn Fn() -> Box<dyn AnyJobHandler> + Send + Sync>;

/// Maps the stable names jobs are stored under to the code that runs them.
#[derive(Default, Clone)]
pub struct Registry {
    handlers_by_name: HashMap<String, HandlerFactory>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.handlers_by_name.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every handler this crate ships.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        registry.register::<scans::CheckScans>()?;
        registry.register::<pipeline::CheckPipelineOutputs>()?;
        registry.register::<pipeline::SubmitPipeline>()?;
        registry.register::<notify::SendEmail>()?;
        Ok(registry)
    }

    pub fn register<S>(&mut self) -> Result<()>
    where
        S: JobHandler,
    {
        if self.handlers_by_name.contains_key(S::NAME) {
            let err = Error::HandlerAlreadyRegistered(S::NAME);
            warn!("{}", err);
            return Err(err);
        }
        self.handlers_by_name.insert(
            S::NAME.to_string(),
            Arc::new(|| Box::new(S::default()) as Box<dyn AnyJobHandler>),
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers_by_name.contains_key(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<Box<dyn AnyJobHandler>> {
        self.handlers_by_name.get(name).map(|f| f())
    }
}
