//! Process configuration, established once at startup.
//!
//! Values come from an optional TOML file overlaid with `VIGIL__*`
//! environment variables, e.g. `VIGIL__REMOTE__URL` or
//! `VIGIL__EXECUTOR__POOL_SIZE`.

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::{cluster::ClusterSubmitter, scheduler::Credentials, Result};

const ENV_PREFIX: &str = "VIGIL";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Run jobs in this process instead of forwarding them to a server.
    pub embedded: bool,
    pub remote: RemoteSettings,
    pub cluster: ClusterSettings,
    pub executor: ExecutorSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            embedded: true,
            remote: RemoteSettings::default(),
            cluster: ClusterSettings::default(),
            executor: ExecutorSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub url: Option<String>,
    #[serde(flatten)]
    pub credentials: Credentials,
    pub timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            url: None,
            credentials: Credentials::default(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    pub command: String,
    /// Whitespace-separated options passed before the script.
    pub options: String,
    pub job_name_flag: String,
    pub work_dir_flag: String,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            command: "qsub".to_string(),
            options: String::new(),
            job_name_flag: "-N".to_string(),
            work_dir_flag: "-wd".to_string(),
        }
    }
}

impl ClusterSettings {
    pub fn submitter(&self) -> ClusterSubmitter {
        ClusterSubmitter::new(&self.command, &self.options)
            .with_job_name_flag(&self.job_name_flag)
            .with_work_dir_flag(&self.work_dir_flag)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    pub pool_size: usize,
    pub poll_interval_ms: u64,
    pub batch_size: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            pool_size: 4,
            poll_interval_ms: 1000,
            batch_size: 100,
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

impl Settings {
    /// Loads settings from `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        Ok(builder
            .add_source(environment())
            .build()?
            .try_deserialize()?)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Ok(Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?)
    }
}
