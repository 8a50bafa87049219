use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};

/// Submits scripts to the batch queue through its submission command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSubmitter {
    command: String,
    options: Vec<String>,
    job_name_flag: String,
    work_dir_flag: String,
}

/// What the submission command printed, typically the queue's job id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub stdout: String,
}

impl ClusterSubmitter {
    pub fn new(command: &str, options: &str) -> Self {
        Self {
            command: command.to_string(),
            options: options.split_whitespace().map(str::to_string).collect(),
            job_name_flag: "-N".to_string(),
            work_dir_flag: "-wd".to_string(),
        }
    }

    pub fn with_job_name_flag(mut self, flag: &str) -> Self {
        self.job_name_flag = flag.to_string();
        self
    }

    pub fn with_work_dir_flag(mut self, flag: &str) -> Self {
        self.work_dir_flag = flag.to_string();
        self
    }

    pub fn command_line(
        &self,
        script: &str,
        args: &[String],
        job_name: Option<&str>,
        work_dir: Option<&Path>,
    ) -> Vec<String> {
        let mut line = Vec::with_capacity(self.options.len() + args.len() + 6);
        line.push(self.command.clone());
        line.extend(self.options.iter().cloned());
        if let Some(name) = job_name {
            line.push(self.job_name_flag.clone());
            line.push(name.to_string());
        }
        if let Some(dir) = work_dir {
            line.push(self.work_dir_flag.clone());
            line.push(dir.display().to_string());
        }
        line.push(script.to_string());
        line.extend(args.iter().cloned());
        line
    }

    /// Runs the submission command and waits for it to exit. Only the
    /// submission is awaited; the batch job itself runs on the cluster.
    #[instrument(skip(self))]
    pub async fn submit_job(
        &self,
        script: &str,
        args: &[String],
        job_name: Option<&str>,
        work_dir: Option<&Path>,
    ) -> Result<Submission> {
        let line = self.command_line(script, args, job_name, work_dir);
        debug!(cmd = %line.join(" "), "running submission command");

        let output = Command::new(&line[0])
            .args(&line[1..])
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    warn!(command = %self.command, "submission command not found");
                }
                Error::Io(e)
            })?;

        if !output.status.success() {
            return Err(Error::ClusterSubmission {
                command: line.join(" "),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(stdout = %stdout, "submitted cluster job");
        Ok(Submission { stdout })
    }
}
