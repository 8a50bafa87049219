use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Study {
    pub id: String,
    pub name: String,
    /// Addresses notified when no explicit recipients are given.
    pub staff_emails: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub label: String,
    pub study_id: String,
    pub scan_count: u32,
    /// Set by a reviewer when a session is expected to have no scans.
    pub empty_override: bool,
    /// Pipelines that have recorded outputs for this session.
    pub pipeline_outputs: Vec<String>,
}

impl Session {
    pub fn new(label: impl Into<String>, study_id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            study_id: study_id.into(),
            scan_count: 0,
            empty_override: false,
            pipeline_outputs: Vec::new(),
        }
    }

    pub fn has_scans_or_override(&self) -> bool {
        self.scan_count > 0 || self.empty_override
    }

    pub fn has_outputs_for(&self, pipeline: &str) -> bool {
        self.pipeline_outputs.iter().any(|p| p == pipeline)
    }
}

/// Read access to study metadata as it is right now.
#[async_trait::async_trait]
pub trait StudyRepository: Send + Sync {
    async fn study(&self, id: &str) -> Result<Option<Study>>;
    async fn session(&self, label: &str) -> Result<Option<Session>>;
}

#[derive(Debug, Default)]
struct Records {
    studies: HashMap<String, Study>,
    sessions: HashMap<String, Session>,
}

/// In-process study metadata, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryStudies {
    records: Arc<RwLock<Records>>,
}

fn poisoned(e: impl ToString) -> Error {
    Error::Poisoned(e.to_string())
}

impl MemoryStudies {
    pub fn insert_study(&self, study: Study) -> Result<()> {
        self.records
            .write()
            .map_err(poisoned)?
            .studies
            .insert(study.id.clone(), study);
        Ok(())
    }

    pub fn upsert_session(&self, session: Session) -> Result<()> {
        self.records
            .write()
            .map_err(poisoned)?
            .sessions
            .insert(session.label.clone(), session);
        Ok(())
    }

    pub fn remove_session(&self, label: &str) -> Result<Option<Session>> {
        Ok(self
            .records
            .write()
            .map_err(poisoned)?
            .sessions
            .remove(label))
    }
}

#[async_trait::async_trait]
impl StudyRepository for MemoryStudies {
    async fn study(&self, id: &str) -> Result<Option<Study>> {
        Ok(self.records.read().map_err(poisoned)?.studies.get(id).cloned())
    }

    async fn session(&self, label: &str) -> Result<Option<Session>> {
        Ok(self
            .records
            .read()
            .map_err(poisoned)?
            .sessions
            .get(label)
            .cloned())
    }
}
