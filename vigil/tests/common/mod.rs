#![allow(dead_code)]

use std::sync::Arc;

use vigil::{
    cluster::ClusterSubmitter,
    context::Resources,
    domain::{MemoryStudies, Session, Study},
    notify::MemoryMailer,
    settings::ExecutorSettings,
    EmbeddedScheduler, MemoryStore, Registry, Result, Scheduler,
};

pub struct Harness {
    pub store: MemoryStore,
    pub studies: MemoryStudies,
    pub mailer: MemoryMailer,
    pub embedded: EmbeddedScheduler,
    pub scheduler: Scheduler,
}

pub fn harness() -> Result<Harness> {
    harness_with(Registry::with_defaults()?)
}

pub fn harness_with(registry: Registry) -> Result<Harness> {
    harness_with_cluster(registry, ClusterSubmitter::new("echo", ""))
}

pub fn harness_with_cluster(registry: Registry, cluster: ClusterSubmitter) -> Result<Harness> {
    let store = MemoryStore::default();
    let studies = MemoryStudies::default();
    let mailer = MemoryMailer::default();
    let resources = Resources::new(
        Arc::new(studies.clone()),
        Arc::new(mailer.clone()),
        cluster,
    );
    let embedded = EmbeddedScheduler::new(
        Arc::new(store.clone()),
        registry,
        resources,
        &ExecutorSettings {
            pool_size: 2,
            poll_interval_ms: 20,
            batch_size: 10,
        },
    )?;
    let scheduler = Scheduler::from(embedded.clone());
    Ok(Harness {
        store,
        studies,
        mailer,
        embedded,
        scheduler,
    })
}

pub fn study(studies: &MemoryStudies, staff: &[&str]) -> Result<()> {
    studies.insert_study(Study {
        id: "ST1".to_string(),
        name: "Resting state".to_string(),
        staff_emails: staff.iter().map(|s| s.to_string()).collect(),
    })
}

pub fn session(studies: &MemoryStudies, label: &str, scan_count: u32) -> Result<Session> {
    let session = Session {
        scan_count,
        ..Session::new(label, "ST1")
    };
    studies.upsert_session(session.clone())?;
    Ok(session)
}
