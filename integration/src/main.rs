use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use vigil::{
    context::Resources,
    domain::{MemoryStudies, Session, Study},
    monitors::{scans::ScanMonitor, Delay},
    notify::LogMailer,
    MemoryStore, Registry, Schedule, Scheduler, Settings,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = std::env::args().nth(1).map(PathBuf::from);
    let settings = Settings::load(path.as_deref())?;

    let studies = MemoryStudies::default();
    studies.insert_study(Study {
        id: "ST1".to_string(),
        name: "Resting state".to_string(),
        staff_emails: vec!["coordinator@example.org".to_string()],
    })?;
    let session = Session::new("SESSION01", "ST1");
    studies.upsert_session(session.clone())?;

    let resources = Resources::new(
        Arc::new(studies.clone()),
        Arc::new(LogMailer),
        settings.cluster.submitter(),
    );
    let scheduler = Scheduler::from_settings(
        &settings,
        Arc::new(MemoryStore::default()),
        Registry::with_defaults()?,
        resources,
    )?;
    scheduler.start().await?;

    let ack = ScanMonitor::after(Delay::now())
        .arm(&scheduler, &studies, &session)
        .await?;
    tracing::info!(job_id = %ack.id(), "armed scan monitor");

    tokio::time::sleep(Duration::from_secs(3)).await;
    if let Scheduler::Embedded(embedded) = &scheduler {
        embedded.shutdown().await;
    }
    Ok(())
}
