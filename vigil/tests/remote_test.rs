use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use test_env_log::test as logtest;
use vigil::{
    dispatch,
    monitors::{add_monitor, scans::CheckScans, Delay},
    notify::{schedule_email, Email, SendEmail},
    Acknowledgement, Credentials, Dispatched, Error, JobArgs, JobDefinition, JobId,
    RemoteScheduler, Schedule, Scheduler,
};
use wiremock::{
    matchers::{basic_auth, body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn credentials() -> Credentials {
    Credentials::new("dashboard", "secret")
}

fn scan_job(id: &str) -> Result<JobDefinition> {
    Ok(JobDefinition::new(
        Some(JobId::from(id)),
        "monitors.check_scans",
        Utc::now() + Duration::days(2),
        JobArgs::new()
            .arg("SESSION01")?
            .arg(1)?
            .kwarg("recipients", vec!["a@x.org"])?,
    ))
}

async fn respond_with(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&server)
        .await;
    server
}

/// Serves one request with `status_line`, promising a body it never sends.
async fn serve_truncated(status_line: &'static str) -> Result<String> {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}", listener.local_addr()?);
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await?;
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let read = socket.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            request.extend_from_slice(&buf[..read]);
            let text = String::from_utf8_lossy(&request);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
        }
        let response = format!("{}\r\ncontent-length: 64\r\n\r\ncut", status_line);
        socket.write_all(response.as_bytes()).await?;
        socket.shutdown().await?;
        Ok::<_, std::io::Error>(())
    });
    Ok(url)
}

async fn submitted_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| request.body_json::<Value>().unwrap())
        .collect()
}

#[logtest(tokio::test)]
async fn accepted_job_returns_raw_acknowledgement() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .and(basic_auth("dashboard", "secret"))
        .and(body_partial_json(json!({
            "id": "scan-SESSION01",
            "func": "monitors.check_scans",
            "trigger": "date",
            "args": ["SESSION01", 1],
            "kwargs": {"recipients": ["a@x.org"]},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"queued": true}"#))
        .expect(1)
        .mount(&server)
        .await;

    let client = RemoteScheduler::new(Some(server.uri()), credentials())?;
    let ack = client.add_job(scan_job("scan-SESSION01")?).await?;

    assert_eq!(
        ack,
        Acknowledgement::Accepted {
            id: JobId::from("scan-SESSION01"),
            body: r#"{"queued": true}"#.to_string(),
        }
    );
    Ok(())
}

#[logtest(tokio::test)]
async fn unauthorized_is_an_authentication_error() -> Result<()> {
    let server = respond_with(401, "bad credentials").await;
    let client = RemoteScheduler::new(Some(server.uri()), credentials())?;

    let err = client.add_job(scan_job("a")?).await.unwrap_err();
    assert!(matches!(err, Error::SchedulerAuthentication { .. }), "{:?}", err);
    Ok(())
}

#[logtest(tokio::test)]
async fn unauthorized_with_broken_body_is_still_an_authentication_error() -> Result<()> {
    let url = serve_truncated("HTTP/1.1 401 Unauthorized").await?;
    let client = RemoteScheduler::new(Some(url), credentials())?;

    let err = client.add_job(scan_job("a")?).await.unwrap_err();
    assert!(matches!(err, Error::SchedulerAuthentication { .. }), "{:?}", err);
    Ok(())
}

#[logtest(tokio::test)]
async fn rejection_with_broken_body_keeps_its_status() -> Result<()> {
    let url = serve_truncated("HTTP/1.1 503 Service Unavailable").await?;
    let client = RemoteScheduler::new(Some(url), credentials())?;

    let err = client.add_job(scan_job("a")?).await.unwrap_err();
    match err {
        Error::SchedulerSubmission { status, .. } => assert_eq!(status, 503),
        other => panic!("unexpected error {:?}", other),
    }
    Ok(())
}

#[logtest(tokio::test)]
async fn server_error_is_a_submission_error() -> Result<()> {
    let server = respond_with(500, "scheduler exploded").await;
    let client = RemoteScheduler::new(Some(server.uri()), credentials())?;

    let err = client.add_job(scan_job("a")?).await.unwrap_err();
    match &err {
        Error::SchedulerSubmission { status, body } => {
            assert_eq!(*status, 500);
            assert_eq!(body, "scheduler exploded");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(err.to_string().contains("500"));
    Ok(())
}

#[logtest(tokio::test)]
async fn unreachable_server_is_unavailable() -> Result<()> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let url = format!("http://{}", listener.local_addr()?);
    drop(listener);

    let client = RemoteScheduler::new(Some(url.clone()), credentials())?;
    let err = client.add_job(scan_job("a")?).await.unwrap_err();

    match err {
        Error::SchedulerUnavailable { url: target, .. } => assert_eq!(target, url),
        other => panic!("unexpected error {:?}", other),
    }
    Ok(())
}

#[logtest(tokio::test)]
async fn unconfigured_client_drops_jobs_without_error() -> Result<()> {
    let client = RemoteScheduler::new(None, Credentials::default())?;
    client.start().await?;

    for job in [
        scan_job("a")?,
        JobDefinition::new(None, "notify.send_email", Utc::now(), JobArgs::new()),
        JobDefinition::new(None, "anything", Utc::now() - Duration::days(1), JobArgs::new()),
    ] {
        let id = job.id().clone();
        assert_eq!(client.add_job(job).await?, Acknowledgement::Dropped { id });
    }
    Ok(())
}

#[logtest(tokio::test)]
async fn monitor_run_date_travels_as_timestamp() -> Result<()> {
    let server = respond_with(200, "ok").await;
    let scheduler = Scheduler::from(RemoteScheduler::new(Some(server.uri()), credentials())?);

    let before = Utc::now();
    add_monitor::<CheckScans>(
        &scheduler,
        JobArgs::new().arg("SESSION01")?.arg(1)?,
        None,
        Delay::days(2),
    )
    .await?;
    let after = Utc::now();

    let bodies = submitted_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    let run_date = DateTime::parse_from_rfc3339(bodies[0]["run_date"].as_str().unwrap())?;
    assert!(run_date >= before + Duration::days(2));
    assert!(run_date <= after + Duration::days(2));
    assert!(bodies[0].get("kwargs").is_none());
    Ok(())
}

#[logtest(tokio::test)]
async fn dispatch_defers_to_remote_scheduler() -> Result<()> {
    let server = respond_with(200, "ok").await;
    let scheduler = Scheduler::from(RemoteScheduler::new(Some(server.uri()), credentials())?);

    let before = Utc::now();
    let email = Email::new(vec!["a@x.org".into()], "Missing data", "SESSION01 has no scans");
    let dispatched = schedule_email(&scheduler, &email).await?;
    assert!(matches!(
        dispatched,
        Dispatched::Scheduled(Acknowledgement::Accepted { .. })
    ));

    let bodies = submitted_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["func"], json!("notify.send_email"));
    assert_eq!(bodies[0]["kwargs"]["subject"], json!("Missing data"));
    let run_date = DateTime::parse_from_rfc3339(bodies[0]["run_date"].as_str().unwrap())?;
    assert!(run_date >= before);
    assert!(run_date <= Utc::now());

    let direct = dispatch::<SendEmail>(&scheduler, JobArgs::new()).await?;
    assert!(matches!(direct, Dispatched::Scheduled(_)));
    Ok(())
}
