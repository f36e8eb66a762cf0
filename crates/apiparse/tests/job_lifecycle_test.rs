//! Job lifecycle tests driving real worker processes

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use apiparse::archive::ArchiveExtractor;
use apiparse::config::WorkspaceConfig;
use apiparse::jobs::{JobController, JobStatus, CANCELLED_MESSAGE};
use apiparse::worker::ProcessSpawner;
use bytes::Bytes;
use uuid::Uuid;

const RAML: &str = "#%RAML 1.0\ntitle: Pets\n/pets:\n  get:\n";

fn job_with(spawner: ProcessSpawner, temp_dir: &tempfile::TempDir) -> JobController {
    let extractor = ArchiveExtractor::new(WorkspaceConfig {
        temp_dir: Some(temp_dir.path().to_path_buf()),
        ..WorkspaceConfig::default()
    });
    JobController::new(Uuid::new_v4(), Arc::new(spawner), extractor)
}

fn worker() -> ProcessSpawner {
    ProcessSpawner::new(env!("CARGO_BIN_EXE_apiparse-worker"))
        .with_handshake_timeout(Duration::from_secs(10))
}

fn zip(files: &[(&str, &str)]) -> Bytes {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    Bytes::from(writer.finish().unwrap().into_inner())
}

async fn settle(job: &JobController) -> JobStatus {
    for _ in 0..500 {
        let status = job.status();
        if status != JobStatus::Running {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job is still running");
}

#[tokio::test]
async fn test_raml_text_finishes() {
    let temp = tempfile::tempdir().unwrap();
    let job = job_with(worker(), &temp);

    job.submit_text(RAML, "RAML 1.0").await.unwrap();

    assert_eq!(settle(&job).await, JobStatus::Finished);
    let result = job.result().unwrap();
    assert_eq!(result.vendor, "RAML 1.0");
    assert!(!result.rendered.is_empty());
}

#[tokio::test]
async fn test_invalid_text_fails() {
    let temp = tempfile::tempdir().unwrap();
    let job = job_with(worker(), &temp);

    job.submit_text("{\"swagger\": \"2.0\"}", "RAML 1.0").await.unwrap();

    assert_eq!(settle(&job).await, JobStatus::Failed);
    assert!(job.error().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn test_archive_with_candidates_waits_for_selection() {
    let temp = tempfile::tempdir().unwrap();
    let job = job_with(worker(), &temp);
    let body = zip(&[
        ("pets.raml", RAML),
        ("owners.raml", "#%RAML 1.0\ntitle: Owners\n"),
    ]);

    job.submit_archive(body, None).await.unwrap();

    assert_eq!(job.status(), JobStatus::Waiting);
    assert_eq!(
        job.candidates().unwrap(),
        vec!["owners.raml".to_string(), "pets.raml".to_string()]
    );
    let workspace = job.workspace_path().unwrap();
    assert!(workspace.join("pets.raml").is_file());

    job.select_entry_point("pets.raml").await.unwrap();

    assert_eq!(settle(&job).await, JobStatus::Finished);
    assert_eq!(job.result().unwrap().vendor, "RAML 1.0");
    assert!(!workspace.exists());
}

#[tokio::test]
async fn test_archive_with_includes_finishes() {
    let temp = tempfile::tempdir().unwrap();
    let job = job_with(worker(), &temp);
    let body = zip(&[
        ("api/api.raml", "#%RAML 1.0\ntitle: Pets\ntypes:\n  Pet: !include types/pet.raml\n"),
        ("api/types/pet.raml", "#%RAML 1.0 DataType\ntype: object\n"),
    ]);

    job.submit_archive(body, Some("api.raml".to_string())).await.unwrap();

    assert_eq!(settle(&job).await, JobStatus::Finished);
    let rendered = job.result().unwrap().rendered;
    assert!(rendered.contains("types/pet.raml"), "{}", rendered);
}

#[tokio::test]
async fn test_missing_entrypoint_fails() {
    let temp = tempfile::tempdir().unwrap();
    let job = job_with(worker(), &temp);
    let body = zip(&[("api.raml", RAML)]);

    job.submit_archive(body, Some("missing.raml".to_string())).await.unwrap();

    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.error().unwrap(), "API main file does not exist.");
    assert!(job.workspace_path().is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancel_kills_worker_and_removes_workspace() {
    let temp = tempfile::tempdir().unwrap();
    // Completes the handshake, then never answers
    let stalled = ProcessSpawner::new("/bin/sh")
        .with_args(["-c", "echo '\"hello\"'; cat > /dev/null; sleep 30"])
        .with_handshake_timeout(Duration::from_secs(10));
    let job = job_with(stalled, &temp);

    job.submit_archive(zip(&[("api.raml", RAML)]), None).await.unwrap();

    assert_eq!(job.status(), JobStatus::Running);
    assert!(job.worker_running());
    let workspace = job.workspace_path().unwrap();
    assert!(workspace.exists());

    job.cancel();

    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.error().unwrap(), CANCELLED_MESSAGE);
    assert!(!job.has_worker());
    assert!(!workspace.exists());
}
