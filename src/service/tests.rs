use super::test_helpers::{Recorder, StubRunner, create_test_downloader, wait_until};
use super::*;
use crate::orchestrator::cleanup;
use crate::types::{JobEvent, JobId, Phase, StartRequest};
use futures::StreamExt;
use std::time::Duration;

fn request() -> StartRequest {
    StartRequest {
        url: "https://media.example.com/watch?v=abc".into(),
        start_time: 10.0,
        end_time: 15.0,
        filename: Some("highlight.mkv".into()),
        bitrate_hint: None,
    }
}

async fn wait_for_phase(downloader: &SliceDownloader, id: &JobId, phase: Phase) {
    wait_until(|| downloader.job_info(id).map(|info| info.phase).ok() == Some(phase)).await;
}

#[tokio::test]
async fn new_creates_temp_dir_and_rejects_bad_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = super::test_helpers::test_config(&dir);
    let temp = config.download.temp_dir.clone();

    let downloader = SliceDownloader::with_runner(config.clone(), StubRunner::succeeding())
        .await
        .unwrap();
    assert!(temp.is_dir());
    assert!(downloader.is_accepting());
    assert_eq!(downloader.job_count(), 0);

    config.progress.smoothing_factor = 0.0;
    let result = SliceDownloader::with_runner(config, StubRunner::succeeding()).await;
    assert!(matches!(result, Err(Error::Config { .. })));
}

#[tokio::test]
async fn start_rejects_invalid_requests_without_creating_jobs() {
    let (downloader, _dir) = create_test_downloader(StubRunner::succeeding()).await;
    let mut bad = request();
    bad.end_time = 5.0;

    let result = downloader.start(bad);

    assert!(matches!(result, Err(Error::Validation { ref field, .. }) if field == "endTime"));
    assert_eq!(downloader.job_count(), 0);
}

#[tokio::test]
async fn job_runs_to_completion_and_artifact_streams_once() {
    let (downloader, _dir) = create_test_downloader(StubRunner::succeeding()).await;

    let id = downloader.start(request()).unwrap();
    wait_for_phase(&downloader, &id, Phase::Completed).await;

    let info = downloader.job_info(&id).unwrap();
    assert_eq!(info.progress, 100);
    assert_eq!(info.filename, "highlight.mp4");
    assert!(info.finished_at.is_some());

    // Only the output remains; the intermediate went away after the remux
    let files = cleanup::job_files(downloader.config.temp_dir(), &id).await;
    assert_eq!(files.len(), 1);
    assert!(files[0].to_string_lossy().ends_with(&format!("{}.mp4", id)));

    let artifact = downloader.open_artifact(&id).await.unwrap();
    assert_eq!(artifact.size, 4096);
    assert_eq!(artifact.filename, "highlight.mp4");

    let mut stream = artifact.into_stream(downloader.clone());
    let mut received = 0;
    while let Some(chunk) = stream.next().await {
        received += chunk.unwrap().len();
    }
    assert_eq!(received, 4096);

    wait_until(|| downloader.job_info(&id).is_err()).await;
    wait_until(|| !downloader.config.temp_dir().join(format!("{}.mp4", id)).exists()).await;
    assert!(matches!(
        downloader.open_artifact(&id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn dropping_a_retrieval_stream_cleans_up() {
    let (downloader, _dir) = create_test_downloader(StubRunner::succeeding()).await;
    let id = downloader.start(request()).unwrap();
    wait_for_phase(&downloader, &id, Phase::Completed).await;

    let artifact = downloader.open_artifact(&id).await.unwrap();
    let path = artifact.path.clone();
    let stream = artifact.into_stream(downloader.clone());
    drop(stream);

    wait_until(|| downloader.job_info(&id).is_err()).await;
    wait_until(|| !path.exists()).await;
}

#[tokio::test]
async fn artifact_of_running_job_is_not_ready() {
    let runner = StubRunner::gated();
    let (downloader, _dir) = create_test_downloader(runner.clone()).await;
    let id = downloader.start(request()).unwrap();

    assert!(matches!(
        downloader.open_artifact(&id).await,
        Err(Error::NotReady { phase: Phase::Downloading, .. })
    ));
    assert!(matches!(
        downloader.delete_job(&id).await,
        Err(Error::StillRunning { .. })
    ));

    runner.release();
    wait_for_phase(&downloader, &id, Phase::Completed).await;
    downloader.delete_job(&id).await.unwrap();
    assert!(downloader.job_info(&id).is_err());
    assert!(matches!(
        downloader.delete_job(&id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn failed_job_reports_one_error_and_leaves_no_files() {
    let (downloader, _dir) = create_test_downloader(StubRunner::failing()).await;
    let id = downloader.start(request()).unwrap();
    let recorder = Arc::new(Recorder::default());
    let _subscription = downloader.subscribe(&id, recorder.clone()).unwrap();

    wait_for_phase(&downloader, &id, Phase::Failed).await;
    wait_until(|| recorder.terminal().is_some()).await;

    let errors: Vec<_> = recorder
        .events()
        .into_iter()
        .filter(|e| matches!(e, JobEvent::Error { .. }))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(recorder.events().last(), Some(JobEvent::Error { .. })));
    assert!(
        cleanup::job_files(downloader.config.temp_dir(), &id)
            .await
            .is_empty()
    );
    assert!(matches!(
        downloader.open_artifact(&id).await,
        Err(Error::NotReady { phase: Phase::Failed, .. })
    ));
}

#[tokio::test]
async fn late_subscriber_receives_nothing_from_finished_job() {
    let (downloader, _dir) = create_test_downloader(StubRunner::succeeding()).await;
    let id = downloader.start(request()).unwrap();
    wait_for_phase(&downloader, &id, Phase::Completed).await;

    let recorder = Arc::new(Recorder::default());
    let _subscription = downloader.subscribe(&id, recorder.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(recorder.events().is_empty());
    // The outcome is still available from the job itself
    assert_eq!(downloader.job_info(&id).unwrap().phase, Phase::Completed);
}

#[tokio::test]
async fn subscriber_joining_mid_job_sees_only_later_events() {
    let runner = StubRunner::gated();
    let (downloader, _dir) = create_test_downloader(runner.clone()).await;
    let id = downloader.start(request()).unwrap();
    let early = Arc::new(Recorder::default());
    let _early = downloader.subscribe(&id, early.clone()).unwrap();
    wait_until(|| !early.events().is_empty()).await;

    let late = Arc::new(Recorder::default());
    let _late = downloader.subscribe(&id, late.clone()).unwrap();
    assert!(late.events().is_empty());

    runner.release();
    wait_until(|| late.terminal().is_some()).await;

    let early_events = early.events();
    let late_events = late.events();
    assert!(late_events.len() < early_events.len());
    assert!(early_events.ends_with(&late_events));
}

#[tokio::test]
async fn subscribe_to_unknown_job_fails() {
    let (downloader, _dir) = create_test_downloader(StubRunner::succeeding()).await;
    let id = JobId::generate();

    let result = downloader.subscribe(&id, Arc::new(Recorder::default()));

    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn reaper_removes_only_expired_terminal_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = super::test_helpers::test_config(&dir);
    config.retention.job_ttl = Duration::ZERO;
    let runner = StubRunner::gated();
    let downloader = SliceDownloader::with_runner(config, runner.clone())
        .await
        .unwrap();

    let finished = downloader.start(request()).unwrap();
    runner.release();
    wait_for_phase(&downloader, &finished, Phase::Completed).await;
    let running = downloader.start(request()).unwrap();

    assert_eq!(downloader.reap_expired().await, 1);
    assert!(downloader.job_info(&finished).is_err());
    assert!(downloader.job_info(&running).is_ok());
    assert!(
        cleanup::job_files(downloader.config.temp_dir(), &finished)
            .await
            .is_empty()
    );

    downloader.shutdown().await;
}

#[tokio::test]
async fn shutdown_fails_running_jobs_and_rejects_new_ones() {
    let runner = StubRunner::gated();
    let (downloader, _dir) = create_test_downloader(runner).await;
    let id = downloader.start(request()).unwrap();
    let recorder = Arc::new(Recorder::default());
    let _subscription = downloader.subscribe(&id, recorder.clone()).unwrap();
    let reaper = downloader.spawn_reaper();

    downloader.shutdown().await;

    assert!(!downloader.is_accepting());
    assert!(matches!(
        downloader.start(request()),
        Err(Error::ShuttingDown)
    ));
    assert_eq!(
        recorder.terminal(),
        Some(JobEvent::Error {
            job_id: id.clone(),
            message: Error::ShuttingDown.user_message(),
        })
    );
    assert_eq!(downloader.job_count(), 0);
    assert!(
        cleanup::job_files(downloader.config.temp_dir(), &id)
            .await
            .is_empty()
    );
    tokio::time::timeout(Duration::from_secs(1), reaper)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn list_jobs_orders_by_creation() {
    let runner = StubRunner::gated();
    let (downloader, _dir) = create_test_downloader(runner).await;

    let first = downloader.start(request()).unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = downloader.start(request()).unwrap();

    let ids: Vec<_> = downloader
        .list_jobs()
        .into_iter()
        .map(|info| info.job_id)
        .collect();
    assert_eq!(ids, vec![first, second]);

    downloader.shutdown().await;
}
