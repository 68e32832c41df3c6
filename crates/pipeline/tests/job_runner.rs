//! Integration tests for `JobRunner`: acceptance, execution, progress
//! delivery, result retrieval, and cleanup.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{
    harness, harness_with, opaque, request, wait_terminal, wait_until, FailingLoader, Gate,
    GatedLoader,
};
use upscaler_core::codec;
use upscaler_core::error::CoreError;
use upscaler_core::raster::{ChannelLayout, RasterImage};
use upscaler_core::types::{JobId, ResampleMode, Scale};
use upscaler_events::ProgressEventKind;
use upscaler_pipeline::JobStatus;

// ---------------------------------------------------------------------------
// Test: [2, 4] on a 100x100 opaque image yields an 800x800 RGB result
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_stage_job_completes_with_compound_size() {
    let h = harness();
    let job_id = JobId::parse("scenario-1").unwrap();
    let mut sub = h.broadcaster.subscribe(job_id.clone()).await;

    let mut req = request(opaque(100, 100), &["2", "4"]);
    req.job_id = Some(job_id.to_string());
    let returned = h.runner.submit(req).await.unwrap();
    assert_eq!(returned, job_id);

    let mut events = Vec::new();
    while let Some(event) = sub.recv().await {
        let terminal = event.kind.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }

    let last = events.last().unwrap();
    assert_eq!(last.kind, ProgressEventKind::JobCompleted);
    assert_eq!(last.progress, 1.0);
    assert_eq!(events[0].progress, 0.0);
    assert!(events.windows(2).all(|w| w[0].progress <= w[1].progress));
    assert!(events
        .iter()
        .any(|e| e.message == "Completed scale x2" && e.progress == 0.5));
    assert!(events
        .iter()
        .any(|e| e.message == "Completed scale x4" && e.progress == 1.0));

    let record = wait_terminal(&h.runner, &job_id).await;
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress, 1.0);
    assert_eq!(record.scales, vec![Scale::X2, Scale::X4]);

    let result = h.runner.result(&job_id).await.unwrap();
    assert_eq!(result.filename, "photo bicubic (x2 x4).png");
    assert_eq!(result.content_type, "image/png");
    let decoded = codec::decode(&result.bytes).unwrap();
    assert_eq!(decoded.dimensions(), (800, 800));
    assert_eq!(decoded.layout(), ChannelLayout::Rgb);
}

// ---------------------------------------------------------------------------
// Test: an unknown resampling mode falls back to the default
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_mode_uses_default() {
    let h = harness();
    let mut req = request(opaque(8, 8), &["2"]);
    req.resample_mode = Some("zigzag".to_string());

    let job_id = h.runner.submit(req).await.unwrap();
    let record = wait_terminal(&h.runner, &job_id).await;

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.resample_mode, ResampleMode::Bicubic);
}

// ---------------------------------------------------------------------------
// Test: no valid scale rejects the job before registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsupported_scales_are_rejected() {
    let h = harness();

    assert_matches!(
        h.runner.submit(request(opaque(4, 4), &["3", "16"])).await,
        Err(CoreError::Validation(msg)) if msg.contains("No valid scales")
    );
    assert_matches!(
        h.runner.submit(request(opaque(4, 4), &[])).await,
        Err(CoreError::Validation(_))
    );
    assert!(h.runner.registry().is_empty().await);
}

// ---------------------------------------------------------------------------
// Test: an output beyond the pixel limit is rejected before registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn oversize_output_is_rejected() {
    let h = harness();

    assert_matches!(
        h.runner.submit(request(opaque(100, 100), &["8", "8", "8"])).await,
        Err(CoreError::Validation(msg)) if msg.contains("exceeds the limit")
    );
    assert!(h.runner.registry().is_empty().await);

    // Within the limit the same image is accepted.
    let job_id = h.runner.submit(request(opaque(100, 100), &["8"])).await.unwrap();
    assert_eq!(wait_terminal(&h.runner, &job_id).await.status, JobStatus::Completed);
}

// ---------------------------------------------------------------------------
// Test: malformed or duplicate caller-supplied ids are rejected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn caller_supplied_ids_are_validated() {
    let h = harness();

    let mut bad = request(opaque(4, 4), &["2"]);
    bad.job_id = Some("../escape".to_string());
    assert_matches!(h.runner.submit(bad).await, Err(CoreError::Validation(_)));

    let mut first = request(opaque(4, 4), &["2"]);
    first.job_id = Some("dup".to_string());
    h.runner.submit(first).await.unwrap();

    let mut second = request(opaque(4, 4), &["2"]);
    second.job_id = Some("dup".to_string());
    assert_matches!(h.runner.submit(second).await, Err(CoreError::Conflict(_)));
}

// ---------------------------------------------------------------------------
// Test: queries for unknown jobs report not-found
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_is_not_found() {
    let h = harness();
    let ghost = JobId::parse("never-submitted").unwrap();

    assert_matches!(h.runner.status(&ghost).await, Err(CoreError::NotFound { .. }));
    assert_matches!(h.runner.result(&ghost).await, Err(CoreError::NotFound { .. }));
    assert_matches!(h.runner.cleanup(&ghost).await, Err(CoreError::NotFound { .. }));
}

// ---------------------------------------------------------------------------
// Test: result of a running job is not ready
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn result_before_completion_is_not_ready() {
    let gate = Arc::new(Gate::default());
    let h = harness_with(Arc::new(GatedLoader(gate.clone())), 2);

    let job_id = h.runner.submit(request(opaque(4, 4), &["2"])).await.unwrap();
    wait_until(|| gate.entered() > 0).await;

    let record = h.runner.status(&job_id).await.unwrap();
    assert_eq!(record.status, JobStatus::Processing);
    assert_matches!(h.runner.result(&job_id).await, Err(CoreError::NotReady(_)));

    gate.open();
    assert_eq!(wait_terminal(&h.runner, &job_id).await.status, JobStatus::Completed);
}

// ---------------------------------------------------------------------------
// Test: engine construction failure ends the job in error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn engine_failure_sets_error_state() {
    let h = harness_with(Arc::new(FailingLoader), 2);
    let job_id = JobId::parse("doomed").unwrap();
    let mut sub = h.broadcaster.subscribe(job_id.clone()).await;

    let mut req = request(opaque(4, 4), &["2"]);
    req.job_id = Some(job_id.to_string());
    h.runner.submit(req).await.unwrap();

    let record = wait_terminal(&h.runner, &job_id).await;
    assert_eq!(record.status, JobStatus::Error);
    assert!(record.error.as_deref().unwrap().contains("corrupt weights"));
    assert_matches!(h.runner.result(&job_id).await, Err(CoreError::NotReady(_)));

    let mut last = None;
    while let Some(event) = sub.recv().await {
        let terminal = event.kind.is_terminal();
        last = Some(event);
        if terminal {
            break;
        }
    }
    assert_eq!(last.unwrap().kind, ProgressEventKind::JobFailed);
}

// ---------------------------------------------------------------------------
// Test: a transparent input yields a transparent result
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rgba_job_keeps_alpha() {
    let h = harness();
    let image = RasterImage::filled(5, 5, ChannelLayout::Rgba, &[200, 100, 50, 90]).unwrap();

    let job_id = h.runner.submit(request(image, &["2"])).await.unwrap();
    assert_eq!(wait_terminal(&h.runner, &job_id).await.status, JobStatus::Completed);

    let result = h.runner.result(&job_id).await.unwrap();
    let decoded = codec::decode(&result.bytes).unwrap();
    assert_eq!(decoded.layout(), ChannelLayout::Rgba);
    assert_eq!(decoded.dimensions(), (10, 10));
    assert_eq!(decoded.pixel(9, 9)[3], 90);
}

// ---------------------------------------------------------------------------
// Test: without show_progress nothing is published, progress still tracked
// ---------------------------------------------------------------------------

#[tokio::test]
async fn progress_disabled_publishes_nothing() {
    let h = harness();
    let job_id = JobId::parse("quiet").unwrap();
    let mut sub = h.broadcaster.subscribe(job_id.clone()).await;

    let mut req = request(opaque(4, 4), &["2"]);
    req.job_id = Some(job_id.to_string());
    req.show_progress = false;
    h.runner.submit(req).await.unwrap();

    let record = wait_terminal(&h.runner, &job_id).await;
    assert_eq!(record.progress, 1.0);

    h.broadcaster.unsubscribe(&job_id).await;
    assert!(sub.recv().await.is_none());
}

// ---------------------------------------------------------------------------
// Test: cleanup while processing makes the job unobservable for good
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cleanup_during_processing_discards_result() {
    let gate = Arc::new(Gate::default());
    let h = harness_with(Arc::new(GatedLoader(gate.clone())), 2);

    let job_id = h.runner.submit(request(opaque(4, 4), &["2"])).await.unwrap();
    wait_until(|| gate.entered() > 0).await;

    let mut sub = h.broadcaster.subscribe(job_id.clone()).await;
    h.runner.cleanup(&job_id).await.unwrap();
    // Drains anything published before cleanup, then observes the close.
    while sub.recv().await.is_some() {}
    assert!(!h.broadcaster.is_subscribed(&job_id).await);

    gate.open();
    assert!(h.runner.shutdown(Duration::from_secs(10)).await);

    assert_matches!(h.runner.status(&job_id).await, Err(CoreError::NotFound { .. }));
    assert_eq!(h.store.artifacts_for(&job_id), 0);
}

// ---------------------------------------------------------------------------
// Test: an id stays taken until its cleaned-up pipeline has returned
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resubmit_after_cleanup_waits_for_old_pipeline() {
    let gate = Arc::new(Gate::default());
    let h = harness_with(Arc::new(GatedLoader(gate.clone())), 2);
    let job_id = JobId::parse("same").unwrap();

    let mut first = request(opaque(4, 4), &["2"]);
    first.job_id = Some(job_id.to_string());
    h.runner.submit(first).await.unwrap();
    wait_until(|| gate.entered() > 0).await;

    h.runner.cleanup(&job_id).await.unwrap();
    assert!(h.runner.is_running(&job_id));

    let mut early = request(opaque(4, 4), &["2"]);
    early.job_id = Some(job_id.to_string());
    assert_matches!(
        h.runner.submit(early).await,
        Err(CoreError::Conflict(msg)) if msg.contains("still running")
    );
    assert_matches!(h.runner.status(&job_id).await, Err(CoreError::NotFound { .. }));

    gate.open();
    wait_until(|| !h.runner.is_running(&job_id)).await;
    assert_eq!(h.store.artifacts_for(&job_id), 0);

    let mut again = request(opaque(4, 4), &["2"]);
    again.job_id = Some(job_id.to_string());
    h.runner.submit(again).await.unwrap();

    let record = wait_terminal(&h.runner, &job_id).await;
    assert_eq!(record.status, JobStatus::Completed);
    assert!(h.runner.result(&job_id).await.is_ok());
    assert_eq!(h.store.artifacts_for(&job_id), 1);
}

// ---------------------------------------------------------------------------
// Test: cleanup of a completed job removes record and artifact
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cleanup_after_completion() {
    let h = harness();
    let job_id = h.runner.submit(request(opaque(4, 4), &["2"])).await.unwrap();
    wait_terminal(&h.runner, &job_id).await;
    assert_eq!(h.store.artifacts_for(&job_id), 1);

    h.runner.cleanup(&job_id).await.unwrap();

    assert_eq!(h.store.artifacts_for(&job_id), 0);
    assert_matches!(h.runner.result(&job_id).await, Err(CoreError::NotFound { .. }));
}

// ---------------------------------------------------------------------------
// Test: the worker pool bounds concurrent pipelines
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_pool_bounds_concurrency() {
    let gate = Arc::new(Gate::default());
    let h = harness_with(Arc::new(GatedLoader(gate.clone())), 1);

    let first = h.runner.submit(request(opaque(4, 4), &["2"])).await.unwrap();
    let second = h.runner.submit(request(opaque(4, 4), &["2"])).await.unwrap();
    wait_until(|| gate.entered() > 0).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(gate.entered(), 1);
    assert_eq!(h.runner.status(&second).await.unwrap().status, JobStatus::Accepted);
    assert_eq!(h.runner.active_jobs().await, 2);

    gate.open();
    assert_eq!(wait_terminal(&h.runner, &first).await.status, JobStatus::Completed);
    assert_eq!(wait_terminal(&h.runner, &second).await.status, JobStatus::Completed);
    assert_eq!(h.runner.active_jobs().await, 0);
}

// ---------------------------------------------------------------------------
// Test: jobs still queued at shutdown end in error without running
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_fails_queued_jobs() {
    let gate = Arc::new(Gate::default());
    let h = harness_with(Arc::new(GatedLoader(gate.clone())), 1);

    let running = h.runner.submit(request(opaque(4, 4), &["2"])).await.unwrap();
    let queued = h.runner.submit(request(opaque(4, 4), &["2"])).await.unwrap();
    wait_until(|| gate.entered() > 0).await;

    assert!(!h.runner.shutdown(Duration::from_millis(50)).await);

    let record = wait_terminal(&h.runner, &queued).await;
    assert_eq!(record.status, JobStatus::Error);
    assert_eq!(record.error.as_deref(), Some("Job runner is shutting down"));

    gate.open();
    assert_eq!(wait_terminal(&h.runner, &running).await.status, JobStatus::Completed);
    assert_eq!(gate.entered(), 1);
}

// ---------------------------------------------------------------------------
// Test: shutdown refuses new jobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_stops_accepting() {
    let h = harness();
    assert!(h.runner.shutdown(Duration::from_secs(1)).await);

    assert_matches!(
        h.runner.submit(request(opaque(4, 4), &["2"])).await,
        Err(CoreError::Conflict(_))
    );
}
