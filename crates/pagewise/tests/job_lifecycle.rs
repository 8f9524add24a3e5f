//! Job lifecycle tests: page ordering, idempotent results, degradation and
//! housekeeping, driven through the public engine API.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::harness::position_of;
use common::{HarnessOptions, Step, TestHarness};

use pagewise::aggregate::aggregate;
use pagewise::inference::InferenceFailure;
use pagewise::{Degradation, Destination, EngineError, JobId, JobStatus, NewJob, PromptFields, ValidationError};

fn new_job(source: &str, pages: Vec<u32>, destination: Destination) -> NewJob {
    NewJob {
        source_ref: source.to_string(),
        model: String::new(),
        prompt: PromptFields {
            task: "Transcribe the page".to_string(),
            ..Default::default()
        },
        pages,
        destination,
        original_filename: None,
    }
}

#[tokio::test]
async fn test_out_of_order_pages_export_in_page_order() {
    let harness = TestHarness::with_options(HarnessOptions {
        steps: vec![
            Step::Reply(Ok("seventh page".to_string())),
            Step::Reply(Ok("second page".to_string())),
            Step::Reply(Ok("fourth page".to_string())),
        ],
        ..Default::default()
    });
    let engine = &harness.engine;

    let id = engine
        .create_job(new_job("report.pdf", vec![2, 4, 7], Destination::LocalDownload))
        .await
        .unwrap();

    let seven = engine.process_page(&id, 7).await.unwrap();
    let two = engine.process_page(&id, 2).await.unwrap();
    let four = engine.process_page(&id, 4).await.unwrap();

    assert!(seven.is_last_page);
    assert!(!two.is_last_page);
    assert!(!four.is_last_page);
    assert!(seven.export.is_none());
    assert!(two.export.is_none());

    let receipt = four.export.expect("the final pending page exports the job");
    assert_eq!(receipt.row_count, 3);
    assert_eq!(receipt.chunk_count, 1);
    assert_eq!(
        receipt.location,
        format!("downloads/{}/report_pdf_output.xlsx", id)
    );

    let xml = harness.sheet_xml(&receipt.location);
    let p2 = position_of(&xml, "report_page_2");
    let p4 = position_of(&xml, "report_page_4");
    let p7 = position_of(&xml, "report_page_7");
    assert!(p2 < p4 && p4 < p7);
    assert!(position_of(&xml, "second page") < position_of(&xml, "seventh page"));

    assert_eq!(harness.normalizer.rasterized_pages(), vec![7, 2, 4]);
}

#[tokio::test]
async fn test_concurrent_final_pages_export_once() {
    let gate = Arc::new(tokio::sync::Barrier::new(2));
    let harness = TestHarness::with_options(HarnessOptions {
        steps: vec![Step::Gate(gate.clone()), Step::Gate(gate)],
        ..Default::default()
    });
    let engine = &harness.engine;

    let id = engine
        .create_job(new_job("pair.pdf", vec![1, 2], Destination::LocalDownload))
        .await
        .unwrap();

    let (first, second) = tokio::join!(engine.process_page(&id, 1), engine.process_page(&id, 2));
    let (first, second) = (first.unwrap(), second.unwrap());

    let receipts: Vec<_> = [first.export, second.export].into_iter().flatten().collect();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].row_count, 2);
    assert!(harness.local_file(&receipts[0].location).is_file());
}

#[tokio::test]
async fn test_claimed_job_is_not_exported_again() {
    let harness = TestHarness::new();
    let engine = &harness.engine;

    let id = engine
        .create_job(new_job("claimed.pdf", vec![1, 2], Destination::LocalDownload))
        .await
        .unwrap();
    assert!(engine.store().claim_completion(&id).await.unwrap());

    let one = engine.process_page(&id, 1).await.unwrap();
    let two = engine.process_page(&id, 2).await.unwrap();

    assert!(one.export.is_none());
    assert!(two.export.is_none());
    assert_eq!(engine.job(&id).await.unwrap().status, JobStatus::Running);
    assert!(!harness.export_dir.exists());
}

#[tokio::test]
async fn test_reprocessing_a_page_keeps_one_result() {
    let harness = TestHarness::with_options(HarnessOptions {
        steps: vec![
            Step::Reply(Ok("first attempt".to_string())),
            Step::Reply(Ok("second attempt".to_string())),
        ],
        ..Default::default()
    });
    let engine = &harness.engine;

    let id = engine
        .create_job(new_job("ledger.pdf", vec![1, 2], Destination::Batch))
        .await
        .unwrap();

    engine.process_page(&id, 1).await.unwrap();
    engine.process_page(&id, 1).await.unwrap();
    assert_eq!(engine.pending_pages(&id).await.unwrap(), vec![2]);
    assert_eq!(engine.job(&id).await.unwrap().status, JobStatus::Running);

    engine.process_page(&id, 2).await.unwrap();
    assert_eq!(engine.job(&id).await.unwrap().status, JobStatus::Completed);

    let rows = aggregate(engine.store(), &[id], true, 26_140).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].page_number, 1);
    assert_eq!(rows[0].text, "second attempt");
    assert_eq!(rows[0].source_stem.as_deref(), Some("ledger"));
    assert_eq!(rows[1].text, "page text");
}

#[tokio::test]
async fn test_timeouts_retry_with_smaller_images() {
    let harness = TestHarness::with_options(HarnessOptions {
        steps: vec![
            Step::Hang,
            Step::Hang,
            Step::Reply(Ok("answered on the third try".to_string())),
        ],
        ..Default::default()
    });
    let engine = &harness.engine;

    let id = engine
        .create_job(new_job("scan.pdf", vec![1, 2], Destination::LocalDownload))
        .await
        .unwrap();
    let outcome = engine.process_page(&id, 1).await.unwrap();

    assert_eq!(outcome.text, "answered on the third try");
    assert!(outcome.degradation.is_none());

    let sizes: Vec<usize> = harness
        .inference
        .requests()
        .iter()
        .map(|r| r.image_bytes)
        .collect();
    assert_eq!(sizes.len(), 3);
    assert!(sizes[0] > sizes[1] && sizes[1] > sizes[2]);
    assert_eq!(outcome.image_size_bytes, sizes[2] as u64);
}

#[tokio::test]
async fn test_timeout_exhaustion_stores_sentinel() {
    let harness = TestHarness::with_options(HarnessOptions {
        steps: vec![Step::Hang, Step::Hang, Step::Hang],
        ..Default::default()
    });
    let engine = &harness.engine;

    let id = engine
        .create_job(new_job("scan.pdf", vec![3, 5], Destination::LocalDownload))
        .await
        .unwrap();
    let outcome = engine.process_page(&id, 3).await.unwrap();

    assert_eq!(outcome.text, "[Page 3: processing timed out after 3 attempts]");
    assert_eq!(outcome.degradation, Some(Degradation::Timeout { attempts: 3 }));
    assert_eq!(engine.pending_pages(&id).await.unwrap(), vec![5]);
    assert_eq!(engine.job(&id).await.unwrap().status, JobStatus::Running);
}

#[tokio::test]
async fn test_inference_failures_become_sentinels() {
    let harness = TestHarness::with_options(HarnessOptions {
        steps: vec![
            Step::Reply(Err(InferenceFailure::ContentRejected("filtered".to_string()))),
            Step::Reply(Err(InferenceFailure::ConfigMissing("API key not available".to_string()))),
            Step::Reply(Err(InferenceFailure::Failed("HTTP 500".to_string()))),
        ],
        ..Default::default()
    });
    let engine = &harness.engine;

    let id = engine
        .create_job(new_job("mixed.pdf", vec![1, 2, 3, 4], Destination::Batch))
        .await
        .unwrap();

    let rejected = engine.process_page(&id, 1).await.unwrap();
    assert_eq!(
        rejected.text,
        "[Page 1: content was rejected by the inference service]"
    );
    assert!(matches!(
        rejected.degradation,
        Some(Degradation::ContentRejected { .. })
    ));

    let unconfigured = engine.process_page(&id, 2).await.unwrap();
    assert_eq!(unconfigured.text, "API key not available");
    assert_eq!(unconfigured.degradation, Some(Degradation::ConfigMissing));

    let failed = engine.process_page(&id, 3).await.unwrap();
    assert_eq!(failed.text, "[Page 3: could not be processed]");

    // Only timeouts are retried.
    assert_eq!(harness.inference.requests().len(), 3);
}

#[tokio::test]
async fn test_job_uses_default_model_and_composed_prompt() {
    let harness = TestHarness::new();
    let engine = &harness.engine;

    let mut job = new_job("memo.pdf", vec![1], Destination::Batch);
    job.prompt.role = "You are a clerk".to_string();
    let id = engine.create_job(job).await.unwrap();
    engine.process_page(&id, 1).await.unwrap();

    let requests = harness.inference.requests();
    assert_eq!(requests[0].model, "gpt-4.1");
    assert_eq!(
        requests[0].user,
        "Role:\nYou are a clerk\n\nTask:\nTranscribe the page"
    );
}

#[tokio::test]
async fn test_unknown_and_finished_jobs_are_rejected() {
    let harness = TestHarness::new();
    let engine = &harness.engine;

    assert!(matches!(
        engine.process_page(&JobId::from("does-not-exist"), 1).await,
        Err(EngineError::Validation(ValidationError::UnknownJob(_)))
    ));

    let id = engine
        .create_job(new_job("memo.pdf", vec![1], Destination::Batch))
        .await
        .unwrap();
    engine.process_page(&id, 1).await.unwrap();
    assert!(matches!(
        engine.process_page(&id, 1).await,
        Err(EngineError::Validation(ValidationError::JobFinished { .. }))
    ));

    assert!(matches!(
        engine
            .create_job(new_job("notes.txt", vec![1], Destination::Batch))
            .await,
        Err(EngineError::Validation(ValidationError::UnknownDocument(_)))
    ));
}

#[tokio::test]
async fn test_sweep_removes_only_stale_jobs() {
    let harness = TestHarness::new();
    let engine = &harness.engine;

    let id = engine
        .create_job(new_job("old.pdf", vec![1, 2], Destination::LocalDownload))
        .await
        .unwrap();
    engine.process_page(&id, 1).await.unwrap();

    assert_eq!(
        engine.sweep_stale_jobs(Duration::from_secs(3600)).await.unwrap(),
        0
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(engine.sweep_stale_jobs(Duration::ZERO).await.unwrap(), 1);
    assert!(matches!(
        engine.job(&id).await,
        Err(EngineError::Validation(ValidationError::UnknownJob(_)))
    ));
}
