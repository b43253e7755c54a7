//! Eager-mode ingestion tests.
//!
//! Run with: `cargo test -p clipflow-pipeline --test eager_test`

mod helpers;

use clipflow_core::models::{
    EventKind, ProcessingStatus, ProgressTrack, RecognitionOutcome, Step, Visibility,
};
use clipflow_core::ValidationError;
use clipflow_pipeline::progress::eager;
use clipflow_pipeline::IngestError;
use helpers::{
    assert_monotonic, build, build_with, drain, percents, upload, MemoryStorage, Script,
    ScriptedRecognizer, ScriptedTranscoder,
};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const SHORT_TIMEOUT: Duration = Duration::from_millis(200);

fn matching_recognizer() -> Arc<ScriptedRecognizer> {
    Arc::new(ScriptedRecognizer::new(Script::Respond {
        status_code: 0,
        payload: json!({
            "status": {"code": 0, "msg": "Success"},
            "metadata": {"music": [{"title": "Song", "artists": [{"name": "Band"}]}]}
        }),
    }))
}

#[tokio::test]
async fn silent_video_skips_recognition_and_reaches_100() {
    let recognizer = matching_recognizer();
    let pipeline = build(
        ScriptedTranscoder::silent(),
        Some(recognizer.clone()),
        MemoryStorage::new(),
    );
    let mut sub = pipeline.subscribe();

    let data = vec![7u8; 4096];
    let record = pipeline
        .orchestrator
        .run_eager(upload(&data))
        .await
        .expect("eager run");

    assert_eq!(record.recognition, Some(RecognitionOutcome::Skipped));
    assert_eq!(recognizer.calls(), 0);
    assert_eq!(record.audio_key, None);
    assert_eq!(record.processing_status, ProcessingStatus::Completed);
    assert_eq!(record.visibility, Visibility::Private);
    assert_eq!(record.size_bytes, data.len() as i64);
    assert_eq!(record.duration, Some(30.0));
    assert_eq!(record.title, "Holiday Clip");
    assert_eq!(record.thumbnail_keys.len(), 3);
    assert_eq!(
        record.primary_thumbnail_key.as_ref(),
        record.thumbnail_keys.first()
    );
    assert!(record.video_key.starts_with("videos/holiday_clip_owner_1_"));
    assert!(pipeline.storage.contains(&record.video_key));
    for key in &record.thumbnail_keys {
        assert!(key.starts_with("thumbnails/"));
        assert!(pipeline.storage.contains(key));
    }

    let events = drain(&mut sub).await;
    let processing = percents(&events, ProgressTrack::Processing);
    assert_monotonic(&processing);
    assert_eq!(processing.last(), Some(&100));

    let last = events
        .iter()
        .filter(|e| e.track == ProgressTrack::Processing)
        .last()
        .unwrap();
    match &last.kind {
        EventKind::ProcessingCompleted { thumbnail_url } => {
            assert!(thumbnail_url
                .as_deref()
                .is_some_and(|url| url.contains(record.thumbnail_keys[0].as_str())));
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(last.video_id, Some(record.id));

    assert!(events.iter().any(|e| e.track == ProgressTrack::Recognition
        && e.kind
            == EventKind::RecognitionCompleted {
                outcome: RecognitionOutcome::Skipped
            }));
    assert!(pipeline.leftover_files().is_empty());
}

#[tokio::test]
async fn stage_boundaries_report_table_percentages() {
    let pipeline = build(
        ScriptedTranscoder::with_audio(),
        Some(matching_recognizer()),
        MemoryStorage::new(),
    );
    let mut sub = pipeline.subscribe();

    pipeline
        .orchestrator
        .run_eager(upload(b"frames"))
        .await
        .unwrap();
    let events = drain(&mut sub).await;

    let at = |label: &str| {
        events
            .iter()
            .find(|e| e.track == ProgressTrack::Processing && e.label == label)
            .map(|e| e.percent)
    };
    assert_eq!(at("Upload received"), Some(5));
    assert_eq!(at("Tracks probed"), Some(10));
    assert_eq!(at("Audio extracted"), Some(20));
    assert_eq!(at("Music recognition finished"), Some(35));
    assert_eq!(at("Thumbnails generated"), Some(50));
    assert_eq!(at("Artifacts uploaded"), Some(95));
    assert_eq!(at("Record saved"), Some(98));
    assert_eq!(at("Processing complete"), Some(100));

    let recognition = percents(&events, ProgressTrack::Recognition);
    assert_eq!(recognition, vec![20, 40, 65, 82, 100]);

    let uploads: Vec<u8> = events
        .iter()
        .filter(|e| e.label.starts_with("Uploading"))
        .map(|e| e.percent)
        .collect();
    assert!(!uploads.is_empty());
    assert!(uploads.iter().all(|p| (50..=95).contains(p)));
}

#[tokio::test]
async fn success_code_persists_match_and_audio() {
    let recognizer = matching_recognizer();
    let pipeline = build(
        ScriptedTranscoder::with_audio(),
        Some(recognizer.clone()),
        MemoryStorage::new(),
    );

    let record = pipeline
        .orchestrator
        .run_eager(upload(b"frames-with-sound"))
        .await
        .unwrap();

    assert_eq!(recognizer.calls(), 1);
    match record.recognition {
        Some(RecognitionOutcome::Matched { payload }) => {
            assert_eq!(payload["metadata"]["music"][0]["title"], "Song");
        }
        other => panic!("expected a match, got {other:?}"),
    }
    let audio_key = record.audio_key.expect("audio key");
    assert!(audio_key.starts_with("audios/") && audio_key.ends_with(".mp3"));
    assert!(pipeline.storage.contains(&audio_key));
    assert!(pipeline.leftover_files().is_empty());
}

#[tokio::test]
async fn non_success_code_is_no_match() {
    let recognizer = Arc::new(ScriptedRecognizer::new(Script::Respond {
        status_code: 1001,
        payload: json!({
            "status": {"code": 1001, "msg": "No result"},
            "metadata": {"music": [{"title": "Song"}]}
        }),
    }));
    let pipeline = build(
        ScriptedTranscoder::with_audio(),
        Some(recognizer.clone()),
        MemoryStorage::new(),
    );

    let record = pipeline
        .orchestrator
        .run_eager(upload(b"frames"))
        .await
        .unwrap();

    assert_eq!(recognizer.calls(), 1);
    assert_eq!(record.recognition, Some(RecognitionOutcome::NoMatch));
}

#[tokio::test]
async fn recognition_transport_error_does_not_fail_the_job() {
    let recognizer = Arc::new(ScriptedRecognizer::new(Script::TransportError));
    let pipeline = build(
        ScriptedTranscoder::with_audio(),
        Some(recognizer.clone()),
        MemoryStorage::new(),
    );
    let mut sub = pipeline.subscribe();

    let record = pipeline
        .orchestrator
        .run_eager(upload(b"frames"))
        .await
        .expect("recognition errors are not fatal");

    assert_eq!(recognizer.calls(), 1);
    assert_eq!(record.recognition, Some(RecognitionOutcome::Skipped));
    assert_eq!(record.processing_status, ProcessingStatus::Completed);
    let events = drain(&mut sub).await;
    assert!(!events.iter().any(|e| e.is_failure()));
    assert_eq!(
        percents(&events, ProgressTrack::Processing).last(),
        Some(&100)
    );
}

#[tokio::test]
async fn extraction_failure_skips_recognition() {
    let recognizer = matching_recognizer();
    let transcoder = ScriptedTranscoder {
        fail_extract: true,
        ..ScriptedTranscoder::with_audio()
    };
    let pipeline = build(transcoder, Some(recognizer.clone()), MemoryStorage::new());
    let mut sub = pipeline.subscribe();

    let record = pipeline
        .orchestrator
        .run_eager(upload(b"frames"))
        .await
        .unwrap();

    assert_eq!(recognizer.calls(), 0);
    assert_eq!(record.recognition, Some(RecognitionOutcome::Skipped));
    assert_eq!(record.audio_key, None);
    assert!(pipeline.leftover_files().is_empty());

    let events = drain(&mut sub).await;
    let resolved = events
        .iter()
        .find(|e| e.track == ProgressTrack::Processing && e.label == eager::EXTRACTION_FAILED)
        .expect("extraction failure label");
    assert_eq!(resolved.percent, eager::AUDIO_RESOLVED);
}

#[tokio::test]
async fn thumbnail_failure_is_fatal_and_still_cleans_audio() {
    let pipeline = build(
        ScriptedTranscoder {
            fail_thumbnails: true,
            ..ScriptedTranscoder::with_audio()
        },
        Some(matching_recognizer()),
        MemoryStorage::new(),
    );
    let mut sub = pipeline.subscribe();

    let err = pipeline
        .orchestrator
        .run_eager(upload(b"frames"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Transcoding {
            step: Step::Thumbnail,
            ..
        }
    ));
    assert!(err.is_fatal());
    assert!(pipeline.repo.is_empty().await);
    assert!(pipeline.storage.keys().is_empty());
    assert!(
        pipeline.leftover_files().is_empty(),
        "left behind: {:?}",
        pipeline.leftover_files()
    );
    assert_eq!(pipeline.transcoder.extract_calls.load(Ordering::SeqCst), 1);

    let events = drain(&mut sub).await;
    let failed_at = events
        .iter()
        .position(|e| e.is_failure())
        .expect("failure event");
    assert!(matches!(
        events[failed_at].kind,
        EventKind::Failed {
            step: Step::Thumbnail,
            ..
        }
    ));
    assert_eq!(events[failed_at].track, ProgressTrack::Processing);
    // Recognition settled before thumbnails were attempted.
    let recognized_at = events
        .iter()
        .position(|e| matches!(e.kind, EventKind::RecognitionCompleted { .. }))
        .expect("recognition completed");
    assert!(recognized_at < failed_at);
    assert_monotonic(&percents(&events, ProgressTrack::Processing));
}

#[tokio::test]
async fn persistence_failure_is_fatal_and_still_cleans_up() {
    let pipeline = build(
        ScriptedTranscoder::with_audio(),
        Some(matching_recognizer()),
        MemoryStorage::without_sizes(),
    );
    let mut sub = pipeline.subscribe();

    let err = pipeline
        .orchestrator
        .run_eager(upload(b"frames"))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Persistence(_)));
    assert_eq!(err.step(), Step::Persist);
    assert!(err.is_fatal());
    assert!(pipeline.repo.is_empty().await);
    assert!(
        pipeline.leftover_files().is_empty(),
        "left behind: {:?}",
        pipeline.leftover_files()
    );

    let events = drain(&mut sub).await;
    assert!(events.iter().any(|e| matches!(
        e.kind,
        EventKind::Failed {
            step: Step::Persist,
            ..
        }
    )));
    assert!(!events
        .iter()
        .any(|e| matches!(e.kind, EventKind::ProcessingCompleted { .. })));
}

#[tokio::test]
async fn hanging_recognizer_times_out_to_skipped() {
    let recognizer = Arc::new(ScriptedRecognizer::new(Script::Hang));
    let pipeline = build_with(
        ScriptedTranscoder::with_audio(),
        Some(recognizer.clone()),
        MemoryStorage::new(),
        |settings| settings.stage_timeout = SHORT_TIMEOUT,
    );

    let record = pipeline
        .orchestrator
        .run_eager(upload(b"frames"))
        .await
        .expect("recognition timeout is not fatal");

    assert_eq!(recognizer.calls(), 1);
    assert_eq!(record.recognition, Some(RecognitionOutcome::Skipped));
    assert_eq!(record.processing_status, ProcessingStatus::Completed);
    assert!(pipeline.leftover_files().is_empty());
}

#[tokio::test]
async fn hanging_thumbnail_render_is_a_fatal_timeout() {
    let pipeline = build_with(
        ScriptedTranscoder {
            hang_thumbnails: true,
            ..ScriptedTranscoder::with_audio()
        },
        None,
        MemoryStorage::new(),
        |settings| settings.stage_timeout = SHORT_TIMEOUT,
    );

    let err = pipeline
        .orchestrator
        .run_eager(upload(b"frames"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Timeout {
            step: Step::Thumbnail,
            after,
        } if after == SHORT_TIMEOUT
    ));
    assert!(err.is_fatal());
    assert!(pipeline.repo.is_empty().await);
    assert!(pipeline.leftover_files().is_empty());
}

#[tokio::test]
async fn upload_failure_is_fatal() {
    let pipeline = build(
        ScriptedTranscoder::silent(),
        None,
        MemoryStorage::failing_uploads(),
    );

    let err = pipeline
        .orchestrator
        .run_eager(upload(b"frames"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Storage {
            step: Step::Upload,
            ..
        }
    ));
    assert!(pipeline.repo.is_empty().await);
    assert!(pipeline.leftover_files().is_empty());
}

#[tokio::test]
async fn probe_failure_is_fatal() {
    let transcoder = ScriptedTranscoder {
        fail_probe: true,
        ..ScriptedTranscoder::with_audio()
    };
    let pipeline = build(transcoder, None, MemoryStorage::new());

    let err = pipeline
        .orchestrator
        .run_eager(upload(b"frames"))
        .await
        .unwrap_err();

    assert_eq!(err.step(), Step::Probe);
    assert!(pipeline.leftover_files().is_empty());
}

#[tokio::test]
async fn invalid_upload_is_rejected_before_any_stage() {
    let pipeline = build(ScriptedTranscoder::silent(), None, MemoryStorage::new());
    let mut sub = pipeline.subscribe();

    let err = pipeline
        .orchestrator
        .run_eager(upload(b""))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Validation(ValidationError::EmptyUpload)
    ));

    let mut bad_extension = upload(b"frames");
    bad_extension.file_name = "notes.txt".into();
    let err = pipeline
        .orchestrator
        .run_eager(bad_extension)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Validation(ValidationError::ExtensionNotAllowed { .. })
    ));

    assert!(drain(&mut sub).await.is_empty());
    assert!(pipeline.leftover_files().is_empty());
}

#[tokio::test]
async fn failed_job_leaves_no_subscriber_state() {
    let pipeline = build(
        ScriptedTranscoder {
            fail_thumbnails: true,
            ..ScriptedTranscoder::silent()
        },
        None,
        MemoryStorage::new(),
    );
    let sub = pipeline.subscribe();
    assert_eq!(pipeline.bus.channel_count(), 1);

    let _ = pipeline.orchestrator.run_eager(upload(b"frames")).await;
    drop(sub);

    assert_eq!(pipeline.bus.channel_count(), 0);
}

#[tokio::test]
async fn publishing_without_subscribers_does_not_block() {
    let pipeline = build(ScriptedTranscoder::silent(), None, MemoryStorage::new());

    let record = pipeline
        .orchestrator
        .run_eager(upload(b"frames"))
        .await
        .unwrap();

    assert_eq!(record.recognition, Some(RecognitionOutcome::Skipped));
    assert_eq!(pipeline.bus.channel_count(), 0);
}

#[tokio::test]
async fn rerunning_the_same_key_keeps_one_record() {
    let pipeline = build(ScriptedTranscoder::silent(), None, MemoryStorage::new());
    let record = pipeline
        .orchestrator
        .run_eager(upload(b"frames"))
        .await
        .unwrap();

    let mut draft = clipflow_core::models::VideoDraft {
        video_key: record.video_key.clone(),
        owner_id: record.owner_id.clone(),
        channel_id: record.channel_id.clone(),
        title: "Renamed".into(),
        description: None,
        tags: vec![],
        duration: record.duration,
        processing_status: ProcessingStatus::Completed,
        recognition: record.recognition.clone(),
        audio_key: None,
        thumbnail_keys: record.thumbnail_keys.clone(),
        primary_thumbnail_key: None,
    };
    let again = pipeline
        .orchestrator
        .catalog()
        .create(draft.clone())
        .await
        .unwrap();
    draft.title = "Renamed twice".into();
    let third = pipeline.orchestrator.catalog().create(draft).await.unwrap();

    assert_eq!(again.id, record.id);
    assert_eq!(third.id, record.id);
    assert_eq!(third.title, "Renamed twice");
    assert_eq!(pipeline.repo.len().await, 1);
}
