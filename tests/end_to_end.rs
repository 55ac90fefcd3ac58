// tests/end_to_end.rs
//! Record → encrypted upload → load → replay, through the public API

use chrono::{TimeZone, Utc};
use keytrace_engine::recording::event::RawInputEvent;
use keytrace_engine::recording::privacy::PrivacyTier;
use keytrace_engine::replay::driver::PlaybackHandle;
use keytrace_engine::replay::exporter::{import_archive, ExportFormat, Exporter};
use keytrace_engine::replay::player::PlaybackStatus;
use keytrace_engine::storage::record::SessionStatus;
use keytrace_engine::utils::clock::ManualClock;
use keytrace_engine::utils::config::StoreBackend;
use keytrace_engine::{EngineConfig, EngineContext};
use std::sync::Arc;
use std::time::Duration;

fn typed(text: &str) -> RawInputEvent {
    RawInputEvent::Input {
        input_type: "insertText".into(),
        data: Some(text.into()),
        target: Some("editor".into()),
    }
}

fn backspace() -> RawInputEvent {
    RawInputEvent::Input {
        input_type: "deleteContentBackward".into(),
        data: None,
        target: Some("editor".into()),
    }
}

fn memory_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.store.backend = StoreBackend::Memory;
    config
}

/// Records `a`@0, `b`@100, backspace@200, `c`@300 and returns the session id
async fn record_sample(context: &EngineContext) -> String {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()));
    let recorder = context.recorder_with_clock(clock.clone());

    let id = recorder.start("alice", "essay-1", "Draft").await.unwrap();
    recorder.handle_input(typed("a"));
    clock.advance_ms(100);
    recorder.handle_input(typed("b"));
    clock.advance_ms(100);
    recorder.handle_input(backspace());
    clock.advance_ms(100);
    recorder.handle_input(typed("c"));

    let session = recorder.stop().await.unwrap();
    assert!(session.is_finalized());

    let report = recorder.last_report().unwrap();
    assert!(report.flushed);
    assert!(report.completed);
    assert_eq!(report.status.events_uploaded, 4);
    id
}

#[tokio::test]
async fn test_recorded_session_replays_deterministically() {
    let context = EngineContext::open(memory_config()).await.unwrap();
    let id = record_sample(&context).await;

    let sessions = context.store().list_sessions(Some("alice")).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, SessionStatus::Completed);
    assert_eq!(sessions[0].event_count, 4);
    assert_eq!(sessions[0].metrics.as_ref().unwrap().character_count, 3);

    let mut player = context.player();
    player.load_recording(&context.loader(), &id).await.unwrap();
    assert_eq!(player.state().duration_ms, 300);

    for (at, expected) in [(150.0, "ab"), (250.0, "a"), (1_000.0, "ac"), (150.0, "ab")] {
        player.seek(at).unwrap();
        assert_eq!(player.content(), expected, "content at {} ms", at);
    }
}

#[tokio::test]
async fn test_plaintext_never_reaches_the_store() {
    let context = EngineContext::open(memory_config()).await.unwrap();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let recorder = context.recorder_with_clock(clock);

    let id = recorder.start("bob", "notes", "Secrets").await.unwrap();
    recorder.handle_input(typed("hunter2"));
    recorder.stop().await.unwrap();

    let stored = context.store().fetch_session(&id).await.unwrap();
    assert_eq!(stored.events.len(), 1);
    let record = &stored.events[0];
    assert!(!record.ciphertext.contains("hunter2"));
    assert!(record.verify_integrity());

    let loaded = context.loader().load(&id).await.unwrap();
    assert_eq!(loaded.events[0].payload.text.as_deref(), Some("hunter2"));
}

#[tokio::test]
async fn test_metadata_only_recording_replays_empty() {
    let mut config = memory_config();
    config.recorder.privacy_tier = PrivacyTier::MetadataOnly;
    let context = EngineContext::open(config).await.unwrap();
    let id = record_sample(&context).await;

    let loaded = context.loader().load(&id).await.unwrap();
    assert_eq!(loaded.events.len(), 4);
    assert!(loaded.events.iter().all(|e| e.payload.text.is_none()));

    // Metrics were taken before redaction
    let session = context.store().fetch_session(&id).await.unwrap().session;
    assert_eq!(session.metrics.unwrap().character_count, 3);
}

#[tokio::test]
async fn test_sqlite_archive_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.store.sqlite_path = dir.path().join("sessions.db");
    config.crypto.master_key_path = dir.path().join("master.key");
    config.crypto.keystore_path = dir.path().join("keys.db");

    let context = EngineContext::open(config).await.unwrap();
    let id = record_sample(&context).await;

    let recording = context.loader().load(&id).await.unwrap();
    let archive = Exporter::new(ExportFormat::Archive).export(&recording).unwrap();
    let restored = import_archive(&archive).unwrap();
    assert_eq!(restored.session.id, id);
    assert_eq!(restored.events.len(), 4);

    let decoded = context.loader().decode(restored).unwrap();
    assert_eq!(decoded.events, recording.events);

    context.delete_recording(&id).await.unwrap();
    assert!(context.store().list_sessions(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_driver_plays_recording_to_completion() {
    let context = EngineContext::open(memory_config()).await.unwrap();
    let id = record_sample(&context).await;

    let mut player = context.player();
    player.load_recording(&context.loader(), &id).await.unwrap();

    tokio::time::pause();
    let handle = PlaybackHandle::spawn(player);
    assert_eq!(handle.set_speed(10.0).await.unwrap(), 4.0);
    handle.play().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state.status, PlaybackStatus::Complete);
    assert_eq!(snapshot.content, "ac");
    handle.teardown().await.unwrap();
}
