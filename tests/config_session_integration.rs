//! Integration tests for the configuration dialog session
//!
//! These tests drive a session against recorders on disk and in memory:
//! - Loading stored values and detecting changes
//! - Saving through OK, including format version handling
//! - Cancel with and without pending changes

mod common;

use common::builders::{SnapshotBuilder, VolumeBuilder};
use common::mock_helpers::{answering, open_session, silent_prompter, MockPrompter};
use endaq_config::device::mock_device::MockFailure;
use endaq_config::device::{DirectoryRecorder, MockRecorder};
use endaq_config::engine::{Answer, CancelOutcome, Question};
use endaq_config::types::{ID_RECORDER_NAME, ID_WIFI_ENABLE};
use endaq_config::{ConfigSession, ConfigValue, DialogOptions, Recorder};
use mockall::predicate::eq;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

const ID_TIME_LIMIT: u32 = 0x0bff7f;
const ID_UNKNOWN: u32 = 3;

fn name_node(session: &ConfigSession) -> usize {
    session.tree().node(ID_RECORDER_NAME).expect("name field")
}

#[test]
fn test_directory_recorder_round_trip() {
    let tmp = TempDir::new().unwrap();
    let root = VolumeBuilder::new(tmp.path(), 42)
        .versions(vec![2])
        .config(2, json!({ "589695": "Old Name", "3": 9 }))
        .build();

    let recorder = Arc::new(DirectoryRecorder::open(&root).unwrap());
    let mut session = ConfigSession::open(recorder.clone(), DialogOptions::default()).unwrap();
    assert!(!session.config_changed());

    let node = name_node(&session);
    session
        .set_display_value(node, &ConfigValue::Text("New Name".into()))
        .unwrap();
    assert!(session.config_changed());

    let mut prompter = silent_prompter();
    let result = session.ok(&mut prompter);
    assert_eq!(
        result.values.get(ID_RECORDER_NAME),
        Some(&ConfigValue::Text("New Name".into()))
    );

    // A second look at the volume sees the new name and the untouched unknown ID
    let reopened = DirectoryRecorder::open(&root).unwrap();
    assert_eq!(reopened.info().name, "New Name");
    let stored = reopened.config_values(true).unwrap();
    assert_eq!(stored.get(ID_UNKNOWN), Some(&ConfigValue::Int(9)));
    assert_eq!(reopened.config_version_read(), Some(2));
    assert!(root.join("SYSTEM/CLOCK.json").exists());
}

#[test]
fn test_upgrade_accepted_writes_newest_version() {
    let (recorder, mut session) = open_session(
        MockRecorder::new("S3-D16", "1")
            .with_values(SnapshotBuilder::new().with(ID_TIME_LIMIT, 30i64).build(), Some(1))
            .with_version(Some(1), vec![1, 2]),
    );

    let mut prompter = MockPrompter::new();
    prompter
        .expect_ask()
        .with(eq(Question::UpgradeVersion { read: 1, max: 2 }))
        .times(1)
        .return_const(Answer::Yes);
    prompter.expect_show_error().never();

    session.ok(&mut prompter);
    let (values, version) = recorder.last_write().expect("a write");
    assert_eq!(version, 2);
    assert_eq!(values.get(ID_TIME_LIMIT), Some(&ConfigValue::Int(30)));
}

#[test]
fn test_ok_sets_clock_only_when_asked() {
    let (recorder, mut session) = open_session(MockRecorder::new("S3-D16", "1"));
    session.ok(&mut silent_prompter());
    assert!(recorder.commands().contains(&"set_time"));

    let (recorder, mut session) = open_session(MockRecorder::new("S3-D16", "2"));
    session.options_mut().set_time = false;
    session.ok(&mut silent_prompter());
    assert!(!recorder.commands().contains(&"set_time"));
    assert_eq!(recorder.writes().len(), 1);
}

#[test]
fn test_locked_device_reports_and_closes() {
    let (recorder, mut session) = open_session(
        MockRecorder::new("S3-D16", "1").failing_apply(MockFailure::Locked),
    );

    let mut prompter = MockPrompter::new();
    prompter.expect_ask().never();
    prompter
        .expect_show_error()
        .times(1)
        .returning(|title, _| assert_eq!(title, "Configuration Error"));

    session.ok(&mut prompter);
    assert!(recorder.writes().is_empty());
    assert!(!recorder.commands().contains(&"set_time"));
}

#[test]
fn test_cancel_save_writes_then_closes() {
    let (recorder, mut session) = open_session(MockRecorder::new("S3-D16", "1"));
    let node = name_node(&session);
    session
        .set_display_value(node, &ConfigValue::Text("Edited".into()))
        .unwrap();

    let mut prompter = MockPrompter::new();
    prompter
        .expect_ask()
        .with(eq(Question::SaveBeforeExit))
        .times(1)
        .return_const(Answer::Yes);
    prompter.expect_show_error().never();

    match session.cancel(&mut prompter) {
        CancelOutcome::Close(Some(result)) => {
            assert_eq!(
                result.values.get(ID_RECORDER_NAME),
                Some(&ConfigValue::Text("Edited".into()))
            );
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(recorder.writes().len(), 1);
    assert_eq!(recorder.info().name, "Edited");
}

#[test]
fn test_cancel_discard_leaves_device_alone() {
    let (recorder, mut session) = open_session(MockRecorder::new("S3-D16", "1"));
    let node = name_node(&session);
    session
        .set_display_value(node, &ConfigValue::Text("Edited".into()))
        .unwrap();

    let outcome = session.cancel(&mut answering(Answer::No));
    assert_eq!(outcome, CancelOutcome::Close(None));
    assert!(recorder.writes().is_empty());
}

#[test]
fn test_reset_question_after_enabling_wifi() {
    let (recorder, mut session) = open_session(MockRecorder::new("S3-D16", "1").with_wifi());
    let node = session.tree().node(ID_WIFI_ENABLE).expect("wifi field");
    session.set_raw_value(node, &ConfigValue::Bool(true)).unwrap();

    let mut prompter = MockPrompter::new();
    prompter
        .expect_ask()
        .with(eq(Question::ResetForWifi))
        .times(1)
        .return_const(Answer::Yes);
    prompter.expect_show_error().never();

    session.ok(&mut prompter);
    assert!(recorder.commands().contains(&"reset"));
}

#[test]
fn test_reset_to_defaults_is_a_change() {
    let (_recorder, mut session) = open_session(
        MockRecorder::new("S3-D16", "1")
            .with_values(SnapshotBuilder::new().with(ID_TIME_LIMIT, 30i64).build(), Some(2)),
    );
    assert!(!session.config_changed());
    session.reset_all();
    assert!(session.config_changed());
}
