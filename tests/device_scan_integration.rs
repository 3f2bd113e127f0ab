//! Integration tests for the device scanner
//!
//! These tests run the scan loop on its own thread and watch the updates:
//! - Devices appearing and disappearing
//! - Pausing while a dialog is open
//! - Shutdown when the UI handle goes away

mod common;

use common::mock_helpers::{enumerator_with, fast_scan_config};
use common::{next_device_list, present_serials};
use endaq_config::device::file_device::write_atomic;
use endaq_config::device::scanner::ScanConfig;
use endaq_config::device::{
    fan_out_with_deadline, DeviceScanner, DirectoryEnumerator, MockRecorder, Recorder,
    ScanMessage, SharedRecorder,
};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(2);

#[test]
fn test_scanner_reports_attach_and_detach() {
    let (enumerator, devices) = enumerator_with(&["100"]);
    let (scanner, handle) = DeviceScanner::new(Box::new(enumerator), fast_scan_config());
    let worker = scanner.spawn().unwrap();

    let first = next_device_list(&handle, WAIT).expect("first scan");
    assert_eq!(present_serials(&first), vec!["100"]);

    devices.attach(Arc::new(MockRecorder::new("W8-E100D40", "200")));
    let mut seen_both = false;
    for _ in 0..50 {
        let update = next_device_list(&handle, WAIT).expect("scan update");
        if present_serials(&update) == vec!["100", "200"] {
            seen_both = true;
            break;
        }
    }
    assert!(seen_both, "attached device never appeared");

    devices.detach("100");
    let mut gone = false;
    for _ in 0..100 {
        let update = next_device_list(&handle, WAIT).expect("scan update");
        if update.devices.iter().all(|d| d.info.serial != "100") {
            gone = true;
            break;
        }
    }
    assert!(gone, "detached device was never dropped");

    handle.stop();
    worker.join().unwrap();
}

#[test]
fn test_detached_device_is_retained_as_absent() {
    let (enumerator, devices) = enumerator_with(&["100", "200"]);
    let config = ScanConfig {
        retention: Duration::from_secs(30),
        ..fast_scan_config()
    };
    let (scanner, handle) = DeviceScanner::new(Box::new(enumerator), config);
    let worker = scanner.spawn().unwrap();
    next_device_list(&handle, WAIT).expect("first scan");

    devices.detach("200");
    let mut retained = false;
    for _ in 0..50 {
        let update = next_device_list(&handle, WAIT).expect("scan update");
        if let Some(entry) = update.devices.iter().find(|d| d.info.serial == "200") {
            if !entry.present {
                retained = true;
                break;
            }
        }
    }
    assert!(retained);

    handle.stop();
    worker.join().unwrap();
}

#[test]
fn test_paused_scanner_posts_nothing() {
    let (enumerator, _devices) = enumerator_with(&["100"]);
    let (scanner, handle) = DeviceScanner::new(Box::new(enumerator), fast_scan_config());
    let worker = scanner.spawn().unwrap();
    next_device_list(&handle, WAIT).expect("first scan");

    handle.set_updating(true);
    // Let an in-flight scan finish, then drop whatever it posted
    thread::sleep(Duration::from_millis(50));
    handle.drain();
    assert!(next_device_list(&handle, Duration::from_millis(100)).is_none());

    handle.set_updating(false);
    assert!(next_device_list(&handle, WAIT).is_some());

    handle.stop();
    worker.join().unwrap();
}

#[test]
fn test_dropping_handle_stops_scanner() {
    let (enumerator, _devices) = enumerator_with(&[]);
    let (scanner, handle) = DeviceScanner::new(Box::new(enumerator), fast_scan_config());
    let worker = scanner.spawn().unwrap();
    drop(handle);
    worker.join().unwrap();
}

#[test]
fn test_stop_posts_stopped() {
    let (enumerator, _devices) = enumerator_with(&["100"]);
    let (scanner, handle) = DeviceScanner::new(Box::new(enumerator), fast_scan_config());
    let worker = scanner.spawn().unwrap();
    handle.stop();
    worker.join().unwrap();
    let messages = handle.drain();
    assert!(matches!(messages.last(), Some(ScanMessage::Stopped)));
}

#[test]
fn test_directory_volumes_are_found() {
    let tmp = TempDir::new().unwrap();
    let devinfo = json!({
        "RecorderInfo": { "ProductName": "S3-D16", "RecorderSerial": 9001 }
    });
    write_atomic(
        &tmp.path().join("REC1/SYSTEM/DEV/DEVINFO.json"),
        &serde_json::to_vec(&devinfo).unwrap(),
    )
    .unwrap();

    let enumerator = DirectoryEnumerator::new(vec![tmp.path().to_path_buf()]);
    let config = ScanConfig {
        one_shot: true,
        ..fast_scan_config()
    };
    let (scanner, handle) = DeviceScanner::new(Box::new(enumerator), config);
    scanner.run();

    let update = next_device_list(&handle, WAIT).expect("one-shot scan");
    assert_eq!(present_serials(&update), vec!["9001"]);
    let entry = &update.devices[0];
    assert_eq!(entry.info.path.as_deref(), Some(tmp.path().join("REC1").as_path()));
}

#[test]
fn test_set_all_clocks_reports_stragglers() {
    let quick: SharedRecorder = Arc::new(MockRecorder::new("S3-D16", "1"));
    let slow: SharedRecorder = Arc::new(
        MockRecorder::new("S3-D16", "2").with_set_time_delay(Duration::from_millis(500)),
    );

    let report = fan_out_with_deadline(
        &[quick, slow],
        |rec| rec.set_time(),
        Duration::from_millis(100),
    );
    assert!(!report.all_succeeded());
    assert!(report.clock_summary().is_some());
}
