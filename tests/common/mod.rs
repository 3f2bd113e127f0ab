//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use endaq_config::device::{ScanHandle, ScanMessage};
use std::time::{Duration, Instant};

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_millis(100)
}

/// Wait for the next device list from a scanner, skipping other messages
pub fn next_device_list(
    handle: &ScanHandle,
    timeout: Duration,
) -> Option<endaq_config::device::DeviceListUpdate> {
    let deadline = Instant::now() + timeout;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match handle.recv_timeout(remaining)? {
            ScanMessage::DeviceList(update) => return Some(update),
            _ => continue,
        }
    }
    None
}

/// Serials of the present devices in an update, in list order
pub fn present_serials(update: &endaq_config::device::DeviceListUpdate) -> Vec<String> {
    update.present().map(|d| d.info.serial.clone()).collect()
}
