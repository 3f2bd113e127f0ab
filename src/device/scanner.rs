//! Background device scan
//!
//! The scanner runs on its own thread and keeps the device list current. It
//! talks to the UI over crossbeam channels:
//!
//! - [`ScanCommand`] - UI to scanner (pause, resume, rescan, stop)
//! - [`ScanMessage`] - scanner to UI (device list, failure, stopped)
//! - [`ScanHandle`] - UI-side handle owning both channel ends
//!
//! Each loop iteration either runs a full enumeration or, on odd
//! iterations, only asks the enumerator whether anything changed. While the
//! scan is paused, or while the shared `updating` flag is set by a dialog
//! that is talking to a device, nothing is enumerated and nothing is posted.
//!
//! # Example
//!
//! ```ignore
//! use endaq_config::device::{DeviceScanner, MockEnumerator};
//! use endaq_config::device::scanner::ScanConfig;
//!
//! let (scanner, handle) = DeviceScanner::new(Box::new(MockEnumerator::demo()), ScanConfig::default());
//! scanner.spawn();
//!
//! for msg in handle.drain() {
//!     if let ScanMessage::DeviceList(update) = msg {
//!         println!("{} devices", update.devices.len());
//!     }
//! }
//! ```

use crate::device::{
    BatteryStatus, DeviceEnumerator, DeviceInfo, SharedRecorder, StatusCode, STATUS_IDLE,
};
use crate::error::DeviceError;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Default time between scans
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(1000);

/// How long a vanished device stays in the list
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(4);

/// Scanner timing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanConfig {
    pub interval: Duration,
    pub retention: Duration,
    /// Scan once and stop
    pub one_shot: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SCAN_INTERVAL,
            retention: DEFAULT_RETENTION,
            one_shot: false,
        }
    }
}

/// One row of the device list
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    pub recorder: SharedRecorder,
    pub info: DeviceInfo,
    /// False while a vanished device is being retained
    pub present: bool,
    pub battery: Option<BatteryStatus>,
    pub status: Option<StatusCode>,
}

/// Result of one full scan
#[derive(Debug, Clone, Default)]
pub struct DeviceListUpdate {
    pub devices: Vec<DeviceEntry>,
}

impl DeviceListUpdate {
    pub fn present(&self) -> impl Iterator<Item = &DeviceEntry> {
        self.devices.iter().filter(|d| d.present)
    }
}

/// Message sent from the scanner to the UI
#[derive(Debug, Clone)]
pub enum ScanMessage {
    DeviceList(DeviceListUpdate),
    /// Unrecoverable failure; the scanner has stopped
    ScanFailed(String),
    Stopped,
}

/// Message sent from the UI to the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCommand {
    Pause,
    Resume,
    /// Run a full scan on the next iteration
    Rescan,
    Stop,
}

/// UI-side handle to a running scanner
#[derive(Debug)]
pub struct ScanHandle {
    receiver: Receiver<ScanMessage>,
    command_sender: Sender<ScanCommand>,
    running: Arc<AtomicBool>,
    updating: Arc<AtomicBool>,
}

impl ScanHandle {
    pub fn try_recv(&self) -> Option<ScanMessage> {
        self.receiver.try_recv().ok()
    }

    /// Receive all pending messages
    pub fn drain(&self) -> Vec<ScanMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.receiver.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Block for the next message
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ScanMessage> {
        self.receiver.recv_timeout(timeout).ok()
    }

    pub fn send_command(&self, cmd: ScanCommand) -> bool {
        self.command_sender.send(cmd).is_ok()
    }

    pub fn pause(&self) {
        let _ = self.command_sender.send(ScanCommand::Pause);
    }

    pub fn resume(&self) {
        let _ = self.command_sender.send(ScanCommand::Resume);
    }

    pub fn rescan(&self) {
        let _ = self.command_sender.send(ScanCommand::Rescan);
    }

    /// Ask the scanner to stop; it exits at its next check
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.command_sender.send(ScanCommand::Stop);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Set while a dialog is reading from or writing to a device
    pub fn set_updating(&self, updating: bool) {
        self.updating.store(updating, Ordering::SeqCst);
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

struct Retained {
    entry: DeviceEntry,
    last_seen: Instant,
}

/// The scan worker
pub struct DeviceScanner {
    enumerator: Box<dyn DeviceEnumerator>,
    config: ScanConfig,
    command_rx: Receiver<ScanCommand>,
    message_tx: Sender<ScanMessage>,
    running: Arc<AtomicBool>,
    updating: Arc<AtomicBool>,
    paused: bool,
    rescan: bool,
    iteration: u64,
    order: Vec<String>,
    retained: BTreeMap<String, Retained>,
}

impl DeviceScanner {
    /// Create a scanner and the UI handle that talks to it
    pub fn new(enumerator: Box<dyn DeviceEnumerator>, config: ScanConfig) -> (Self, ScanHandle) {
        let (cmd_tx, cmd_rx) = bounded(32);
        let (msg_tx, msg_rx) = bounded(64);
        let running = Arc::new(AtomicBool::new(true));
        let updating = Arc::new(AtomicBool::new(false));

        let scanner = Self {
            enumerator,
            config,
            command_rx: cmd_rx,
            message_tx: msg_tx,
            running: Arc::clone(&running),
            updating: Arc::clone(&updating),
            paused: false,
            rescan: false,
            iteration: 0,
            order: Vec::new(),
            retained: BTreeMap::new(),
        };
        let handle = ScanHandle {
            receiver: msg_rx,
            command_sender: cmd_tx,
            running,
            updating,
        };
        (scanner, handle)
    }

    /// Run the scan loop on a new thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("device-scan".to_string())
            .spawn(move || self.run())
    }

    /// Run the scan loop on the current thread
    pub fn run(mut self) {
        tracing::info!("Device scan started");

        while self.running.load(Ordering::SeqCst) {
            self.process_commands();
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            if self.paused || self.updating.load(Ordering::SeqCst) {
                self.wait(self.config.interval / 4);
                continue;
            }

            let full_scan = self.config.one_shot
                || std::mem::take(&mut self.rescan)
                || self.iteration % 2 == 0
                || self.enumerator.device_changed();
            self.iteration = self.iteration.wrapping_add(1);

            if full_scan {
                tracing::debug!("Full device scan (iteration {})", self.iteration);
                match self.scan(Instant::now()) {
                    Ok(update) => {
                        if !self.post(ScanMessage::DeviceList(update)) {
                            break;
                        }
                    }
                    Err(DeviceError::Timeout(what)) => {
                        tracing::warn!("Device scan timed out ({}), retrying", what);
                        self.rescan = true;
                    }
                    Err(DeviceError::Busy) => {
                        tracing::info!("Device busy during scan, retrying");
                        self.rescan = true;
                    }
                    Err(DeviceError::Io(e)) => {
                        tracing::warn!("I/O error during device scan: {}", e);
                    }
                    Err(e) => {
                        tracing::error!("Device scan failed: {}", e);
                        self.post(ScanMessage::ScanFailed(e.to_string()));
                        break;
                    }
                }
            }

            if self.config.one_shot {
                break;
            }
            self.wait(self.config.interval);
        }

        self.running.store(false, Ordering::SeqCst);
        self.post(ScanMessage::Stopped);
        tracing::info!("Device scan stopped");
    }

    fn process_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(crossbeam_channel::TryRecvError::Empty) => break,
                Err(crossbeam_channel::TryRecvError::Disconnected) => {
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: ScanCommand) {
        tracing::debug!("Scan command: {:?}", cmd);
        match cmd {
            ScanCommand::Pause => self.paused = true,
            ScanCommand::Resume => {
                self.paused = false;
                self.rescan = true;
            }
            ScanCommand::Rescan => self.rescan = true,
            ScanCommand::Stop => self.running.store(false, Ordering::SeqCst),
        }
    }

    /// Sleep, waking early for commands
    fn wait(&mut self, duration: Duration) {
        match self.command_rx.recv_timeout(duration) {
            Ok(cmd) => self.handle_command(cmd),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => self.running.store(false, Ordering::SeqCst),
        }
    }

    /// Send a message; false if the UI is gone
    fn post(&self, msg: ScanMessage) -> bool {
        match self.message_tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Scan message queue full, dropping update");
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                self.running.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    fn scan(&mut self, now: Instant) -> Result<DeviceListUpdate, DeviceError> {
        let recorders = self.enumerator.get_devices()?;
        let mut seen = HashSet::with_capacity(recorders.len());

        for recorder in recorders {
            let info = recorder.info();
            let key = info.key();
            let (status, battery) = self.device_status(&recorder, &info);
            if !self.order.contains(&key) {
                self.order.push(key.clone());
            }
            seen.insert(key.clone());
            self.retained.insert(
                key,
                Retained {
                    entry: DeviceEntry {
                        recorder,
                        info,
                        present: true,
                        battery,
                        status,
                    },
                    last_seen: now,
                },
            );
        }

        let retention = self.config.retention;
        self.retained.retain(|key, r| {
            let keep = seen.contains(key) || now.saturating_duration_since(r.last_seen) < retention;
            if !keep {
                tracing::info!("Device {} removed", r.entry.info.display_name());
            }
            keep
        });
        for (key, r) in self.retained.iter_mut() {
            if !seen.contains(key) {
                r.entry.present = false;
            }
        }
        let retained = &self.retained;
        self.order.retain(|key| retained.contains_key(key));

        let devices = self
            .order
            .iter()
            .filter_map(|key| self.retained.get(key))
            .map(|r| r.entry.clone())
            .collect();
        Ok(DeviceListUpdate { devices })
    }

    fn device_status(
        &self,
        recorder: &SharedRecorder,
        info: &DeviceInfo,
    ) -> (Option<StatusCode>, Option<BatteryStatus>) {
        if !info.has_command_interface {
            return (Some(STATUS_IDLE), None);
        }
        let running = Arc::clone(&self.running);
        let cancel = move || !running.load(Ordering::SeqCst);

        match recorder.battery_status(&cancel) {
            Ok(battery) => (recorder.status(), Some(battery)),
            Err(DeviceError::Unsupported(_)) => (Some(STATUS_IDLE), None),
            Err(e) => {
                tracing::debug!("Battery query failed for {}: {}", info.display_name(), e);
                match recorder.ping(&cancel) {
                    Ok(()) => (recorder.status(), None),
                    Err(e) => {
                        tracing::debug!("Ping failed for {}: {}", info.display_name(), e);
                        (Some(STATUS_IDLE), None)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock_device::{BatteryBehavior, MockEnumerator, MockFailure, MockRecorder};

    fn scanner_with(devices: Vec<Arc<MockRecorder>>) -> (DeviceScanner, ScanHandle, MockEnumerator) {
        let enumerator = MockEnumerator::new(devices);
        let control = enumerator.handle();
        let config = ScanConfig {
            interval: Duration::from_millis(20),
            retention: Duration::from_millis(200),
            one_shot: false,
        };
        let (scanner, handle) = DeviceScanner::new(Box::new(enumerator), config);
        (scanner, handle, control)
    }

    #[test]
    fn test_one_shot_posts_one_update() {
        let (mut scanner, handle, _) = scanner_with(vec![Arc::new(MockRecorder::new("S3", "1"))]);
        scanner.config.one_shot = true;
        scanner.run();

        let msgs = handle.drain();
        assert_eq!(msgs.len(), 2);
        match &msgs[0] {
            ScanMessage::DeviceList(update) => assert_eq!(update.devices.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(msgs[1], ScanMessage::Stopped));
    }

    #[test]
    fn test_vanished_device_is_retained_then_dropped() {
        let (mut scanner, _handle, control) = scanner_with(vec![
            Arc::new(MockRecorder::new("S3", "1")),
            Arc::new(MockRecorder::new("S3", "2")),
        ]);
        let t0 = Instant::now();
        assert_eq!(scanner.scan(t0).unwrap().devices.len(), 2);

        control.detach("1");
        let update = scanner.scan(t0 + Duration::from_millis(100)).unwrap();
        assert_eq!(update.devices.len(), 2);
        assert_eq!(update.present().count(), 1);
        assert!(!update.devices[0].present);

        let update = scanner.scan(t0 + Duration::from_millis(300)).unwrap();
        assert_eq!(update.devices.len(), 1);
        assert_eq!(update.devices[0].info.serial, "2");
    }

    #[test]
    fn test_status_without_command_interface() {
        let rec = Arc::new(MockRecorder::new("S3", "1").without_command_interface());
        let (mut scanner, _h, _) = scanner_with(vec![rec]);
        let update = scanner.scan(Instant::now()).unwrap();
        assert_eq!(update.devices[0].status, Some(STATUS_IDLE));
        assert!(update.devices[0].battery.is_none());
    }

    #[test]
    fn test_rejected_battery_query_pings() {
        let rec = Arc::new(
            MockRecorder::new("S3", "1")
                .with_status(Some(40))
                .with_battery(BatteryBehavior::Rejected),
        );
        let (mut scanner, _h, _) = scanner_with(vec![rec]);
        let update = scanner.scan(Instant::now()).unwrap();
        assert_eq!(update.devices[0].status, Some(40));
        assert!(update.devices[0].battery.is_none());
    }

    #[test]
    fn test_unsupported_battery_is_idle() {
        let rec = Arc::new(
            MockRecorder::new("S3", "1")
                .with_status(Some(10))
                .with_battery(BatteryBehavior::Unsupported),
        );
        let (mut scanner, _h, _) = scanner_with(vec![rec]);
        let update = scanner.scan(Instant::now()).unwrap();
        assert_eq!(update.devices[0].status, Some(STATUS_IDLE));
    }

    #[test]
    fn test_fatal_error_stops_with_scan_failed() {
        let (scanner, handle, control) = scanner_with(vec![]);
        control.fail_next(MockFailure::Command);
        scanner.run();
        let msgs = handle.drain();
        assert!(matches!(msgs[0], ScanMessage::ScanFailed(_)));
        assert!(matches!(msgs[1], ScanMessage::Stopped));
        assert!(!handle.is_running());
    }
}
