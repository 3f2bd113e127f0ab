//! Wi-Fi access point selection
//!
//! The tab merges what a scan can see with the networks already stored on
//! the recorder. Scans run on their own thread and post their results over
//! a channel that [`WifiTab::poll`] drains each frame.

use crate::device::{AccessPoint, KnownNetwork, Recorder, SharedRecorder};
use crate::error::{DeviceError, Result};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Result of a background scan
#[derive(Debug, Clone)]
pub enum WifiMessage {
    ScanComplete(Vec<AccessPoint>),
    ScanFailed(String),
}

/// State of the Wi-Fi tab
#[derive(Debug, Default)]
pub struct WifiTab {
    known: Vec<KnownNetwork>,
    visible: Vec<AccessPoint>,
    modified: bool,
    scan_rx: Option<Receiver<WifiMessage>>,
    cancel: Arc<AtomicBool>,
    last_error: Option<String>,
}

impl WifiTab {
    /// Read the stored networks
    pub fn load(recorder: &dyn Recorder) -> Result<Self> {
        let known = recorder.wifi_networks()?;
        Ok(Self {
            known,
            ..Default::default()
        })
    }

    /// Start a scan on a background thread
    ///
    /// Does nothing if a scan is already running.
    pub fn start_scan(&mut self, recorder: SharedRecorder) {
        if self.is_scanning() {
            return;
        }
        let (tx, rx) = bounded(1);
        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel = Arc::clone(&cancel);
        self.scan_rx = Some(rx);
        self.last_error = None;

        let spawned = std::thread::Builder::new()
            .name("wifi-scan".to_string())
            .spawn(move || {
                let should_stop = || cancel.load(Ordering::SeqCst);
                let msg = match recorder.scan_wifi(&should_stop) {
                    Ok(aps) => WifiMessage::ScanComplete(aps),
                    Err(e) => {
                        tracing::warn!("Wi-Fi scan failed: {}", e);
                        WifiMessage::ScanFailed(e.to_string())
                    }
                };
                let _ = tx.send(msg);
            });
        if let Err(e) = spawned {
            self.scan_rx = None;
            self.last_error = Some(format!("Could not start Wi-Fi scan: {}", e));
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scan_rx.is_some()
    }

    /// Stop waiting for a running scan
    pub fn shutdown(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.scan_rx = None;
    }

    /// Collect scan results; true if the list changed
    pub fn poll(&mut self) -> bool {
        let Some(rx) = &self.scan_rx else {
            return false;
        };
        let msg = match rx.try_recv() {
            Ok(msg) => msg,
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Disconnected) => {
                self.scan_rx = None;
                return false;
            }
        };
        self.scan_rx = None;
        self.handle_message(msg);
        true
    }

    pub fn handle_message(&mut self, msg: WifiMessage) {
        match msg {
            WifiMessage::ScanComplete(aps) => {
                tracing::debug!("Wi-Fi scan found {} access points", aps.len());
                self.visible = aps;
            }
            WifiMessage::ScanFailed(e) => self.last_error = Some(e),
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn known(&self) -> &[KnownNetwork] {
        &self.known
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Visible and known networks, strongest first; known networks out of
    /// range come last
    pub fn access_points(&self) -> Vec<AccessPoint> {
        let mut list: Vec<AccessPoint> = self
            .visible
            .iter()
            .map(|ap| {
                let known = self.known.iter().find(|k| k.ssid == ap.ssid);
                AccessPoint {
                    known: known.is_some() || ap.known,
                    selected: known.map_or(ap.selected, |k| k.selected),
                    ..ap.clone()
                }
            })
            .collect();
        for k in &self.known {
            if !list.iter().any(|ap| ap.ssid == k.ssid) {
                list.push(AccessPoint {
                    ssid: k.ssid.clone(),
                    rssi: None,
                    auth: k.password.is_some(),
                    known: true,
                    selected: k.selected,
                });
            }
        }
        list.sort_by(|a, b| match (a.rssi, b.rssi) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.ssid.cmp(&b.ssid),
        });
        list
    }

    /// Add or update a network, making it the selected one
    pub fn add_network(&mut self, ssid: &str, password: Option<String>) {
        let ssid = ssid.trim();
        if ssid.is_empty() {
            return;
        }
        for k in &mut self.known {
            k.selected = false;
        }
        match self.known.iter_mut().find(|k| k.ssid == ssid) {
            Some(k) => {
                k.selected = true;
                if password.is_some() {
                    k.password = password;
                }
            }
            None => self.known.push(KnownNetwork {
                ssid: ssid.to_string(),
                selected: true,
                password,
            }),
        }
        self.modified = true;
    }

    /// Select a known network
    pub fn select(&mut self, ssid: &str) {
        if !self.known.iter().any(|k| k.ssid == ssid) {
            return;
        }
        for k in &mut self.known {
            let selected = k.ssid == ssid;
            if k.selected != selected {
                k.selected = selected;
                self.modified = true;
            }
        }
    }

    pub fn forget(&mut self, ssid: &str) {
        let before = self.known.len();
        self.known.retain(|k| k.ssid != ssid);
        if self.known.len() != before {
            self.modified = true;
        }
    }

    /// Write the known networks to the recorder, if changed
    pub fn save(&mut self, recorder: &dyn Recorder) -> Result<bool> {
        if !self.modified {
            return Ok(false);
        }
        self.shutdown();
        match recorder.set_wifi_networks(&self.known) {
            Ok(()) => {
                self.modified = false;
                tracing::info!("Saved {} Wi-Fi networks", self.known.len());
                Ok(true)
            }
            Err(DeviceError::Io(e)) => {
                // Usually the device was unplugged part way through
                tracing::warn!("I/O error while setting Wi-Fi: {}", e);
                Err(DeviceError::Io(e).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
