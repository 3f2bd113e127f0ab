//! Fire-and-forget device commands
//!
//! [`DeviceCommandThread`] runs one operation against one recorder on its own
//! thread and records how it ended. Errors and panics stay inside the
//! thread. [`fan_out_with_deadline`] runs the same operation on several
//! recorders and waits for them against a wall-clock deadline; threads still
//! running at the deadline are abandoned.

use crate::device::{DeviceInfo, Recorder, SharedRecorder};
use crate::error::DeviceResult;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Polling period while waiting on a fan-out
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a command thread ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Running,
    Completed,
    Failed(String),
}

/// A command running against one device
#[derive(Debug)]
pub struct DeviceCommandThread {
    info: DeviceInfo,
    outcome: Arc<Mutex<CommandOutcome>>,
    handle: Option<JoinHandle<()>>,
}

impl DeviceCommandThread {
    /// Start `op` on a new thread
    pub fn spawn<F>(recorder: SharedRecorder, op: F) -> Self
    where
        F: FnOnce(&dyn Recorder) -> DeviceResult<()> + Send + 'static,
    {
        let info = recorder.info();
        let outcome = Arc::new(Mutex::new(CommandOutcome::Running));
        let thread_outcome = Arc::clone(&outcome);
        let name = info.display_name();

        let spawned = std::thread::Builder::new()
            .name(format!("cmd {}", name))
            .spawn(move || {
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| op(recorder.as_ref())));
                let end = match result {
                    Ok(Ok(())) => CommandOutcome::Completed,
                    Ok(Err(e)) => {
                        tracing::error!("Command failed on {}: {}", name, e);
                        CommandOutcome::Failed(e.to_string())
                    }
                    Err(panic) => {
                        let msg = panic
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "command panicked".to_string());
                        tracing::error!("Command panicked on {}: {}", name, msg);
                        CommandOutcome::Failed(msg)
                    }
                };
                *thread_outcome.lock().unwrap_or_else(PoisonError::into_inner) = end;
            });

        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                *outcome.lock().unwrap_or_else(PoisonError::into_inner) =
                    CommandOutcome::Failed(format!("could not start thread: {}", e));
                None
            }
        };

        Self {
            info,
            outcome,
            handle,
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn outcome(&self) -> CommandOutcome {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome() != CommandOutcome::Running
    }

    /// Wait for the thread and return its outcome
    pub fn join(mut self) -> CommandOutcome {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.outcome()
    }
}

/// Per-device results of a fan-out
#[derive(Debug, Clone, Default)]
pub struct FanOutReport {
    pub succeeded: Vec<DeviceInfo>,
    pub failed: Vec<(DeviceInfo, String)>,
    pub timed_out: Vec<DeviceInfo>,
}

impl FanOutReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && self.timed_out.is_empty()
    }

    /// Names of devices that did not succeed, timed out ones marked
    pub fn failure_names(&self) -> Vec<String> {
        self.failed
            .iter()
            .map(|(info, _)| info.display_name())
            .chain(
                self.timed_out
                    .iter()
                    .map(|info| format!("{} (timed out)", info.display_name())),
            )
            .collect()
    }

    /// Message for the "set all clocks" error box, if anything failed
    pub fn clock_summary(&self) -> Option<String> {
        let names = self.failure_names();
        match names.len() {
            0 => None,
            1 => Some(format!(
                "Could not set recorder clock.\n\n\
                 An error prevented the clock from being set on recorder {}.",
                names[0]
            )),
            _ => Some(format!(
                "Could not set recorder clocks.\n\n\
                 Errors prevented the clocks being set on these recorders:\n\n\u{2022} {}",
                names.join("\n\u{2022} ")
            )),
        }
    }
}

/// Run `op` on every device and wait until all finish or `deadline` passes
///
/// Completions after the deadline are ignored.
pub fn fan_out_with_deadline<F>(devices: &[SharedRecorder], op: F, deadline: Duration) -> FanOutReport
where
    F: Fn(&dyn Recorder) -> DeviceResult<()> + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let threads: Vec<DeviceCommandThread> = devices
        .iter()
        .map(|rec| {
            let op = Arc::clone(&op);
            DeviceCommandThread::spawn(Arc::clone(rec), move |r| (*op)(r))
        })
        .collect();

    let end = Instant::now() + deadline;
    while threads.iter().any(|t| !t.is_finished()) && Instant::now() < end {
        std::thread::sleep(POLL_INTERVAL.min(end.saturating_duration_since(Instant::now())));
    }

    let mut report = FanOutReport::default();
    for thread in threads {
        match thread.outcome() {
            CommandOutcome::Completed => report.succeeded.push(thread.info),
            CommandOutcome::Failed(msg) => report.failed.push((thread.info, msg)),
            CommandOutcome::Running => {
                tracing::error!("Timed out waiting on {}", thread.info.display_name());
                report.timed_out.push(thread.info);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock_device::{MockFailure, MockRecorder};

    #[test]
    fn test_command_thread_records_failure() {
        let rec: SharedRecorder = Arc::new(MockRecorder::new("S3", "1"));
        let t = DeviceCommandThread::spawn(rec, |r| r.set_time());
        assert_eq!(t.join(), CommandOutcome::Completed);

        let rec: SharedRecorder =
            Arc::new(MockRecorder::new("S3", "2").failing_set_time(MockFailure::Busy));
        let t = DeviceCommandThread::spawn(rec, |r| r.set_time());
        assert!(matches!(t.join(), CommandOutcome::Failed(_)));
    }

    #[test]
    fn test_command_thread_catches_panic() {
        let rec: SharedRecorder = Arc::new(MockRecorder::new("S3", "1"));
        let t = DeviceCommandThread::spawn(rec, |_| panic!("boom"));
        assert_eq!(t.join(), CommandOutcome::Failed("boom".to_string()));
    }

    #[test]
    fn test_fan_out_separates_failures_and_timeouts() {
        let devices: Vec<SharedRecorder> = vec![
            Arc::new(MockRecorder::new("S3", "1")),
            Arc::new(MockRecorder::new("S3", "2").failing_set_time(MockFailure::Command)),
            Arc::new(MockRecorder::new("S3", "3").with_set_time_delay(Duration::from_secs(2))),
        ];
        let report = fan_out_with_deadline(&devices, |r| r.set_time(), Duration::from_millis(300));
        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.timed_out.len(), 1);
        assert_eq!(
            report.failure_names(),
            vec!["S3 SN:2".to_string(), "S3 SN:3 (timed out)".to_string()]
        );
        let summary = report.clock_summary().unwrap();
        assert!(summary.contains("\u{2022} S3 SN:3 (timed out)"));
    }

    #[test]
    fn test_single_failure_summary() {
        let devices: Vec<SharedRecorder> =
            vec![Arc::new(MockRecorder::new("S3", "9").failing_set_time(MockFailure::Removed))];
        let report = fan_out_with_deadline(&devices, |r| r.set_time(), Duration::from_secs(1));
        assert!(report.clock_summary().unwrap().contains("recorder S3 SN:9."));
        assert!(!report.all_succeeded());
    }
}
