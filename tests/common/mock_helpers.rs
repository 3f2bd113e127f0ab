//! Mock construction helpers

use endaq_config::device::scanner::ScanConfig;
use endaq_config::device::{MockEnumerator, MockRecorder};
use endaq_config::engine::{Answer, Prompter, Question};
use endaq_config::{ConfigSession, DialogOptions};
use mockall::mock;
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Prompter {}

    impl Prompter for Prompter {
        fn ask(&mut self, question: &Question) -> Answer;
        fn show_error(&mut self, title: &str, message: &str);
    }
}

/// A prompter that fails the test if anything is asked or shown
pub fn silent_prompter() -> MockPrompter {
    let mut prompter = MockPrompter::new();
    prompter.expect_ask().never();
    prompter.expect_show_error().never();
    prompter
}

/// A prompter giving the same answer to every question
pub fn answering(answer: Answer) -> MockPrompter {
    let mut prompter = MockPrompter::new();
    prompter.expect_ask().returning(move |_| answer);
    prompter
}

/// Open a dialog session on a mock recorder, keeping a handle to the mock
pub fn open_session(recorder: MockRecorder) -> (Arc<MockRecorder>, ConfigSession) {
    let recorder = Arc::new(recorder);
    let session = ConfigSession::open(recorder.clone(), DialogOptions::default())
        .expect("demo schema should open");
    (recorder, session)
}

/// Fast scanner timing for tests
pub fn fast_scan_config() -> ScanConfig {
    ScanConfig {
        interval: Duration::from_millis(10),
        retention: Duration::from_millis(60),
        one_shot: false,
    }
}

/// An enumerator with the given serials attached, plus a handle to it
pub fn enumerator_with(serials: &[&str]) -> (MockEnumerator, MockEnumerator) {
    let devices = serials
        .iter()
        .map(|s| Arc::new(MockRecorder::new("S3-D16", s)))
        .collect();
    let enumerator = MockEnumerator::new(devices);
    let handle = enumerator.handle();
    (enumerator, handle)
}
