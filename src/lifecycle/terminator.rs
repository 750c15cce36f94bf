//! Process termination capability
//!
//! The coordinator never calls `std::process::exit` directly. It asks an
//! injected `Terminator`, so tests can observe a forced exit without tearing
//! down the test process.

/// Exit status used for every forced termination
pub const FORCED_EXIT_CODE: i32 = 1;

/// Ends the process with the given status
pub trait Terminator: Send + Sync {
    fn terminate(&self, code: i32);
}

/// Production terminator backed by `std::process::exit`
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self, code: i32) {
        std::process::exit(code);
    }
}

/// Terminator that records exit requests instead of exiting
#[cfg(test)]
#[derive(Default)]
pub struct RecordingTerminator {
    codes: std::sync::Mutex<Vec<i32>>,
    notify: tokio::sync::Notify,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl RecordingTerminator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit codes requested so far, in order
    pub fn codes(&self) -> Vec<i32> {
        self.codes.lock().expect("RecordingTerminator lock poisoned").clone()
    }

    pub fn was_terminated(&self) -> bool {
        !self.codes().is_empty()
    }

    /// Wait until at least one termination has been requested
    pub async fn terminated(&self) {
        loop {
            let notified = self.notify.notified();
            if self.was_terminated() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl Terminator for RecordingTerminator {
    fn terminate(&self, code: i32) {
        self.codes
            .lock()
            .expect("RecordingTerminator lock poisoned")
            .push(code);
        self.notify.notify_waiters();
    }
}
