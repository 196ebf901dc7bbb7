//! Process interrupt handling
//!
//! SIGINT and SIGTERM set a shared flag that the event loop checks once per
//! iteration. Every blocking wait in the relay goes through
//! [`ShutdownFlag::sleep`] so a request is noticed within one short slice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// Slice length for interruptible sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Shared "please stop" flag
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless shutdown is requested first.
    ///
    /// Returns `true` if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// Route SIGINT and SIGTERM to `flag`. Only one handler may be installed
/// per process; a second call fails.
pub fn install_signal_handlers(flag: &ShutdownFlag) -> Result<(), ctrlc::Error> {
    let flag = flag.clone();
    ctrlc::set_handler(move || flag.request())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_is_shared_between_clones() {
        let flag = ShutdownFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_requested());
        flag.request();
        assert!(clone.is_requested());
    }

    #[test]
    fn test_sleep_completes_without_request() {
        let flag = ShutdownFlag::new();
        assert!(flag.sleep(Duration::from_millis(5)));
    }

    #[test]
    fn test_sleep_returns_early_on_request() {
        let flag = ShutdownFlag::new();
        let remote = flag.clone();
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.request();
        });

        let started = Instant::now();
        assert!(!flag.sleep(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        waker.join().unwrap();
    }

    #[test]
    fn test_sigterm_requests_shutdown() {
        let flag = ShutdownFlag::new();
        install_signal_handlers(&flag).unwrap();
        assert!(install_signal_handlers(&ShutdownFlag::new()).is_err());

        // SAFETY: the installed handler only sets the flag
        assert_eq!(unsafe { libc::raise(libc::SIGTERM) }, 0);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !flag.is_requested() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(flag.is_requested());
    }
}
