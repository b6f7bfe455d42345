// SPDX-License-Identifier: GPL-3.0-only

//! Thread lifecycle for the acquisition and tracker poll loops
//!
//! One controller owns the loop thread: a shared stop flag, spawn, and join.
//! The loop body reports per-iteration whether it produced work; when it was
//! idle the loop sleeps a bounded interval, so a stop request is always
//! observed promptly without busy-waiting.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

/// Outcome of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopAction {
    /// Work was done; poll again immediately
    Produced,
    /// Nothing was ready; sleep the bounded wait before polling again
    Idle,
    /// Terminate the loop
    Stop,
}

/// Controller for a poll loop running on its own thread
pub(crate) struct PollLoop {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    name: &'static str,
}

impl PollLoop {
    /// Spawn the loop thread
    ///
    /// `body` runs repeatedly until it returns [`LoopAction::Stop`] or
    /// [`stop`](Self::stop) is called; `idle_wait` bounds the sleep between
    /// polls that produced nothing.
    pub(crate) fn start<F>(name: &'static str, idle_wait: Duration, mut body: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        debug!(name, "starting poll loop");

        let handle = thread::spawn(move || {
            loop {
                if stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                match body() {
                    LoopAction::Produced => {}
                    LoopAction::Idle => thread::sleep(idle_wait),
                    LoopAction::Stop => break,
                }
            }
            debug!(name, "poll loop exiting");
        });

        Self {
            handle: Some(handle),
            stop,
            name,
        }
    }

    /// Signal the loop and wait for the thread to finish
    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(name = self.name, "poll loop thread panicked");
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_loop_stops_itself() {
        let count = Arc::new(AtomicU32::new(0));
        let count_in_loop = Arc::clone(&count);

        let mut poll = PollLoop::start("test-self-stop", Duration::from_millis(1), move || {
            if count_in_loop.fetch_add(1, Ordering::SeqCst) >= 9 {
                LoopAction::Stop
            } else {
                LoopAction::Produced
            }
        });

        poll.stop();
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_stop_signal_interrupts_idle_loop() {
        let count = Arc::new(AtomicU32::new(0));
        let count_in_loop = Arc::clone(&count);

        let mut poll = PollLoop::start("test-idle", Duration::from_millis(1), move || {
            count_in_loop.fetch_add(1, Ordering::SeqCst);
            LoopAction::Idle
        });

        while count.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        poll.stop();
        assert!(!poll.is_running());
    }
}
