//! Named background threads running a closure on a fixed delay.
//!
//! The delay is measured from the end of one run to the start of the next.
//! Stopping sends on a channel the thread sleeps on, so a task waiting out
//! a 24h interval still exits at once. A run that is in progress when stop
//! is requested finishes first.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

/// Handle to a running periodic task. Dropping it stops and joins the thread.
#[derive(Debug)]
pub struct PeriodicTask {
    name: String,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn `task` on a thread named `name`. The first run happens after
    /// `initial_delay`, later runs `interval` after the previous one ended.
    pub fn spawn<F>(
        name: impl Into<String>,
        initial_delay: Duration,
        interval: Duration,
        mut task: F,
    ) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread_name = name.clone();

        let thread = thread::Builder::new().name(name.clone()).spawn(move || {
            let mut delay = initial_delay;
            loop {
                match stop_rx.recv_timeout(delay) {
                    Err(RecvTimeoutError::Timeout) => {
                        task();
                        delay = interval;
                    }
                    // Stop requested, or the handle is gone.
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!(task = %thread_name, "periodic task exiting");
        })?;

        info!(
            task = %name,
            interval_secs = interval.as_secs(),
            "periodic task started"
        );
        Ok(PeriodicTask {
            name,
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.halt();
        info!(task = %self.name, "periodic task stopped");
    }

    fn halt(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.halt();
    }
}
