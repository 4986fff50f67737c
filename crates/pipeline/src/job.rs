//! Running the pipeline in the background, one run at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::{PipelineError, Result};
use crate::report::RunReport;
use crate::runner::Pipeline;

/// Cooperative cancellation flag shared with a running pipeline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Outcome of [`JobGate::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    AlreadyRunning,
}

/// Admits at most one pipeline run at a time.
#[derive(Default)]
pub struct JobGate {
    running: Arc<AtomicBool>,
    current: Mutex<Option<(CancelToken, JoinHandle<Result<RunReport>>)>>,
}

/// Clears the running flag when the worker exits, panics included.
struct RunningFlag(Arc<AtomicBool>);

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl JobGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start `pipeline` on a background thread unless a run is in flight.
    pub fn submit(&self, pipeline: Pipeline) -> std::io::Result<Submission> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!("run already in progress");
            return Ok(Submission::AlreadyRunning);
        }

        let token = pipeline.cancel_token();
        let flag = RunningFlag(Arc::clone(&self.running));
        let handle = thread::Builder::new()
            .name("ndvimap-run".into())
            .spawn(move || {
                let _flag = flag;
                pipeline.run()
            });

        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        if let Ok(mut current) = self.current.lock() {
            *current = Some((token, handle));
        }
        Ok(Submission::Accepted)
    }

    /// Ask the current run to stop at its next checkpoint.
    pub fn cancel(&self) {
        if let Ok(current) = self.current.lock() {
            if let Some((token, _)) = current.as_ref() {
                token.cancel();
            }
        }
    }

    /// Block until the last submitted run finishes and return its result.
    ///
    /// `None` when nothing was submitted since the last `wait`.
    pub fn wait(&self) -> Option<Result<RunReport>> {
        let (_, handle) = self.current.lock().ok()?.take()?;
        Some(handle.join().unwrap_or_else(|_| {
            Err(PipelineError::Io(std::io::Error::other("pipeline thread panicked")))
        }))
    }
}
