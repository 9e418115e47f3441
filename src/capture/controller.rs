// SPDX-License-Identifier: GPL-3.0-only

//! Capture-control worker
//!
//! All session operations run on one dedicated thread so session rebuilds
//! and request updates never interleave. Callers enqueue commands and get a
//! [`PendingCapture`] future for the result.
//!
//! Rebuilds are latest-wins: each `rebuild_session` call takes a new
//! generation number, and a queued rebuild whose generation is no longer the
//! newest resolves to [`CaptureError::Superseded`] without touching the
//! session. A failed rebuild is reported on the event channel and the
//! worker restores the last configuration that worked.

use super::translator::{ApplyOutcome, CaptureTranslator};
use super::types::{CaptureRequest, CaptureSession, SessionConfig};
use crate::errors::{CaptureError, CaptureResult, PipelineError, PipelineResult};
use crate::params::ParameterVector;
use futures::channel::oneshot;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

/// Notifications from the capture-control worker to the host
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Parameters reached the hardware
    ParametersApplied,
    /// Parameters were held back because no session is configured
    ParametersDeferred,
    /// The session was rebuilt with a new configuration
    Reconfigured(SessionConfig),
    /// A rebuild failed; `restored` is the configuration now in effect
    ReconfigureFailed {
        error: CaptureError,
        restored: Option<SessionConfig>,
    },
}

/// Shared flag that cancels a queued command before it runs
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Result of a queued capture command
///
/// Await it from async code or call [`wait`](Self::wait) from a plain thread.
#[derive(Debug)]
pub struct PendingCapture<T> {
    receiver: oneshot::Receiver<CaptureResult<T>>,
    token: CancellationToken,
}

impl<T> PendingCapture<T> {
    /// Cancel the command if the worker has not started it yet
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Block the current thread until the worker replies
    pub fn wait(self) -> CaptureResult<T> {
        futures::executor::block_on(self)
    }
}

impl<T> Future for PendingCapture<T> {
    type Output = CaptureResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without replying: the worker is gone
            Poll::Ready(Err(_)) => Poll::Ready(Err(CaptureError::WorkerStopped)),
            Poll::Pending => Poll::Pending,
        }
    }
}

enum Command {
    Apply {
        vector: Arc<ParameterVector>,
        token: CancellationToken,
        reply: oneshot::Sender<CaptureResult<ApplyOutcome>>,
    },
    Rebuild {
        config: SessionConfig,
        generation: u64,
        token: CancellationToken,
        reply: oneshot::Sender<CaptureResult<SessionConfig>>,
    },
    Shutdown,
}

/// Handle to the capture-control worker thread
///
/// Dropping the controller stops the worker and closes the session.
pub struct CaptureController {
    commands: mpsc::Sender<Command>,
    latest_generation: Arc<AtomicU64>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CaptureController {
    /// Spawn the worker that owns `session`
    pub fn start(
        session: Box<dyn CaptureSession>,
        translator: CaptureTranslator,
    ) -> PipelineResult<(Self, UnboundedReceiver<CaptureEvent>)> {
        let (commands, command_rx) = mpsc::channel();
        let (events, event_rx) = tokio::sync::mpsc::unbounded_channel();
        let latest_generation = Arc::new(AtomicU64::new(0));

        let mut worker = Worker {
            session,
            translator,
            events,
            latest_generation: Arc::clone(&latest_generation),
            last_good: None,
            last_vector: None,
        };

        info!("Starting capture-control worker");
        let thread_handle = thread::Builder::new()
            .name("capture-control".to_string())
            .spawn(move || worker.run(command_rx))
            .map_err(|e| {
                PipelineError::InvalidState(format!("failed to spawn capture worker: {}", e))
            })?;

        Ok((
            Self {
                commands,
                latest_generation,
                thread_handle: Some(thread_handle),
            },
            event_rx,
        ))
    }

    /// Queue a parameter update for the repeating request
    pub fn apply_parameters(&self, vector: Arc<ParameterVector>) -> PendingCapture<ApplyOutcome> {
        let (reply, receiver) = oneshot::channel();
        let token = CancellationToken::new();
        self.send(Command::Apply {
            vector,
            token: token.clone(),
            reply,
        });
        PendingCapture { receiver, token }
    }

    /// Queue a session rebuild; only the newest queued rebuild runs
    pub fn rebuild_session(&self, config: SessionConfig) -> PendingCapture<SessionConfig> {
        let generation = self.latest_generation.fetch_add(1, Ordering::AcqRel) + 1;
        let (reply, receiver) = oneshot::channel();
        let token = CancellationToken::new();
        debug!(generation, ?config, "Queueing session rebuild");
        self.send(Command::Rebuild {
            config,
            generation,
            token: token.clone(),
            reply,
        });
        PendingCapture { receiver, token }
    }

    fn send(&self, command: Command) {
        // A dead worker drops the reply sender, which resolves the future
        // to WorkerStopped
        if self.commands.send(command).is_err() {
            warn!("Capture-control worker is not running");
        }
    }

    /// Stop the worker and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("Capture-control worker panicked");
            }
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    session: Box<dyn CaptureSession>,
    translator: CaptureTranslator,
    events: UnboundedSender<CaptureEvent>,
    latest_generation: Arc<AtomicU64>,
    last_good: Option<SessionConfig>,
    last_vector: Option<Arc<ParameterVector>>,
}

impl Worker {
    fn run(&mut self, commands: mpsc::Receiver<Command>) {
        debug!("Capture-control worker started");
        while let Ok(command) = commands.recv() {
            match command {
                Command::Apply {
                    vector,
                    token,
                    reply,
                } => {
                    let result = if token.is_cancelled() {
                        Err(CaptureError::Cancelled)
                    } else {
                        self.apply(vector)
                    };
                    let _ = reply.send(result);
                }
                Command::Rebuild {
                    config,
                    generation,
                    token,
                    reply,
                } => {
                    let result = if token.is_cancelled() {
                        Err(CaptureError::Cancelled)
                    } else if generation != self.latest_generation.load(Ordering::Acquire) {
                        debug!(generation, "Skipping superseded session rebuild");
                        Err(CaptureError::Superseded)
                    } else {
                        self.rebuild(config)
                    };
                    let _ = reply.send(result);
                }
                Command::Shutdown => break,
            }
        }

        let _ = self.session.stop_repeating();
        self.session.close();
        info!("Capture-control worker exiting");
    }

    fn apply(&mut self, vector: Arc<ParameterVector>) -> CaptureResult<ApplyOutcome> {
        let spec = self.translator.translate(&vector);
        self.last_vector = Some(vector);

        if !self.session.is_configured() {
            let outcome = self.translator.apply(&spec, None);
            self.emit(CaptureEvent::ParametersDeferred);
            return Ok(outcome);
        }

        let mut request = CaptureRequest::default();
        let outcome = self.translator.apply(&spec, Some(&mut request));
        self.session.set_repeating_request(request)?;
        self.emit(CaptureEvent::ParametersApplied);
        Ok(outcome)
    }

    fn rebuild(&mut self, config: SessionConfig) -> CaptureResult<SessionConfig> {
        info!(?config, "Rebuilding capture session");

        if let Err(e) = self.session.stop_repeating() {
            debug!(error = %e, "stop_repeating failed during rebuild");
        }
        self.session.close();

        match self
            .session
            .configure(&config)
            .and_then(|()| self.install_repeating())
        {
            Ok(()) => {
                self.last_good = Some(config);
                self.emit(CaptureEvent::Reconfigured(config));
                Ok(config)
            }
            Err(e) => {
                warn!(error = %e, "Session rebuild failed, restoring last configuration");
                let restored = self.restore_last_good();
                self.emit(CaptureEvent::ReconfigureFailed {
                    error: e.clone(),
                    restored,
                });
                Err(e)
            }
        }
    }

    fn restore_last_good(&mut self) -> Option<SessionConfig> {
        let config = self.last_good?;
        self.session.close();
        match self
            .session
            .configure(&config)
            .and_then(|()| self.install_repeating())
        {
            Ok(()) => Some(config),
            Err(e) => {
                error!(error = %e, "Failed to restore last good capture configuration");
                None
            }
        }
    }

    /// Install the repeating request from the newest parameters, or auto
    fn install_repeating(&mut self) -> CaptureResult<()> {
        let spec = match &self.last_vector {
            Some(vector) => self.translator.translate(vector),
            None => self
                .translator
                .take_pending()
                .unwrap_or_else(super::types::CaptureRequestSpec::auto),
        };
        let mut request = CaptureRequest::default();
        self.translator.apply(&spec, Some(&mut request));
        self.session.set_repeating_request(request)
    }

    fn emit(&self, event: CaptureEvent) {
        // The host may have dropped the receiver; events are advisory
        let _ = self.events.send(event);
    }
}
