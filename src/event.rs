//! Event contract between the engines and the host.
//!
//! The host implements [`EventHandler`]. With a synchronous start the
//! engine invokes the handler inline on the caller's thread. With an
//! asynchronous start the engine runs on a worker thread and sends
//! [`EngineEvent`] values over a channel; the host pumps the receiver
//! on its main thread and hands each event to
//! [`EngineEvent::deliver`]. Events that solicit a decision carry a
//! reply channel, keeping them synchronous from the worker's point of
//! view while the host answers on its own thread.

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::{Cancel, Error};

/// Host reply to a [`EventHandler::conflict`] request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConflictAction {
    /// The host did not handle the conflict. Treated as [`ConflictAction::Skip`].
    #[default]
    Unhandled,
    /// Replace the existing filesystem object.
    Overwrite,
    /// Write the entry to a different path instead.
    ChangeDestination(PathBuf),
    /// Leave the existing object alone and drop the entry.
    Skip,
}

/// Typed callbacks the host registers for one engine run.
///
/// Every method has a default implementation, so a host only overrides
/// what it cares about.
#[allow(unused_variables)]
pub trait EventHandler {
    /// The scan pass finished. Extraction only; emitted once, before
    /// any progress event.
    fn scanned(&mut self, total_files: u64) {}

    /// The engine settled on a destination. For extraction the host may
    /// return a replacement path; the engine waits for the reply. For
    /// compression the event is informational and the reply is ignored.
    fn decide_destination(&mut self, proposed: &Path, entry_paths: &[PathBuf]) -> Option<PathBuf> {
        None
    }

    /// Periodic progress, rate-limited by the engine's notify interval.
    fn progress(&mut self, completed_size: u64, completed_files: u64) {}

    /// An entry collides with an existing filesystem object. Extraction
    /// only; the engine waits for the reply.
    fn conflict(&mut self, path: &Path) -> ConflictAction {
        ConflictAction::Unhandled
    }

    /// The archive is encrypted and no passphrase is set. Extraction
    /// only; the engine waits for the reply. Returning `None` fails the
    /// run with [`Error::PassphraseRequired`].
    fn request_passphrase(&mut self) -> Option<String> {
        None
    }

    /// Terminal: the run was cancelled and the engine exited cleanly.
    fn cancelled(&mut self) {}

    /// Terminal: the run completed successfully.
    fn completed(&mut self) {}

    /// Terminal: the run failed.
    fn error(&mut self, error: &Error) {}
}

/// An engine event marshalled across threads in asynchronous mode.
#[derive(Debug)]
pub enum EngineEvent {
    /// See [`EventHandler::scanned`].
    Scanned {
        /// Number of entries discovered by the scan pass.
        total_files: u64,
    },
    /// See [`EventHandler::decide_destination`].
    DecideDestination {
        /// Destination (or common prefix) the engine settled on.
        proposed: PathBuf,
        /// Paths the entries would be written to.
        entry_paths: Vec<PathBuf>,
        /// Reply channel for the host's replacement destination.
        reply: Sender<Option<PathBuf>>,
    },
    /// See [`EventHandler::progress`].
    Progress {
        /// Bytes written so far.
        completed_size: u64,
        /// Entries written so far.
        completed_files: u64,
    },
    /// See [`EventHandler::conflict`].
    Conflict {
        /// The path that collides with an existing object.
        path: PathBuf,
        /// Reply channel for the host's decision.
        reply: Sender<ConflictAction>,
    },
    /// See [`EventHandler::request_passphrase`].
    RequestPassphrase {
        /// Reply channel for the passphrase.
        reply: Sender<Option<String>>,
    },
    /// Terminal: cancelled.
    Cancelled,
    /// Terminal: success.
    Completed,
    /// Terminal: failure.
    Error(Error),
}

impl EngineEvent {
    /// Dispatches this event into a host handler and posts the reply
    /// for the value-returning events. Call this on the thread the
    /// handler lives on.
    pub fn deliver(self, handler: &mut dyn EventHandler) {
        match self {
            EngineEvent::Scanned { total_files } => handler.scanned(total_files),
            EngineEvent::DecideDestination {
                proposed,
                entry_paths,
                reply,
            } => {
                let answer = handler.decide_destination(&proposed, &entry_paths);
                let _ = reply.send(answer);
            }
            EngineEvent::Progress {
                completed_size,
                completed_files,
            } => handler.progress(completed_size, completed_files),
            EngineEvent::Conflict { path, reply } => {
                let answer = handler.conflict(&path);
                let _ = reply.send(answer);
            }
            EngineEvent::RequestPassphrase { reply } => {
                let answer = handler.request_passphrase();
                let _ = reply.send(answer);
            }
            EngineEvent::Cancelled => handler.cancelled(),
            EngineEvent::Completed => handler.completed(),
            EngineEvent::Error(error) => handler.error(&error),
        }
    }

    /// Returns whether this is one of the terminal events.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineEvent::Cancelled | EngineEvent::Completed | EngineEvent::Error(_)
        )
    }
}

/// Forwards handler calls over a channel. This is the handler the
/// worker thread talks to in asynchronous mode.
pub(crate) struct ChannelEmitter {
    tx: Sender<EngineEvent>,
    cancel: Cancel,
}

impl ChannelEmitter {
    pub(crate) fn new(cancel: Cancel) -> (Self, Receiver<EngineEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx, cancel }, rx)
    }

    /// Sends a request event and blocks for the reply, staying
    /// responsive to cancellation. A disconnected host counts as an
    /// unanswered request.
    fn request<T>(&self, event: impl FnOnce(Sender<T>) -> EngineEvent, unanswered: T) -> T {
        let (reply_tx, reply_rx) = bounded(1);
        if self.tx.send(event(reply_tx)).is_err() {
            return unanswered;
        }
        loop {
            if self.cancel.is_cancelled() {
                return unanswered;
            }
            match reply_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(value) => return value,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return unanswered,
            }
        }
    }
}

impl EventHandler for ChannelEmitter {
    fn scanned(&mut self, total_files: u64) {
        let _ = self.tx.send(EngineEvent::Scanned { total_files });
    }

    fn decide_destination(&mut self, proposed: &Path, entry_paths: &[PathBuf]) -> Option<PathBuf> {
        let proposed = proposed.to_path_buf();
        let entry_paths = entry_paths.to_vec();
        self.request(
            move |reply| EngineEvent::DecideDestination {
                proposed,
                entry_paths,
                reply,
            },
            None,
        )
    }

    fn progress(&mut self, completed_size: u64, completed_files: u64) {
        let _ = self.tx.send(EngineEvent::Progress {
            completed_size,
            completed_files,
        });
    }

    fn conflict(&mut self, path: &Path) -> ConflictAction {
        let path = path.to_path_buf();
        self.request(
            move |reply| EngineEvent::Conflict { path, reply },
            ConflictAction::Unhandled,
        )
    }

    fn request_passphrase(&mut self) -> Option<String> {
        self.request(|reply| EngineEvent::RequestPassphrase { reply }, None)
    }

    fn cancelled(&mut self) {
        let _ = self.tx.send(EngineEvent::Cancelled);
    }

    fn completed(&mut self) {
        let _ = self.tx.send(EngineEvent::Completed);
    }

    fn error(&mut self, error: &Error) {
        let _ = self.tx.send(EngineEvent::Error(error.clone_approx()));
    }
}

/// Running totals of one engine run.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Counters {
    pub(crate) completed_size: u64,
    pub(crate) total_size: u64,
    pub(crate) completed_files: u64,
    pub(crate) total_files: u64,
}

/// Counters plus throttled progress emission, shared by both engines.
pub(crate) struct Progress<'a> {
    pub(crate) handler: &'a mut dyn EventHandler,
    pub(crate) counters: Counters,
    throttle: Throttle,
}

impl<'a> Progress<'a> {
    pub(crate) fn new(handler: &'a mut dyn EventHandler, interval: Duration) -> Self {
        Self {
            handler,
            counters: Counters::default(),
            throttle: Throttle::new(interval),
        }
    }

    pub(crate) fn add_size(&mut self, bytes: u64) {
        self.counters.completed_size += bytes;
        self.notify();
    }

    pub(crate) fn file_done(&mut self) {
        self.counters.completed_files += 1;
        self.notify();
    }

    pub(crate) fn notify(&mut self) {
        if self.throttle.ready() {
            self.handler
                .progress(self.counters.completed_size, self.counters.completed_files);
        }
    }

    /// Unthrottled emission, used for the forced final progress event.
    pub(crate) fn force_notify(&mut self) {
        self.throttle.force();
        self.notify();
    }
}

/// Rate limiter for progress events.
pub(crate) struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Returns whether enough time has passed since the previous
    /// emission, and records the emission when it has.
    pub(crate) fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Forces the next [`Throttle::ready`] call to fire.
    pub(crate) fn force(&mut self) {
        self.last = None;
    }
}
