use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::Error;

/// Cooperative cancellation token shared between the host and one
/// engine run.
///
/// Cloning yields a handle to the same flag. The engines check the
/// token at every codec block, every filesystem operation and every
/// synchronous event emission.
#[derive(Debug, Clone, Default)]
pub struct Cancel(Arc<AtomicBool>);

impl Cancel {
    /// Creates a new, unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the cancellation flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns whether the flag has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Fails with [`Error::Cancelled`] when the flag has been raised.
    pub(crate) fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// The IO rendering of cancellation, used inside codec callbacks
    /// where only `std::io::Error` can travel.
    pub(crate) fn io_error() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::Interrupted, "operation was cancelled")
    }
}
