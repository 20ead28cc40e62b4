//! Batch cancellation with a recorded cause

use std::sync::{Arc, OnceLock};

use kiln_errors::Error;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// A cancellation token that remembers why it was cancelled
///
/// The first call to [`CancelScope::cancel_with`] wins; later causes are
/// ignored. Child scopes observe their parent's cancellation and report the
/// parent's cause when they have none of their own.
#[derive(Debug, Clone, Default)]
pub struct CancelScope {
    token: CancellationToken,
    cause: Arc<OnceLock<Error>>,
    parent: Option<Arc<CancelScope>>,
}

impl CancelScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope cancelled together with `self`, but cancellable on its own
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            cause: Arc::new(OnceLock::new()),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Record `cause` (if none is recorded yet) and cancel.
    pub fn cancel_with(&self, cause: Error) {
        let _ = self.cause.set(cause);
        self.token.cancel();
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail with `Cancelled` once the scope has been cancelled
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` carrying the recorded cause.
    pub fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(self.annotate(Error::cancelled()))
        } else {
            Ok(())
        }
    }

    #[must_use]
    pub fn cause(&self) -> Option<&Error> {
        self.cause
            .get()
            .or_else(|| self.parent.as_deref().and_then(CancelScope::cause))
    }

    /// Attach the recorded cause to a bare cancellation inside `err`.
    #[must_use]
    pub fn annotate(&self, err: Error) -> Error {
        err.with_cause(self.cause())
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
