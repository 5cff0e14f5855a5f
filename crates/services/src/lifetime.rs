//! Binds in-flight requests to the lifetime of the screen that issued them.

use std::future::Future;

use tokio::sync::watch;
use tracing::warn;

use crate::error::SessionError;

/// Read side of a session lifetime. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionLifetime {
    closed_rx: watch::Receiver<bool>,
}

/// Owner side. Closing, or dropping it, ends the lifetime.
#[derive(Debug)]
pub struct SessionCloser {
    closed_tx: watch::Sender<bool>,
}

impl SessionLifetime {
    /// Create a fresh, open lifetime and its closer.
    #[must_use]
    pub fn channel() -> (SessionCloser, Self) {
        let (closed_tx, closed_rx) = watch::channel(false);
        (SessionCloser { closed_tx }, Self { closed_rx })
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }

    /// Resolves once the lifetime has ended.
    pub async fn closed(&self) {
        let mut rx = self.closed_rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Drive `fut` unless the lifetime ends first.
    ///
    /// A result that arrives after the lifetime ended is discarded.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the lifetime ended before or while
    /// `fut` ran.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, SessionError>
    where
        F: Future,
    {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        tokio::select! {
            biased;
            () = self.closed() => {
                warn!("session closed while a request was in flight");
                Err(SessionError::Closed)
            }
            output = fut => {
                if self.is_closed() {
                    warn!("discarding response that arrived after the session closed");
                    Err(SessionError::Closed)
                } else {
                    Ok(output)
                }
            }
        }
    }
}

impl SessionCloser {
    pub fn close(&self) {
        self.closed_tx.send_replace(true);
    }

    #[must_use]
    pub fn lifetime(&self) -> SessionLifetime {
        SessionLifetime {
            closed_rx: self.closed_tx.subscribe(),
        }
    }
}

impl Drop for SessionCloser {
    fn drop(&mut self) {
        self.closed_tx.send_replace(true);
    }
}
