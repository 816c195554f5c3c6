use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Single-fire session teardown.
///
/// Cloned into every session unit. The first call to [`Teardown::fire`]
/// records its cause and cancels the session token; later calls, from any
/// unit and any thread, are no-ops. Units race each blocking await against
/// [`Teardown::cancelled`], return, and drop their link and endpoint halves,
/// which closes every connection exactly once.
#[derive(Clone, Debug)]
pub struct Teardown {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    token: CancellationToken,
    fired: AtomicBool,
    cause: OnceLock<String>,
}

impl Teardown {
    /// Wrap a session-scoped token. Cancelling a parent of `token` stops the
    /// session without recording a cause.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                token,
                fired: AtomicBool::new(false),
                cause: OnceLock::new(),
            }),
        }
    }

    /// Tear the session down. Returns `true` only for the call that fired.
    pub fn fire(&self, cause: impl Display) -> bool {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        let cause = cause.to_string();
        warn!(%cause, "tearing down session");
        let _ = self.inner.cause.set(cause);
        self.inner.token.cancel();
        true
    }

    /// Whether [`Teardown::fire`] has been called.
    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Whether the session is stopping, either fired or cancelled from above.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// The cause recorded by the first `fire`.
    pub fn cause(&self) -> Option<&str> {
        self.inner.cause.get().map(String::as_str)
    }

    /// Completes once the session is stopping.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn fires_once() {
        let teardown = Teardown::new(CancellationToken::new());
        assert!(!teardown.is_fired());

        assert!(teardown.fire("link 1 closed"));
        assert!(!teardown.fire("link 2 closed"));

        assert!(teardown.is_fired());
        assert!(teardown.is_cancelled());
        assert_eq!(teardown.cause(), Some("link 1 closed"));
    }

    #[test]
    fn concurrent_fire_has_single_winner() {
        let teardown = Teardown::new(CancellationToken::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let teardown = teardown.clone();
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    if teardown.fire(format!("unit {i}")) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(teardown.cause().unwrap().starts_with("unit "));
    }

    #[test]
    fn parent_cancel_stops_without_cause() {
        let parent = CancellationToken::new();
        let teardown = Teardown::new(parent.child_token());

        parent.cancel();
        assert!(teardown.is_cancelled());
        assert!(!teardown.is_fired());
        assert_eq!(teardown.cause(), None);
    }

    #[tokio::test]
    async fn cancelled_resolves_after_fire() {
        let teardown = Teardown::new(CancellationToken::new());
        let waiter = {
            let teardown = teardown.clone();
            tokio::spawn(async move { teardown.cancelled().await })
        };
        teardown.fire("test");
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() should resolve")
            .unwrap();
    }
}
