//! Stop requests and connection draining.
//!
//! A server's accept loops and connections all watch one [`ShutdownSignal`].
//! Every accepted connection holds a [`ConnectionToken`] from the server's
//! [`ConnectionTracker`], so `stop` can wait until the last one is released.
//!
//! ```rust
//! use monkey_server::shutdown::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::new();
//! let observer = shutdown.clone();
//!
//! shutdown.trigger();
//! assert!(observer.is_shutdown());
//! ```

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::sync::watch;

/// A one-way stop flag shared between clones.
///
/// Once triggered it stays triggered; every pending and future
/// [`recv`](Self::recv) completes.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    state: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Triggers the signal. Later calls do nothing.
    pub fn trigger(&self) {
        if !self.state.send_replace(true) {
            tracing::debug!("Shutdown signal triggered");
        }
    }

    /// Returns `true` once the signal has been triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.state.borrow()
    }

    /// Completes once the signal is triggered, or immediately if it already
    /// was.
    ///
    /// The subscription is taken here rather than on first poll, so a
    /// trigger between this call and the first poll is still observed.
    pub fn recv(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.state.subscribe();
        async move {
            // The sender lives as long as any clone of the signal.
            let _ = receiver.wait_for(|triggered| *triggered).await;
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Completes on SIGTERM or SIGINT (Ctrl+C outside Unix).
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
pub async fn wait_for_os_signal() -> io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        let mut interrupt = signal(SignalKind::interrupt())?;

        let received = tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = interrupt.recv() => "SIGINT",
        };
        tracing::info!(signal = received, "Stop requested");
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!(signal = "ctrl-c", "Stop requested");
    }

    Ok(())
}

/// Counts the connections a server still has open.
///
/// ```rust
/// use monkey_server::shutdown::ConnectionTracker;
///
/// let tracker = ConnectionTracker::new();
/// let token = tracker.acquire();
/// assert_eq!(tracker.active_connections(), 1);
///
/// drop(token);
/// assert_eq!(tracker.active_connections(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<watch::Sender<usize>>,
}

impl ConnectionTracker {
    /// Creates a tracker with no open connections.
    #[must_use]
    pub fn new() -> Self {
        let (active, _) = watch::channel(0);
        Self {
            active: Arc::new(active),
        }
    }

    /// Counts one more open connection until the token is dropped.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.active.send_modify(|count| *count += 1);
        ConnectionToken {
            active: Arc::clone(&self.active),
        }
    }

    /// Number of tokens currently held.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        *self.active.borrow()
    }

    /// Completes when no tokens are held.
    pub async fn wait_for_drain(&self) {
        let mut receiver = self.active.subscribe();
        let _ = receiver.wait_for(|count| *count == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// One open connection, released on drop.
#[derive(Debug)]
pub struct ConnectionToken {
    active: Arc<watch::Sender<usize>>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        self.active.send_modify(|count| *count -= 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_trigger_is_sticky() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_shutdown());

        signal.trigger();
        signal.trigger();
        assert!(signal.is_shutdown());
    }

    #[test]
    fn test_clones_share_state() {
        let server_side = ShutdownSignal::default();
        let command_side = server_side.clone();

        command_side.trigger();
        assert!(server_side.is_shutdown());
    }

    #[tokio::test]
    async fn test_recv_wakes_on_trigger() {
        let signal = ShutdownSignal::new();
        let trigger = signal.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.trigger();
        });

        tokio::time::timeout(Duration::from_secs(1), signal.recv())
            .await
            .expect("stop should be observed");
    }

    #[test]
    fn test_recv_after_trigger_is_ready() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        tokio_test::block_on(signal.recv());
    }

    #[test]
    fn test_recv_subscribed_before_trigger() {
        let signal = ShutdownSignal::new();
        let pending = signal.recv();
        signal.trigger();
        tokio_test::block_on(pending);
    }

    #[test]
    fn test_tokens_are_counted() {
        let tracker = ConnectionTracker::default();
        let first = tracker.acquire();
        let second = tracker.clone().acquire();
        assert_eq!(tracker.active_connections(), 2);

        drop(first);
        assert_eq!(tracker.active_connections(), 1);
        drop(second);
        assert_eq!(tracker.active_connections(), 0);
    }

    #[test]
    fn test_drain_without_connections() {
        let tracker = ConnectionTracker::new();
        tokio_test::block_on(tracker.wait_for_drain());
    }

    #[tokio::test]
    async fn test_drain_waits_for_last_token() {
        let tracker = ConnectionTracker::new();
        let token = tracker.acquire();

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_for_drain().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        drop(token);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("drain should complete")
            .expect("waiter should not panic");
    }
}
