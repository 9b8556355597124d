//! Internet connectivity checks used between retry attempts.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{BoxFuture, Transport};

/// Reports whether the network is currently reachable.
pub trait Connectivity: Send + Sync {
    /// Returns `true` when the network appears usable.
    fn is_online(&self) -> BoxFuture<'_, bool>;
}

/// Connectivity check that fetches a known lightweight URL.
pub struct HttpConnectivity {
    transport: Arc<dyn Transport>,
    probe_url: String,
}

impl HttpConnectivity {
    /// Create a checker that probes `probe_url` through `transport`.
    pub fn new(transport: Arc<dyn Transport>, probe_url: impl Into<String>) -> Self {
        Self {
            transport,
            probe_url: probe_url.into(),
        }
    }

    /// The URL used for connectivity probes.
    pub fn probe_url(&self) -> &str {
        &self.probe_url
    }
}

impl Connectivity for HttpConnectivity {
    fn is_online(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match self.transport.get(&self.probe_url, None).await {
                Ok(_) => true,
                Err(e) => {
                    debug!(error = %e, "connectivity probe failed");
                    false
                }
            }
        })
    }
}

/// Connectivity check that always reports online.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }
}

/// Wait until `connectivity` reports online, polling every `poll_interval`.
///
/// Returns `false` if `cancel` fires before the network comes back.
pub async fn wait_for_connection(
    connectivity: &dyn Connectivity,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> bool {
    let mut announced = false;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        if connectivity.is_online().await {
            if announced {
                info!("Network connection restored");
            }
            return true;
        }
        if !announced {
            info!("Waiting for network connection");
            announced = true;
        }
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports offline for the first `offline_polls` checks.
    struct Flaky {
        offline_polls: usize,
        polls: AtomicUsize,
    }

    impl Connectivity for Flaky {
        fn is_online(&self) -> BoxFuture<'_, bool> {
            Box::pin(async move { self.polls.fetch_add(1, Ordering::SeqCst) >= self.offline_polls })
        }
    }

    #[tokio::test]
    async fn test_wait_for_connection_always_online() {
        let cancel = CancellationToken::new();
        assert!(wait_for_connection(&AlwaysOnline, Duration::from_millis(1), &cancel).await);
    }

    #[tokio::test]
    async fn test_wait_for_connection_polls_until_online() {
        let flaky = Flaky {
            offline_polls: 3,
            polls: AtomicUsize::new(0),
        };
        let cancel = CancellationToken::new();

        assert!(wait_for_connection(&flaky, Duration::from_millis(1), &cancel).await);
        assert_eq!(flaky.polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_wait_for_connection_cancelled() {
        let flaky = Flaky {
            offline_polls: usize::MAX,
            polls: AtomicUsize::new(0),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(!wait_for_connection(&flaky, Duration::from_millis(1), &cancel).await);
    }
}
