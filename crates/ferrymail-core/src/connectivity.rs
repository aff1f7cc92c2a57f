//! Network reachability

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Answers whether a network round-trip is currently possible
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Probes reachability by opening a TCP connection
#[derive(Debug, Clone)]
pub struct ProbeConnectivity {
    address: String,
    timeout: Duration,
}

impl ProbeConnectivity {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Connectivity for ProbeConnectivity {
    async fn is_reachable(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("Connectivity probe to {} failed: {}", self.address, e);
                false
            }
            Err(_) => {
                debug!("Connectivity probe to {} timed out", self.address);
                false
            }
        }
    }
}

/// Reachability that is set by hand (offline mode, tests)
#[derive(Debug, Default)]
pub struct FixedConnectivity {
    reachable: AtomicBool,
}

impl FixedConnectivity {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    pub fn set(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connectivity for FixedConnectivity {
    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let probe = ProbeConnectivity::new(address, Duration::from_secs(1));
        assert!(probe.is_reachable().await);
    }

    #[tokio::test]
    async fn test_probe_unreachable_after_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let probe = ProbeConnectivity::new(address, Duration::from_secs(1));
        assert!(!probe.is_reachable().await);
    }

    #[tokio::test]
    async fn test_fixed_connectivity() {
        let connectivity = FixedConnectivity::new(false);
        assert!(!connectivity.is_reachable().await);
        connectivity.set(true);
        assert!(connectivity.is_reachable().await);
    }
}
