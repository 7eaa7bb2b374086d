use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Reachability check for a single `host:port` pair.
///
/// Host down, port closed and timeout are all reported as `false`. An
/// implementation must return within `timeout`.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

/// TCP connect prober. The stream is dropped as soon as the handshake
/// completes, no data is exchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, host: &str, port: u16, probe_timeout: Duration) -> bool {
        match timeout(probe_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                drop(stream);
                true
            }
            Ok(Err(_)) | Err(_) => false,
        }
    }
}

/// Mock prober for testing
///
/// Hosts listed in `reachable` answer on the given ports, after the extra
/// delay in `slow` if they have one; everything else waits out the full
/// timeout. Tracks the peak number of probes in flight.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockProber {
    pub reachable: std::collections::HashMap<String, Vec<u16>>,
    /// Hosts that only answer after this much extra delay
    pub slow: std::collections::HashMap<String, Duration>,
    in_flight: std::sync::atomic::AtomicUsize,
    pub peak: std::sync::atomic::AtomicUsize,
    pub probes: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, ports: &[u16]) -> Self {
        self.reachable.insert(host.to_string(), ports.to_vec());
        self
    }

    pub fn with_slow_host(mut self, host: &str, ports: &[u16], delay: Duration) -> Self {
        self.reachable.insert(host.to_string(), ports.to_vec());
        self.slow.insert(host.to_string(), delay);
        self
    }

    pub fn peak(&self) -> usize {
        self.peak.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl Prober for MockProber {
    async fn probe(&self, host: &str, port: u16, probe_timeout: Duration) -> bool {
        use std::sync::atomic::Ordering;

        self.probes.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let open = self
            .reachable
            .get(host)
            .is_some_and(|ports| ports.contains(&port));
        let delay = if open {
            self.slow.get(host).copied().unwrap_or_default()
        } else {
            probe_timeout
        };
        tokio::time::sleep(delay.min(probe_timeout)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        open && delay <= probe_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_probe_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(
            TcpProber
                .probe("127.0.0.1", port, Duration::from_secs(1))
                .await
        );
    }

    #[tokio::test]
    async fn test_tcp_probe_closed_port() {
        // Bind then drop to get a port that is very likely closed
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        assert!(
            !TcpProber
                .probe("127.0.0.1", port, Duration::from_secs(1))
                .await
        );
    }

    #[tokio::test]
    #[ignore]
    async fn test_tcp_probe_times_out_on_unroutable_host() {
        let start = std::time::Instant::now();
        let reachable = TcpProber
            .probe("203.0.113.1", 9999, Duration::from_millis(200))
            .await;
        assert!(!reachable);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
