//! Network discovery
//!
//! A sweep fans every host of a [`HostRange`] out to a fixed pool of workers.
//! Each worker pulls hosts from a shared queue and probes the candidate ports
//! in order, reporting the host on the first port that answers. The collector
//! deduplicates results and stops listening at the sweep deadline; whatever
//! arrived by then is the sweep's result.
//!
//! [`DiscoveryEngine::discover`] wraps sweeps in a bounded retry loop and only
//! reports [`DeviceError::NoDevicesFound`] once every attempt came back empty.

use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::probe::Prober;
use crate::device::error::Result;
use crate::device::Data;
use crate::device::DeviceError;

/// Contiguous range of hosts `<subnet>.<start>` ..= `<subnet>.<end>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRange {
    subnet: String,
    start: u8,
    end: u8,
}

impl HostRange {
    /// `subnet` is the first three octets, with or without a trailing dot.
    pub fn new(subnet: &str, start: u8, end: u8) -> Self {
        Self {
            subnet: subnet.trim_end_matches('.').to_string(),
            start,
            end,
        }
    }

    pub fn hosts(&self) -> impl Iterator<Item = String> + '_ {
        (self.start..=self.end).map(move |n| format!("{}.{}", self.subnet, n))
    }

    pub fn len(&self) -> usize {
        if self.start > self.end {
            0
        } else {
            usize::from(self.end - self.start) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for HostRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}-{}", self.subnet, self.start, self.end)
    }
}

/// Parameters for one discovery run.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub range: HostRange,

    /// Candidate ports, probed in order; the first hit wins
    pub ports: Vec<u16>,

    /// Worker pool size (maximum probes in flight)
    pub workers: usize,

    pub probe_timeout: Duration,

    /// Overall wall-clock budget for a single sweep
    pub deadline: Duration,

    /// Total sweeps attempted before giving up
    pub attempts: u32,

    /// Pause between empty sweeps
    pub retry_delay: Duration,
}

/// Result of a single sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sweep {
    pub hosts: BTreeSet<String>,
    pub errors: Vec<String>,

    /// False when the deadline fired before every host was probed
    pub complete: bool,
}

/// Result of a successful discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub hosts: BTreeSet<String>,
    pub errors: Vec<String>,
    pub attempts: u32,
    pub complete: bool,
}

impl Discovery {
    /// `{"ips": [...], "attempts": n, "complete": bool}`, plus `errors` when
    /// any were recorded. `ips` is in numeric address order.
    pub fn to_data(&self) -> Data {
        let mut ips: Vec<&String> = self.hosts.iter().collect();
        ips.sort_by_key(|host| host.parse::<Ipv4Addr>().ok());

        let mut data = Data::new();
        data.insert("ips".to_string(), serde_json::json!(ips));
        data.insert("attempts".to_string(), serde_json::json!(self.attempts));
        data.insert("complete".to_string(), serde_json::json!(self.complete));
        if !self.errors.is_empty() {
            data.insert("errors".to_string(), serde_json::json!(self.errors));
        }
        data
    }
}

pub struct DiscoveryEngine {
    prober: Arc<dyn Prober>,
    config: SweepConfig,
}

impl DiscoveryEngine {
    pub fn new(prober: Arc<dyn Prober>, config: SweepConfig) -> Self {
        Self { prober, config }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run sweeps until one finds a host or the attempt ceiling is reached.
    pub async fn discover(&self) -> Result<Discovery> {
        let attempts = self.config.attempts.max(1);
        let mut errors = Vec::new();

        for attempt in 1..=attempts {
            debug!("Starting sweep attempt {} of {}", attempt, attempts);
            let (sweep, stragglers) = self.run_sweep().await;
            errors.extend(sweep.errors);

            if !sweep.hosts.is_empty() {
                info!(
                    "Sweep attempt {} found {} device(s) on {}",
                    attempt,
                    sweep.hosts.len(),
                    self.config.range
                );
                return Ok(Discovery {
                    hosts: sweep.hosts,
                    errors,
                    attempts: attempt,
                    complete: sweep.complete,
                });
            }

            if attempt < attempts {
                // The next sweep must not overlap probes still running from this one.
                drain(stragglers).await;
                warn!(
                    "Sweep attempt {} found no devices, retrying in {:?}",
                    attempt, self.config.retry_delay
                );
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        warn!("No devices found on {} after {} sweep(s)", self.config.range, attempts);
        Err(DeviceError::NoDevicesFound { attempts })
    }

    /// One pass over the configured range.
    ///
    /// Workers still probing when the deadline fires are left to finish on
    /// their own; their results are dropped.
    pub async fn sweep(&self) -> Sweep {
        self.run_sweep().await.0
    }

    /// A sweep plus the handles of workers that were still running at the
    /// deadline. The list is empty for a complete sweep.
    async fn run_sweep(&self) -> (Sweep, Vec<JoinHandle<()>>) {
        let started = Instant::now();
        let deadline = started + self.config.deadline;

        let queue: VecDeque<String> = self.config.range.hosts().collect();
        let total = queue.len();
        if total == 0 || self.config.ports.is_empty() {
            return (
                Sweep {
                    complete: true,
                    ..Sweep::default()
                },
                Vec::new(),
            );
        }

        let jobs = Arc::new(Mutex::new(queue));
        let workers = self.config.workers.clamp(1, total);
        let (result_tx, mut result_rx) = mpsc::channel::<String>(workers);

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let jobs = jobs.clone();
            let results = result_tx.clone();
            let prober = self.prober.clone();
            let ports = self.config.ports.clone();
            let probe_timeout = self.config.probe_timeout;

            handles.push(tokio::spawn(async move {
                loop {
                    // Collector has returned; stop taking work.
                    if results.is_closed() {
                        break;
                    }
                    let Some(host) = jobs.lock().await.pop_front() else {
                        break;
                    };

                    let mut reachable = false;
                    for &port in &ports {
                        if prober.probe(&host, port, probe_timeout).await {
                            trace!("{}:{} is reachable", host, port);
                            reachable = true;
                            break;
                        }
                    }

                    // A failed send means the sweep already returned; the late result is dropped.
                    if reachable && results.send(host).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        let mut hosts = BTreeSet::new();
        let mut complete = false;
        loop {
            match tokio::time::timeout_at(deadline, result_rx.recv()).await {
                Ok(Some(host)) => {
                    if hosts.insert(host.clone()) {
                        debug!("Found device: {}", host);
                    }
                }
                Ok(None) => {
                    complete = true;
                    break;
                }
                Err(_) => break,
            }
        }
        result_rx.close();

        let mut errors = Vec::new();
        let stragglers = if complete {
            for handle in handles {
                if let Err(e) = handle.await {
                    errors.push(format!("sweep worker failed: {}", e));
                }
            }
            Vec::new()
        } else {
            let pending = jobs.lock().await.len();
            debug!(
                "Sweep deadline of {:?} reached with {} of {} host(s) not yet probed",
                self.config.deadline, pending, total
            );
            handles
        };

        debug!(
            "Sweep of {} completed in {:?}: {} host(s), complete={}",
            self.config.range,
            started.elapsed(),
            hosts.len(),
            complete
        );

        (
            Sweep {
                hosts,
                errors,
                complete,
            },
            stragglers,
        )
    }
}

/// Wait for workers left running by a timed-out sweep. Each one exits after
/// its current host, so this is bounded by one host's probes.
async fn drain(stragglers: Vec<JoinHandle<()>>) {
    if stragglers.is_empty() {
        return;
    }
    debug!("Waiting for {} sweep worker(s) to finish", stragglers.len());
    for handle in stragglers {
        if let Err(e) = handle.await {
            debug!("Sweep worker failed after the deadline: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use super::*;
    use crate::net::probe::MockProber;

    fn config(start: u8, end: u8) -> SweepConfig {
        SweepConfig {
            range: HostRange::new("10.0.0.", start, end),
            ports: vec![9999, 20002],
            workers: 10,
            probe_timeout: Duration::from_secs(1),
            deadline: Duration::from_secs(60),
            attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_host_range() {
        let range = HostRange::new("192.168.101.", 1, 3);
        let hosts: Vec<String> = range.hosts().collect();
        assert_eq!(hosts, vec!["192.168.101.1", "192.168.101.2", "192.168.101.3"]);
        assert_eq!(range.len(), 3);
        assert_eq!(range.to_string(), "192.168.101.1-3");

        let range = HostRange::new("10.1.2", 254, 254);
        assert_eq!(range.hosts().collect::<Vec<_>>(), vec!["10.1.2.254"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_reported_once_when_both_ports_open() {
        let prober = Arc::new(
            MockProber::new()
                .with_host("10.0.0.3", &[9999, 20002])
                .with_host("10.0.0.7", &[20002]),
        );
        let engine = DiscoveryEngine::new(prober.clone(), config(1, 10));

        let sweep = engine.sweep().await;

        let expected: BTreeSet<String> = ["10.0.0.3", "10.0.0.7"].iter().map(|s| s.to_string()).collect();
        assert_eq!(sweep.hosts, expected);
        assert!(sweep.complete);
        assert!(sweep.errors.is_empty());
        // 10.0.0.3 answered on the first port, so its second port was skipped
        assert_eq!(prober.probe_count(), 10 * 2 - 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_in_flight_bounded_by_workers() {
        let prober = Arc::new(MockProber::new());
        let mut cfg = config(1, 50);
        cfg.workers = 4;
        cfg.attempts = 1;
        let engine = DiscoveryEngine::new(prober.clone(), cfg);

        let result = engine.discover().await;

        assert!(matches!(result, Err(DeviceError::NoDevicesFound { attempts: 1 })));
        assert_eq!(prober.peak(), 4);
        assert_eq!(prober.probe_count(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_returns_partial_result() {
        let prober = Arc::new(MockProber::new().with_host("10.0.0.1", &[9999]));
        let mut cfg = config(1, 20);
        cfg.workers = 2;
        cfg.probe_timeout = Duration::from_secs(5);
        cfg.deadline = Duration::from_secs(1);
        let engine = DiscoveryEngine::new(prober, cfg);

        let started = Instant::now();
        let discovery = engine.discover().await.unwrap();

        assert_eq!(discovery.hosts.len(), 1);
        assert!(discovery.hosts.contains("10.0.0.1"));
        assert_eq!(discovery.attempts, 1);
        assert!(!discovery.complete);
        assert!(discovery.errors.is_empty());
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_results_are_dropped() {
        let prober = Arc::new(
            MockProber::new()
                .with_host("10.0.0.1", &[9999])
                .with_slow_host("10.0.0.2", &[9999], Duration::from_secs(3)),
        );
        let mut cfg = config(1, 10);
        cfg.ports = vec![9999];
        cfg.workers = 2;
        cfg.probe_timeout = Duration::from_secs(5);
        cfg.deadline = Duration::from_secs(1);
        let engine = DiscoveryEngine::new(prober.clone(), cfg);

        let sweep = engine.sweep().await;
        assert_eq!(sweep.hosts.len(), 1);
        assert!(!sweep.complete);

        // Let the in-flight probes finish; their sends must fail quietly
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(sweep.hosts.len(), 1);
        // Workers stop pulling hosts once the sweep is closed
        assert!(prober.probe_count() < 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_for_workers_from_timed_out_sweep() {
        let prober = Arc::new(MockProber::new());
        let mut cfg = config(1, 10);
        cfg.workers = 2;
        cfg.probe_timeout = Duration::from_secs(5);
        cfg.deadline = Duration::from_secs(1);
        cfg.attempts = 2;
        let engine = DiscoveryEngine::new(prober.clone(), cfg);

        let started = Instant::now();
        let result = engine.discover().await;

        assert_eq!(result, Err(DeviceError::NoDevicesFound { attempts: 2 }));
        assert_eq!(prober.peak(), 2);
        // Deadline, then both ports of the in-flight hosts, then the retry delay
        assert!(started.elapsed() >= Duration::from_secs(10 + 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_sweeps_escalate_after_all_attempts() {
        let prober = Arc::new(MockProber::new());
        let engine = DiscoveryEngine::new(prober.clone(), config(1, 5));

        let started = Instant::now();
        let result = engine.discover().await;

        assert_eq!(result, Err(DeviceError::NoDevicesFound { attempts: 3 }));
        assert_eq!(prober.probe_count(), 3 * 5 * 2);
        // Three sweeps of one probe timeout per port, two retry delays
        assert_eq!(started.elapsed(), Duration::from_secs(3 * 2 + 2));
    }

    /// Answers only once it has been probed `warm_after` times.
    struct WarmingProber {
        calls: AtomicUsize,
        warm_after: usize,
    }

    #[async_trait]
    impl Prober for WarmingProber {
        async fn probe(&self, _host: &str, _port: u16, _timeout: Duration) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst) >= self.warm_after
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_sweep_succeeds_after_empty_attempt() {
        let prober = Arc::new(WarmingProber {
            calls: AtomicUsize::new(0),
            warm_after: 4,
        });
        let mut cfg = config(1, 2);
        cfg.workers = 1;
        let engine = DiscoveryEngine::new(prober, cfg);

        let discovery = engine.discover().await.unwrap();

        assert_eq!(discovery.attempts, 2);
        assert!(discovery.complete);
        assert_eq!(
            discovery.hosts.iter().cloned().collect::<Vec<_>>(),
            vec!["10.0.0.1", "10.0.0.2"]
        );
    }

    #[test]
    fn test_discovery_to_data() {
        let discovery = Discovery {
            hosts: ["10.0.0.9", "10.0.0.2"].iter().map(|s| s.to_string()).collect(),
            errors: Vec::new(),
            attempts: 1,
            complete: true,
        };
        let data = discovery.to_data();
        assert_eq!(data["ips"], serde_json::json!(["10.0.0.2", "10.0.0.9"]));
        assert_eq!(data["attempts"], serde_json::json!(1));
        assert!(!data.contains_key("errors"));
    }

    #[test]
    fn test_discovery_ips_in_address_order() {
        let discovery = Discovery {
            hosts: ["10.0.0.10", "10.0.0.2", "10.0.0.100"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            errors: Vec::new(),
            attempts: 1,
            complete: true,
        };
        let data = discovery.to_data();
        assert_eq!(
            data["ips"],
            serde_json::json!(["10.0.0.2", "10.0.0.10", "10.0.0.100"])
        );
    }
}
