//! TP-Link Kasa outlets, driven through the `kasa` command line tool.

use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use linkme::distributed_slice;
use regex::Regex;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::Outlet;
use crate::device::error::Result;
use crate::device::Data;
use crate::device::DeviceClass;
use crate::device::DeviceError;
use crate::device::DeviceId;
use crate::device::Driver;
use crate::device::DriverRegistration;
use crate::device::RequestContext;
use crate::device::Services;
use crate::device::DRIVERS;
use crate::net::CommandRunner;
use crate::net::DiscoveryEngine;
use crate::net::Prober;
use crate::net::SweepConfig;

pub const BRAND: &str = "kasa";

static STATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Device state:\s+(False|True)").expect("valid state pattern"));

static BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid block pattern"));

#[derive(Debug, Clone)]
pub struct KasaSettings {
    /// Control executable
    pub program: String,

    /// Passed to the tool as `--timeout` for on/off
    pub command_timeout: Duration,

    pub attempts: u32,

    /// Attempt N waits N units before attempt N+1
    pub retry_unit: Duration,

    /// Passed to the tool as `--discovery-timeout` by the CLI sweep
    pub discovery_timeout: Duration,

    /// Worker pool size for the CLI sweep
    pub cli_workers: usize,

    /// Per-host limit for the CLI sweep
    pub cli_probe_timeout: Duration,
}

impl Default for KasaSettings {
    fn default() -> Self {
        Self {
            program: "kasa".to_string(),
            command_timeout: Duration::from_secs(10),
            attempts: 3,
            retry_unit: Duration::from_secs(1),
            discovery_timeout: Duration::from_secs(2),
            cli_workers: 100,
            cli_probe_timeout: Duration::from_secs(15),
        }
    }
}

/// Extract `True`/`False` from the tool's `state` output.
pub fn parse_state(output: &str) -> Option<&str> {
    STATE_RE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Decode the Python-style dict the tool prints for `sysinfo`.
///
/// Takes the outermost brace block, swaps single quotes for double quotes
/// and unwraps nested objects that were printed as strings.
pub fn parse_sysinfo(output: &str) -> Result<Data> {
    let block = BLOCK_RE.find(output).ok_or_else(|| {
        DeviceError::MalformedDeviceResponse("no info block in sysinfo output".to_string())
    })?;

    let json = block
        .as_str()
        .replace('\'', "\"")
        .replace("\"{", "{")
        .replace("}\"", "}");

    serde_json::from_str(&json).map_err(|e| DeviceError::MalformedDeviceResponse(e.to_string()))
}

pub struct KasaOutlet {
    identity: DeviceId,
    runner: Arc<dyn CommandRunner>,
    ports: DiscoveryEngine,
    cli: DiscoveryEngine,
    settings: KasaSettings,
}

impl KasaOutlet {
    pub fn new(
        id: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        prober: Arc<dyn Prober>,
        sweep: SweepConfig,
        settings: KasaSettings,
    ) -> Self {
        let cli_prober = Arc::new(CliProber {
            runner: runner.clone(),
            program: settings.program.clone(),
            discovery_timeout: settings.discovery_timeout,
        });
        let cli_sweep = SweepConfig {
            ports: sweep.ports.iter().take(1).copied().collect(),
            workers: settings.cli_workers,
            probe_timeout: settings.cli_probe_timeout,
            ..sweep.clone()
        };

        Self {
            identity: DeviceId::new(DeviceClass::Outlet, BRAND, id),
            runner,
            ports: DiscoveryEngine::new(prober, sweep),
            cli: DiscoveryEngine::new(cli_prober, cli_sweep),
            settings,
        }
    }

    pub fn identity(&self) -> &DeviceId {
        &self.identity
    }

    fn args(&self, extra: &[&str]) -> Vec<String> {
        let mut args = vec!["--host".to_string(), self.identity.id().to_string()];
        args.extend(extra.iter().map(|s| s.to_string()));
        args
    }

    /// Run `on`/`off`, retrying with a linearly growing pause.
    async fn switch(&self, verb: &str) -> Result<Option<Data>> {
        let timeout = self.settings.command_timeout.as_secs().to_string();
        let args = self.args(&["--timeout", &timeout, verb]);
        let attempts = self.settings.attempts.max(1);
        let mut last_output = String::new();

        for attempt in 1..=attempts {
            match self.runner.run(&self.settings.program, &args).await {
                Ok(output) if output.success => {
                    debug!(
                        "[{}] {} succeeded: {}",
                        self.identity.id(),
                        verb,
                        output.stdout.trim()
                    );
                    return Ok(None);
                }
                Ok(output) => last_output = output.combined(),
                Err(e) => last_output = e.to_string(),
            }

            warn!(
                "[{}] {} attempt {} of {} failed: {}",
                self.identity.id(),
                verb,
                attempt,
                attempts,
                last_output.trim()
            );
            if attempt < attempts {
                tokio::time::sleep(self.settings.retry_unit * attempt).await;
            }
        }

        error!(
            "[{}] All {} attempts failed for {}",
            self.identity.id(),
            attempts,
            verb
        );
        Err(DeviceError::DeviceActionFailed {
            action: verb.to_string(),
            output: last_output,
        })
    }

    /// Run a single read-only query and return its stdout.
    async fn query(&self, verb: &str) -> Result<String> {
        let output = self
            .runner
            .run(&self.settings.program, &self.args(&[verb]))
            .await?;
        if !output.success {
            return Err(DeviceError::DeviceActionFailed {
                action: verb.to_string(),
                output: output.combined(),
            });
        }
        Ok(output.stdout)
    }

    async fn discover_with_cli(&self) -> Result<Option<Data>> {
        debug!(
            "Discovering devices with {} on {}",
            self.settings.program,
            self.cli.config().range
        );
        let discovery = self.cli.discover().await?;
        Ok(Some(discovery.to_data()))
    }
}

#[async_trait]
impl Outlet for KasaOutlet {
    fn id(&self) -> &str {
        self.identity.id()
    }

    fn brand(&self) -> &'static str {
        BRAND
    }

    async fn execute_action(&self, action: &str, _ctx: &RequestContext) -> Result<Option<Data>> {
        debug!("[{}] Executing action: {}", self.identity.id(), action);
        match action {
            "on" | "off" => self.switch(action).await,
            "state" => self.state().await,
            "sysinfo" => self.sys_info().await,
            "discover" | "discoverByPorts" => self.discover().await,
            "discoverByKasa" => self.discover_with_cli().await,
            _ => Err(DeviceError::unsupported_action(BRAND, action)),
        }
    }

    async fn state(&self) -> Result<Option<Data>> {
        let stdout = self.query("state").await?;
        let Some(state) = parse_state(&stdout) else {
            warn!("[{}] No state marker in output", self.identity.id());
            return Ok(None);
        };

        let mut data = Data::new();
        data.insert("state".to_string(), serde_json::json!(state));
        Ok(Some(data))
    }

    async fn sys_info(&self) -> Result<Option<Data>> {
        let stdout = self.query("sysinfo").await?;
        parse_sysinfo(&stdout).map(Some)
    }

    async fn discover(&self) -> Result<Option<Data>> {
        debug!("Scanning for open ports on {}", self.ports.config().range);
        let discovery = self.ports.discover().await?;
        Ok(Some(discovery.to_data()))
    }
}

/// Prober that asks the control tool for the host's state.
///
/// The tool negotiates its own transport, so the port is not used.
struct CliProber {
    runner: Arc<dyn CommandRunner>,
    program: String,
    discovery_timeout: Duration,
}

#[async_trait]
impl Prober for CliProber {
    async fn probe(&self, host: &str, _port: u16, timeout: Duration) -> bool {
        let args = vec![
            "--host".to_string(),
            host.to_string(),
            "--discovery-timeout".to_string(),
            self.discovery_timeout.as_secs().to_string(),
            "state".to_string(),
        ];

        match tokio::time::timeout(timeout, self.runner.run(&self.program, &args)).await {
            Ok(Ok(output)) => output.success && parse_state(&output.stdout).is_some(),
            Ok(Err(e)) => {
                debug!("Error scanning {}: {}", host, e);
                false
            }
            Err(_) => false,
        }
    }
}

fn construct(identity: DeviceId, _ctx: &RequestContext, services: &Services) -> Result<Driver> {
    Ok(Driver::KasaOutlet(KasaOutlet::new(
        identity.id(),
        services.runner.clone(),
        services.prober.clone(),
        services.discovery.clone(),
        services.kasa.clone(),
    )))
}

#[distributed_slice(DRIVERS)]
static KASA: DriverRegistration = DriverRegistration {
    class: DeviceClass::Outlet,
    brand: BRAND,
    construct,
};
