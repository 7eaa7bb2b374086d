use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use linkme::distributed_slice;
use tracing::debug;

use super::error::Result;
use super::light::PhilipsSettings;
use super::outlet::KasaSettings;
use super::DeviceClass;
use super::DeviceError;
use super::DeviceId;
use super::Driver;
use super::RequestContext;
use crate::config::Config;
use crate::net::CommandRunner;
use crate::net::HueClient;
use crate::net::ProcessRunner;
use crate::net::Prober;
use crate::net::ReqwestHueClient;
use crate::net::SweepConfig;
use crate::net::TcpProber;

/// Builds a driver for one device.
pub type Constructor = fn(DeviceId, &RequestContext, &Services) -> Result<Driver>;

/// Static registration of a driver constructor.
pub struct DriverRegistration {
    pub class: DeviceClass,
    pub brand: &'static str,
    pub construct: Constructor,
}

#[distributed_slice]
pub static DRIVERS: [DriverRegistration];

/// Collaborators handed to every driver at construction.
#[derive(Clone)]
pub struct Services {
    pub runner: Arc<dyn CommandRunner>,
    pub prober: Arc<dyn Prober>,
    pub hue: Arc<dyn HueClient>,
    pub discovery: SweepConfig,
    pub kasa: KasaSettings,
    pub philips: PhilipsSettings,
}

impl Services {
    /// Wire the real process runner, TCP prober and bridge client.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let kasa = config.kasa.settings();
        Ok(Self {
            runner: Arc::new(ProcessRunner::new(Duration::from_secs(
                config.kasa.process_timeout_secs,
            ))),
            prober: Arc::new(TcpProber),
            hue: Arc::new(ReqwestHueClient::new(Duration::from_millis(
                config.philips.request_timeout_ms,
            ))?),
            discovery: config.discovery.sweep_config(),
            kasa,
            philips: config.philips.settings(),
        })
    }
}

/// Maps `(class, brand)` to a driver constructor.
pub struct Registry {
    constructors: HashMap<(DeviceClass, String), Constructor>,
    services: Services,
}

impl Registry {
    /// Registry holding every statically registered driver.
    pub fn new(services: Services) -> Self {
        let mut registry = Self::empty(services);
        for registration in DRIVERS {
            registry.register(registration.class, registration.brand, registration.construct);
        }
        registry
    }

    pub fn empty(services: Services) -> Self {
        Self {
            constructors: HashMap::new(),
            services,
        }
    }

    pub fn register(&mut self, class: DeviceClass, brand: &str, construct: Constructor) {
        debug!("Registering {} driver: {}", class, brand);
        self.constructors.insert((class, brand.to_string()), construct);
    }

    pub fn constructor(&self, class: DeviceClass, brand: &str) -> Option<Constructor> {
        self.constructors.get(&(class, brand.to_string())).copied()
    }

    /// Registered brands for a class, sorted.
    pub fn brands(&self, class: DeviceClass) -> Vec<&str> {
        let mut brands: Vec<&str> = self
            .constructors
            .keys()
            .filter(|(c, _)| *c == class)
            .map(|(_, brand)| brand.as_str())
            .collect();
        brands.sort_unstable();
        brands
    }

    pub fn resolve(
        &self,
        class: DeviceClass,
        brand: &str,
        id: &str,
        ctx: &RequestContext,
    ) -> Result<Driver> {
        let construct =
            self.constructor(class, brand)
                .ok_or_else(|| DeviceError::UnsupportedBrand {
                    class,
                    brand: brand.to_string(),
                })?;
        construct(DeviceId::new(class, brand, id), ctx, &self.services)
    }
}

#[cfg(test)]
impl Services {
    pub fn mock(
        runner: Arc<crate::net::command::MockRunner>,
        prober: Arc<crate::net::probe::MockProber>,
        hue: Arc<crate::net::hue::MockHueClient>,
    ) -> Self {
        Self {
            runner,
            prober,
            hue,
            discovery: SweepConfig {
                range: crate::net::HostRange::new("10.0.0", 1, 4),
                ports: vec![9999, 20002],
                workers: 2,
                probe_timeout: Duration::from_secs(1),
                deadline: Duration::from_secs(10),
                attempts: 3,
                retry_delay: Duration::from_secs(1),
            },
            kasa: KasaSettings::default(),
            philips: PhilipsSettings::default(),
        }
    }
}
