//! Switchable outlets.

pub mod kasa;

use async_trait::async_trait;

use super::error::Result;
use super::Data;
use super::RequestContext;

pub use kasa::KasaOutlet;
pub use kasa::KasaSettings;

/// Capability set shared by every outlet brand.
///
/// Supported actions vary by implementation but typically include:
/// "on", "off", "state", "sysinfo", and "discover".
#[async_trait]
pub trait Outlet: Send + Sync {
    /// Device address (typically an IP address)
    fn id(&self) -> &str;

    fn brand(&self) -> &'static str;

    /// Route a named action to the matching capability
    async fn execute_action(&self, action: &str, ctx: &RequestContext) -> Result<Option<Data>>;

    /// Current on/off state as `{"state": "True" | "False"}`
    async fn state(&self) -> Result<Option<Data>>;

    async fn sys_info(&self) -> Result<Option<Data>>;

    /// Scan the network for outlets of the same brand, as `{"ips": [...]}`
    async fn discover(&self) -> Result<Option<Data>>;
}
