//! Addressable lights.

pub mod philips;

use async_trait::async_trait;

use super::error::Result;
use super::Data;
use super::RequestContext;

pub use philips::PhilipsLight;
pub use philips::PhilipsSettings;

/// Capability set shared by every light brand.
#[async_trait]
pub trait Light: Send + Sync {
    /// Light resource id on its bridge. Empty for bridge-wide queries.
    fn id(&self) -> &str;

    fn brand(&self) -> &'static str;

    async fn execute_action(&self, action: &str, ctx: &RequestContext) -> Result<Option<Data>>;

    async fn on(&self, ctx: &RequestContext) -> Result<Option<Data>>;

    async fn off(&self, ctx: &RequestContext) -> Result<Option<Data>>;

    /// Read this light
    async fn state(&self, ctx: &RequestContext) -> Result<Option<Data>>;

    /// Read every light on the bridge
    async fn get_all(&self, ctx: &RequestContext) -> Result<Option<Data>>;

    async fn set_brightness(&self, ctx: &RequestContext) -> Result<Option<Data>>;

    async fn set_color(&self, ctx: &RequestContext) -> Result<Option<Data>>;
}
