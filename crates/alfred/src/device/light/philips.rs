//! Philips Hue lights, reached through the bridge's CLIP v2 API.

use std::sync::Arc;

use async_trait::async_trait;
use linkme::distributed_slice;
use tracing::debug;
use tracing::warn;

use super::Light;
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
use crate::net::hue::Method;
use crate::net::HueClient;
use crate::net::HueRequest;

pub const BRAND: &str = "philips";

#[derive(Debug, Clone, Default)]
pub struct PhilipsSettings {
    /// Bridge used when a request does not name one
    pub bridge: Option<String>,
}

pub struct PhilipsLight {
    identity: DeviceId,
    bridge: String,
    client: Arc<dyn HueClient>,
}

impl PhilipsLight {
    pub fn new(id: impl Into<String>, bridge: impl Into<String>, client: Arc<dyn HueClient>) -> Self {
        Self {
            identity: DeviceId::new(DeviceClass::Light, BRAND, id),
            bridge: bridge.into(),
            client,
        }
    }

    pub fn identity(&self) -> &DeviceId {
        &self.identity
    }

    pub fn bridge(&self) -> &str {
        &self.bridge
    }

    fn collection_url(&self) -> String {
        format!("https://{}/clip/v2/resource/light", self.bridge)
    }

    fn resource_url(&self) -> String {
        format!("{}/{}", self.collection_url(), self.identity.id())
    }

    fn request(&self, method: Method, url: String, ctx: &RequestContext) -> HueRequest {
        HueRequest {
            method,
            url,
            application_key: ctx.credential.clone().unwrap_or_default(),
            body: None,
        }
    }

    async fn put_on(&self, action: &str, on: bool, ctx: &RequestContext) -> Result<Option<Data>> {
        let body = serde_json::json!({ "on": { "on": on } });
        let mut request = self.request(Method::Put, self.resource_url(), ctx);
        request.body = Some(body.to_string().into_bytes());

        let response = self.client.send(request).await?;
        if !response.is_success() {
            warn!(
                "[{}] {} rejected with status {}",
                self.identity.id(),
                action,
                response.status
            );
            return Err(DeviceError::DeviceActionFailed {
                action: action.to_string(),
                output: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }
        Ok(None)
    }

    async fn get(&self, action: &str, url: String, ctx: &RequestContext) -> Result<Option<Data>> {
        let response = self.client.send(self.request(Method::Get, url, ctx)).await?;
        if !response.is_success() {
            return Err(DeviceError::DeviceActionFailed {
                action: action.to_string(),
                output: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        serde_json::from_slice::<Data>(&response.body)
            .map(Some)
            .map_err(|e| DeviceError::MalformedDeviceResponse(e.to_string()))
    }
}

#[async_trait]
impl Light for PhilipsLight {
    fn id(&self) -> &str {
        self.identity.id()
    }

    fn brand(&self) -> &'static str {
        BRAND
    }

    async fn execute_action(&self, action: &str, ctx: &RequestContext) -> Result<Option<Data>> {
        debug!(
            "[{}@{}] Executing action: {}",
            self.identity.id(),
            self.bridge,
            action
        );
        match action {
            "on" => self.on(ctx).await,
            "off" => self.off(ctx).await,
            "state" => self.state(ctx).await,
            "getAll" => self.get_all(ctx).await,
            "brightness" => self.set_brightness(ctx).await,
            "color" => self.set_color(ctx).await,
            _ => Err(DeviceError::unsupported_action(BRAND, action)),
        }
    }

    async fn on(&self, ctx: &RequestContext) -> Result<Option<Data>> {
        self.put_on("on", true, ctx).await
    }

    async fn off(&self, ctx: &RequestContext) -> Result<Option<Data>> {
        self.put_on("off", false, ctx).await
    }

    async fn state(&self, ctx: &RequestContext) -> Result<Option<Data>> {
        self.get("state", self.resource_url(), ctx).await
    }

    async fn get_all(&self, ctx: &RequestContext) -> Result<Option<Data>> {
        self.get("getAll", self.collection_url(), ctx).await
    }

    // TODO: build the dimming body from ctx.payload and PUT it like on/off.
    async fn set_brightness(&self, _ctx: &RequestContext) -> Result<Option<Data>> {
        Ok(None)
    }

    // TODO: build the color body from ctx.payload and PUT it like on/off.
    async fn set_color(&self, _ctx: &RequestContext) -> Result<Option<Data>> {
        Ok(None)
    }
}

fn construct(identity: DeviceId, ctx: &RequestContext, services: &Services) -> Result<Driver> {
    let bridge = ctx
        .bridge
        .clone()
        .or_else(|| services.philips.bridge.clone())
        .ok_or_else(|| {
            DeviceError::InvalidRequest("no bridge host given for philips light".to_string())
        })?;

    Ok(Driver::PhilipsLight(PhilipsLight::new(
        identity.id(),
        bridge,
        services.hue.clone(),
    )))
}

#[distributed_slice(DRIVERS)]
static PHILIPS: DriverRegistration = DriverRegistration {
    class: DeviceClass::Light,
    brand: BRAND,
    construct,
};
