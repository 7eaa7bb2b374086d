use super::error::Result;
use super::light::Light;
use super::light::PhilipsLight;
use super::outlet::KasaOutlet;
use super::outlet::Outlet;
use super::Data;
use super::DeviceClass;
use super::DeviceId;
use super::RequestContext;

/// Every supported (class, brand) implementation.
pub enum Driver {
    KasaOutlet(KasaOutlet),
    PhilipsLight(PhilipsLight),
}

impl Driver {
    pub fn identity(&self) -> &DeviceId {
        match self {
            Driver::KasaOutlet(outlet) => outlet.identity(),
            Driver::PhilipsLight(light) => light.identity(),
        }
    }

    pub fn class(&self) -> DeviceClass {
        self.identity().class()
    }

    pub fn as_outlet(&self) -> Option<&dyn Outlet> {
        match self {
            Driver::KasaOutlet(outlet) => Some(outlet),
            Driver::PhilipsLight(_) => None,
        }
    }

    pub fn as_light(&self) -> Option<&dyn Light> {
        match self {
            Driver::PhilipsLight(light) => Some(light),
            Driver::KasaOutlet(_) => None,
        }
    }

    pub async fn execute_action(&self, action: &str, ctx: &RequestContext) -> Result<Option<Data>> {
        match self {
            Driver::KasaOutlet(outlet) => outlet.execute_action(action, ctx).await,
            Driver::PhilipsLight(light) => light.execute_action(action, ctx).await,
        }
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            Driver::KasaOutlet(_) => "KasaOutlet",
            Driver::PhilipsLight(_) => "PhilipsLight",
        };
        f.debug_tuple(variant).field(self.identity()).finish()
    }
}
