//! Device model for alfred
//!
//! A device is addressed by `(class, brand, id)`. The registry turns that
//! triple into a [`Driver`], a closed set of brand implementations behind one
//! capability trait per class ([`Outlet`], [`Light`]).

mod driver;
pub mod error;
pub mod light;
pub mod outlet;
mod registry;

use serde::Deserialize;
use serde::Serialize;

pub use driver::Driver;
pub use error::DeviceError;
pub use error::ErrorKind;
pub use light::Light;
pub use outlet::Outlet;
pub use registry::Constructor;
pub use registry::DriverRegistration;
pub use registry::Registry;
pub use registry::Services;
pub use registry::DRIVERS;

/// Semi-structured result data produced by a driver.
pub type Data = serde_json::Map<String, serde_json::Value>;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeviceClass {
    Outlet,
    Light,
}

/// Identity of a single device. Fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId {
    class: DeviceClass,
    brand: String,
    id: String,
}

impl DeviceId {
    pub fn new(class: DeviceClass, brand: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            class,
            brand: brand.into(),
            id: id.into(),
        }
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.class, self.brand, self.id)
    }
}

/// Plain description of the caller's request, owned by the dispatcher.
///
/// Drivers never see the transport the request arrived on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Opaque body forwarded to the vendor call, if the action takes one.
    pub payload: Option<Vec<u8>>,

    /// Application-level credential (e.g. the `hue-application-key`).
    pub credential: Option<String>,

    /// Bridge host for devices that are reached through one.
    pub bridge: Option<String>,
}

/// Outcome of a single action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    Success(Option<Data>),
    Failure { kind: ErrorKind, message: String },
}

impl ActionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Success(_))
    }
}

impl From<error::Result<Option<Data>>> for ActionResult {
    fn from(result: error::Result<Option<Data>>) -> Self {
        match result {
            Ok(data) => ActionResult::Success(data),
            // Vendor diagnostic formats are not stable; an unparseable reply is an empty result.
            Err(DeviceError::MalformedDeviceResponse(_)) => ActionResult::Success(None),
            Err(e) => ActionResult::Failure {
                kind: e.kind(),
                message: e.detail(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_class_parses_case_insensitive() {
        assert_eq!("Outlet".parse::<DeviceClass>().unwrap(), DeviceClass::Outlet);
        assert_eq!("light".parse::<DeviceClass>().unwrap(), DeviceClass::Light);
        assert!("toaster".parse::<DeviceClass>().is_err());
        assert_eq!(DeviceClass::Outlet.to_string(), "outlet");
    }

    #[test]
    fn test_device_id_display() {
        let id = DeviceId::new(DeviceClass::Outlet, "kasa", "10.0.0.5");
        assert_eq!(id.to_string(), "outlet/kasa/10.0.0.5");
        assert_eq!(id.brand(), "kasa");
    }

    #[test]
    fn test_action_result_from_malformed_is_empty_success() {
        let result: ActionResult =
            Err(DeviceError::MalformedDeviceResponse("no braces".to_string())).into();
        assert_eq!(result, ActionResult::Success(None));
    }

    #[test]
    fn test_action_result_from_error_is_failure() {
        let result: ActionResult = Err(DeviceError::DeviceActionFailed {
            action: "on".to_string(),
            output: "timeout".to_string(),
        })
        .into();
        assert_eq!(
            result,
            ActionResult::Failure {
                kind: ErrorKind::DeviceActionFailed,
                message: "failed to perform action: on: timeout".to_string(),
            }
        );
        assert!(!result.is_success());
    }
}
