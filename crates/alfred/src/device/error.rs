use serde::Serialize;

use super::DeviceClass;

/// Coarse classification of a [`DeviceError`], used by the boundary layer to
/// pick a status code without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedBrand,
    UnsupportedAction,
    TransientNetworkFailure,
    NoDevicesFound,
    DeviceActionFailed,
    MalformedDeviceResponse,
    InvalidRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("unsupported {class} brand: {brand}")]
    UnsupportedBrand { class: DeviceClass, brand: String },

    #[error("unsupported action for {brand}: {action}")]
    UnsupportedAction { brand: String, action: String },

    /// A single probe or command attempt failed before reaching the device.
    #[error("network failure: {0}")]
    TransientNetworkFailure(String),

    #[error("no devices found after {attempts} sweep(s)")]
    NoDevicesFound { attempts: u32 },

    /// The device was reached but rejected the action. `output` is the last
    /// diagnostic text seen.
    #[error("failed to perform action: {action}")]
    DeviceActionFailed { action: String, output: String },

    #[error("malformed device response: {0}")]
    MalformedDeviceResponse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DeviceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceError::UnsupportedBrand { .. } => ErrorKind::UnsupportedBrand,
            DeviceError::UnsupportedAction { .. } => ErrorKind::UnsupportedAction,
            DeviceError::TransientNetworkFailure(_) => ErrorKind::TransientNetworkFailure,
            DeviceError::NoDevicesFound { .. } => ErrorKind::NoDevicesFound,
            DeviceError::DeviceActionFailed { .. } => ErrorKind::DeviceActionFailed,
            DeviceError::MalformedDeviceResponse(_) => ErrorKind::MalformedDeviceResponse,
            DeviceError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Human-readable message including any captured diagnostic output.
    pub fn detail(&self) -> String {
        match self {
            DeviceError::DeviceActionFailed { output, .. } if !output.trim().is_empty() => {
                format!("{}: {}", self, output.trim())
            }
            _ => self.to_string(),
        }
    }

    pub(crate) fn unsupported_action(brand: &str, action: &str) -> Self {
        DeviceError::UnsupportedAction {
            brand: brand.to_string(),
            action: action.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
