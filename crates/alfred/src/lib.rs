pub mod api;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod net;

pub use config::Config;
pub use config::ConfigError;
pub use config::LogLevel;
pub use device::DeviceClass;
pub use device::DeviceError;
pub use device::ErrorKind;
pub use dispatch::DispatchRequest;
pub use dispatch::DispatchResponse;
pub use dispatch::Dispatcher;
