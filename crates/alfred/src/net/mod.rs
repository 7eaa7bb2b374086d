//! Network and process collaborators used by the device drivers.

pub mod command;
pub mod discovery;
pub mod hue;
pub mod probe;

pub use command::CommandOutput;
pub use command::CommandRunner;
pub use command::ProcessRunner;
pub use discovery::Discovery;
pub use discovery::DiscoveryEngine;
pub use discovery::HostRange;
pub use discovery::Sweep;
pub use discovery::SweepConfig;
pub use hue::HueClient;
pub use hue::HueRequest;
pub use hue::HueResponse;
pub use hue::ReqwestHueClient;
pub use probe::Prober;
pub use probe::TcpProber;
