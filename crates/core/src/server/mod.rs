//! Server side: device registry, sessions and the serve loop.

mod device_manager;
mod discovery;
mod log_forward;
mod serve;
mod session;


pub use device_manager::{DeviceEvent, DeviceKey, DeviceManager};
pub use discovery::{DeviceConnector, DeviceDiscovery, DiscoverySink};
pub use log_forward::{LogForwardLayer, LogForwarder};
pub use serve::{DisconnectReason, serve};
pub use session::{ServerOptions, ServerSession, SessionState};
