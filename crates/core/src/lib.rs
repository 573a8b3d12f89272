//! hapwire - device protocol resolution, command dispatch and sessions.
//!
//! - **[`config`]**: the device catalog and protocol resolution
//! - **[`device`]**: connected devices, command dispatch and protocol encoders
//! - **[`server`]**: the shared device registry and per-connection sessions
//! - **[`client`]**: the client session and its device mirror
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   events / replies   ┌──────────────┐
//! │    Client    │◀────────────────────▶│ServerSession │ one per connection
//! └──────────────┘    runtime crate     └──────┬───────┘
//!                                       ┌──────▼───────┐
//!                                       │DeviceManager │ shared
//!                                       └──┬────────┬──┘
//!                          ┌───────────────▼┐      ┌▼──────────────┐
//!                          │ Configuration  │      │ DeviceHandle  │
//!                          │    Manager     │      │  + protocol   │
//!                          └────────────────┘      └───────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hapwire::client::{Client, EmbeddedConnector};
//! use hapwire::config::DeviceConfigurationManager;
//! use hapwire::device::ProtocolRegistry;
//! use hapwire::server::{DeviceManager, ServerOptions};
//!
//! let config = Arc::new(DeviceConfigurationManager::new(ProtocolRegistry::builtin()));
//! config.load_base_json(include_str!("devices.json"))?;
//! let devices = DeviceManager::new(config);
//! devices.start();
//!
//! let client = Client::new("example", EmbeddedConnector::new(devices, ServerOptions::default()));
//! client.connect().await?;
//! client.start_scanning().await?;
//! ```

pub mod client;
pub mod config;
pub mod device;
pub mod server;
pub mod simulated;

pub use client::{Client, ClientDevice, ClientEvent};
pub use config::DeviceConfigurationManager;
pub use device::{DeviceHandle, ProtocolRegistry};
pub use hapwire_protocol as protocol;
pub use hapwire_runtime::{ConfigurationError, DeviceCommandError, Error, Result};
pub use server::{DeviceManager, ServerOptions, ServerSession};
