//! hapwire runtime - transports, connection correlation and the error taxonomy.
//!
//! - **Transport**: framed JSON over byte streams or in-memory channels
//! - **Connection**: request/reply correlation and event separation for clients
//! - **Errors**: the error types shared by the client and server layers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   hapwire    │  Sessions, device registry, dispatch
//! └──────┬───────┘
//! ┌──────▼───────┐
//! │   runtime    │  This crate
//! │  ┌────────┐  │
//! │  │ Conn   │  │  id correlation, cancellation
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Trans  │  │  pipe / channel transport
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod connection;
pub mod error;
pub mod transport;

pub use connection::{Connection, ConnectionEvent};
pub use error::{ConfigurationError, DeviceCommandError, Error, Result};
pub use tokio_util::sync::CancellationToken;
pub use transport::{
	PipeTransport, PipeTransportReceiver, PipeTransportSender, Transport, TransportParts,
	TransportReceiver, channel_pair,
};
