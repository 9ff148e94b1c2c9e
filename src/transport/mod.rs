//! # Printer Transport Layer
//!
//! ## Available Transports
//!
//! - [`framed`]: Write buffer with flush-and-settle semantics
//! - [`bluetooth`]: BlueZ adapter and RFCOMM TTY sockets (Linux)

pub mod bluetooth;
pub mod framed;

pub use bluetooth::{BluezAdapter, BluezAdapterProvider, TtySocket};
pub use framed::{FramedTransport, settle_time};
