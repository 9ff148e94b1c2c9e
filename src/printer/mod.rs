//! # Printer Module
//!
//! This module provides printer-specific configurations and print jobs.
//!
//! ## Modules
//!
//! - [`config`]: Printer hardware and charset specifications
//! - [`job`]: The per-call print job

pub mod config;
pub mod job;

pub use config::{Charset, PrinterConfig};
pub use job::{DEFAULT_FEED_DISTANCE, PrintJob};
