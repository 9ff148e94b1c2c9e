//! # Crema CLI
//!
//! Command-line interface for the café receipt printer.
//!
//! ## Usage
//!
//! ```bash
//! # List paired printers
//! crema devices
//!
//! # Watch for nearby devices for 15 seconds
//! crema discover --seconds 15
//!
//! # Print a built-in receipt
//! crema print order
//!
//! # Print literal markup, or a markup file
//! crema print "[C]<b>Hello</b>"
//! crema print --file ticket.txt
//!
//! # Use a config file and print two copies over one connection
//! crema --config crema.json print --copies 2 order
//! ```
//!
//! Logging is controlled with `RUST_LOG` (default `crema=info`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crema::{
    ConnectionManager, ManagerConfig, PrintJob, PrinterError,
    device::DeviceDirectory,
    printer::DEFAULT_FEED_DISTANCE,
    receipt,
    transport::BluezAdapterProvider,
};

/// Crema - Bluetooth receipt printer utility
#[derive(Parser, Debug)]
#[command(name = "crema")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List paired printers
    Devices,

    /// Scan for nearby Bluetooth devices
    Discover {
        /// How long to scan
        #[arg(long, default_value = "10")]
        seconds: u64,
    },

    /// Print a receipt
    Print {
        /// Built-in receipt name or literal markup (omit to see receipts)
        receipt: Option<String>,

        /// Read markup from a file
        #[arg(long, value_name = "FILE", conflicts_with = "receipt")]
        file: Option<PathBuf>,

        /// Number of copies
        #[arg(long, default_value = "1")]
        copies: u32,

        /// Feed/cut distance after each copy
        #[arg(long, default_value_t = DEFAULT_FEED_DISTANCE)]
        feed: u32,

        /// Leave the connection open when done
        #[arg(long)]
        keep_connected: bool,
    },

    /// List built-in receipts
    Receipts,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crema=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {}", e);
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            eprintln!("  caused by: {}", cause);
            source = cause.source();
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), PrinterError> {
    let config = match &cli.config {
        Some(path) => ManagerConfig::load(path)?,
        None => ManagerConfig::default(),
    };
    let directory = DeviceDirectory::new(
        Arc::new(BluezAdapterProvider::new(config.rfcomm_device)),
        Arc::new(config.permissions()),
    );

    match cli.command {
        Commands::Devices => {
            let lister = directory.clone();
            let devices = tokio::task::spawn_blocking(move || lister.candidates())
                .await
                .map_err(|e| PrinterError::Io(std::io::Error::other(e)))??;

            if devices.is_empty() {
                println!("No paired printers.");
            }
            for device in devices {
                println!(
                    "{}  {}",
                    device.address,
                    device.name.as_deref().unwrap_or("(unnamed)")
                );
            }
            Ok(())
        }

        Commands::Discover { seconds } => {
            let guard = directory.listen_for_discovery(|found| {
                println!(
                    "{}  {}",
                    found.address,
                    found.name.as_deref().unwrap_or("(unnamed)")
                );
            })?;
            println!("Scanning for {} seconds...", seconds);
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            guard.stop();
            Ok(())
        }

        Commands::Print {
            receipt: name,
            file,
            copies,
            feed,
            keep_connected,
        } => {
            let text = match (name, file) {
                (_, Some(path)) => std::fs::read_to_string(&path)?,
                (Some(name), None) => receipt::by_name(&name).unwrap_or(name),
                (None, None) => {
                    print_receipt_list();
                    return Ok(());
                }
            };

            let manager = ConnectionManager::new(directory, &config)?;
            let job = PrintJob::new(text).with_feed_distance(feed);

            let mut printed = Ok(());
            for copy in 1..=copies {
                println!("Printing copy {} of {}...", copy, copies);
                printed = manager.print_job(job.clone()).await;
                if printed.is_err() {
                    break;
                }
            }

            if !keep_connected {
                manager.disconnect().await;
            }
            printed?;
            if let Some(address) = manager.last_known_good().await {
                println!("Printed successfully on {}.", address);
            }
            Ok(())
        }

        Commands::Receipts => {
            print_receipt_list();
            Ok(())
        }
    }
}

fn print_receipt_list() {
    println!("Available receipts:");
    for name in receipt::list_receipts() {
        println!("  {}", name);
    }
}
