//! mibctl - MIB bus controller utility
//!
//! Talks to the bus controller through a field service unit attached to a
//! serial port (or a TCP bridge). Covers bus reset and module census,
//! the controller's external flash, the firmware cache and the alarm line.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use mibctl_core::MibController;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let stream = match mibctl_serial::open(&cli.port) {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("Failed to open {}: {}", cli.port, e);
            std::process::exit(1);
        }
    };
    let mut controller = MibController::new(stream);

    let result = match cli.command {
        Commands::Reset { no_sync } => commands::bus::run_reset(&mut controller, !no_sync),
        Commands::Modules => commands::bus::run_modules(&mut controller),
        Commands::FindModule {
            name,
            address,
            force,
        } => commands::bus::run_find_module(&mut controller, name.as_deref(), address, force),
        Commands::ReadFlash {
            address,
            length,
            output,
        } => commands::flash::run_read(&mut controller, address, length, &output),
        Commands::WriteFlash { address, input } => {
            commands::flash::run_write(&mut controller, address, &input)
        }
        Commands::EraseFlash { address } => commands::flash::run_erase(&mut controller, address),
        Commands::Firmware(subcmd) => commands::firmware::run(&mut controller, subcmd),
        Commands::Alarm(subcmd) => commands::alarm::run(&mut controller, subcmd),
    };

    result
}
