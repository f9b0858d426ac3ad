//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a string as a hex or decimal u16
fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let value = parse_hex_u32(s)?;
    u16::try_from(value).map_err(|_| format!("Value out of range: {}", s))
}

/// Parse a string as a hex or decimal u8
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let value = parse_hex_u32(s)?;
    u8::try_from(value).map_err(|_| format!("Value out of range: {}", s))
}

#[derive(Parser)]
#[command(name = "mibctl")]
#[command(author, version, about = "MIB bus controller utility", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Field service unit connection (dev=/dev/ttyUSB0[:baud] or ip=host:port)
    #[arg(short, long)]
    pub port: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reset the bus and re-enumerate modules
    Reset {
        /// Return immediately instead of waiting for modules to settle
        #[arg(long)]
        no_sync: bool,
    },

    /// List modules attached to the bus
    Modules,

    /// Look up a module by name or address
    FindModule {
        /// Module name (padded to 7 characters)
        #[arg(short, long)]
        name: Option<String>,

        /// Module address
        #[arg(short, long, value_parser = parse_hex_u8)]
        address: Option<u8>,

        /// Trust the address without enumerating the bus
        #[arg(long)]
        force: bool,
    },

    /// Read the controller's external flash to a file
    ReadFlash {
        /// Start address (hex with 0x prefix, or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,

        /// Number of bytes to read (hex with 0x prefix, or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        length: u32,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a file to the controller's external flash
    WriteFlash {
        /// Start address (hex with 0x prefix, or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Erase the flash block containing an address
    EraseFlash {
        /// Address inside the block (hex with 0x prefix, or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,
    },

    /// Firmware cache operations
    #[command(subcommand)]
    Firmware(FirmwareCommands),

    /// Bus alarm line
    #[command(subcommand)]
    Alarm(AlarmCommands),
}

#[derive(Subcommand)]
pub enum FirmwareCommands {
    /// Push an Intel HEX image into a free bucket
    Push {
        /// Intel HEX file
        #[arg(short, long)]
        input: PathBuf,

        /// Module type the image is intended for
        #[arg(short, long, value_parser = parse_hex_u16)]
        module_type: u16,
    },

    /// Pull the image stored in a bucket to a binary file
    Pull {
        /// Bucket index (0-3 modules, 4 controller, 5 backup)
        #[arg(short, long)]
        bucket: u8,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Clear the top two bits of every program word
        #[arg(long)]
        mask_program_words: bool,

        /// Byte used for gaps in the image
        #[arg(long, default_value = "0xFF", value_parser = parse_hex_u8)]
        fill: u8,
    },

    /// Show which buckets hold firmware
    Status,

    /// Show metadata of the image stored in a bucket
    Info {
        /// Bucket index (0-3 modules, 4 controller, 5 backup)
        #[arg(short, long)]
        bucket: u8,
    },

    /// Abandon an unfinished push
    Cancel,

    /// Empty every bucket
    Clear,

    /// Reflash the controller from its staged image
    Reflash,
}

#[derive(Subcommand)]
pub enum AlarmCommands {
    /// Show whether the alarm line is asserted
    Status,

    /// Assert the alarm line
    Set,

    /// Release the alarm line
    Clear,
}
