//! Firmware cache commands

use super::{BarProgress, CliError};
use crate::cli::FirmwareCommands;
use mibctl_core::{MibController, Transport};
use std::fs;

/// Names of the fixed buckets, indexed by bucket number
const BUCKET_NAMES: [&str; 6] = [
    "module 0",
    "module 1",
    "module 2",
    "module 3",
    "controller",
    "backup",
];

/// Run one firmware subcommand
pub fn run<T: Transport>(
    controller: &mut MibController<T>,
    command: FirmwareCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        FirmwareCommands::Push { input, module_type } => {
            let mut progress = BarProgress::records("Push complete")?;
            let bucket = controller.push_firmware_file(&input, module_type, &mut progress)?;
            println!("Pushed {:?} into bucket {}", input, bucket);
        }
        FirmwareCommands::Pull {
            bucket,
            output,
            mask_program_words,
            fill,
        } => {
            let mut progress = BarProgress::bytes("Pull complete")?;
            let image = controller.pull_firmware(bucket, mask_program_words, &mut progress)?;
            fs::write(&output, image.to_contiguous(fill))?;
            println!(
                "Wrote {} bytes from bucket {} (base 0x{:05X}) to {:?}",
                image.len(),
                bucket,
                image.base_address(),
                output
            );
        }
        FirmwareCommands::Status => {
            let occupancy = controller.firmware_occupancy()?;
            for (index, name) in BUCKET_NAMES.iter().enumerate() {
                let state = match occupancy.check(index as u8) {
                    Ok(()) => "loaded".to_string(),
                    Err(reason) => reason,
                };
                println!("{} ({:<10}) {}", index, name, state);
            }
        }
        FirmwareCommands::Info { bucket } => {
            if let Err(reason) = controller.firmware_bucket_loaded(bucket)? {
                return Err(CliError::BucketNotLoaded {
                    index: bucket,
                    reason,
                }
                .into());
            }
            let info = controller.firmware_info(bucket)?;
            println!("Bucket:       {}", bucket);
            println!("Module type:  {}", info.module_type);
            println!("Length:       {} bytes", info.length);
            println!("Base address: 0x{:05X}", info.base_address);
            println!("Flash bucket: {} (+{})", info.bucket_start, info.bucket_size);
        }
        FirmwareCommands::Cancel => {
            controller.cancel_firmware_push()?;
            println!("Push cancelled");
        }
        FirmwareCommands::Clear => {
            controller.clear_firmware_cache()?;
            println!("Firmware cache cleared");
        }
        FirmwareCommands::Reflash => {
            controller.reflash()?;
            println!("Reflash requested");
        }
    }
    Ok(())
}
