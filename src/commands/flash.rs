//! Controller external flash commands

use super::{BarProgress, CliError};
use mibctl_core::{MibController, Transport};
use std::fs;
use std::path::Path;

/// Read `length` bytes at `address` into `output`
pub fn run_read<T: Transport>(
    controller: &mut MibController<T>,
    address: u32,
    length: u32,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut progress = BarProgress::bytes("Read complete")?;
    let data = controller.read_flash(address, length as usize, &mut progress)?;

    fs::write(output, &data)?;
    println!("Wrote {} bytes to {:?}", data.len(), output);
    Ok(())
}

/// Write the contents of `input` at `address`
pub fn run_write<T: Transport>(
    controller: &mut MibController<T>,
    address: u32,
    input: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    if data.is_empty() {
        return Err(CliError::EmptyInput(input.to_path_buf()).into());
    }

    let mut progress = BarProgress::bytes("Write complete")?;
    controller.write_flash(address, &data, &mut progress)?;

    println!("Wrote {} bytes at 0x{:05X}", data.len(), address);
    Ok(())
}

/// Erase the block containing `address`
pub fn run_erase<T: Transport>(
    controller: &mut MibController<T>,
    address: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    controller.erase_flash(address)?;
    println!("Erased block containing 0x{:05X}", address);
    Ok(())
}
