//! Bus reset and module census

use super::CliError;
use mibctl_core::{MibController, MibProxy, Transport};

/// Reset the bus, optionally waiting for modules to register again
pub fn run_reset<T: Transport>(
    controller: &mut MibController<T>,
    sync: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    controller.reset_bus(sync)?;
    if sync {
        let count = controller.count_modules()?;
        println!("Bus reset, {} modules registered", count);
    } else {
        println!("Bus reset");
    }
    Ok(())
}

/// Print every module attached to the bus
pub fn run_modules<T: Transport>(
    controller: &mut MibController<T>,
) -> Result<(), Box<dyn std::error::Error>> {
    let modules = controller.enumerate_modules()?;
    if modules.is_empty() {
        println!("No modules attached");
        return Ok(());
    }

    println!("{:<8} Name", "Address");
    println!("{}", "-".repeat(16));
    for module in &modules {
        println!("{:<8} {}", module.address, module.trimmed_name());
    }
    Ok(())
}

/// Look up one module and print its address and name
pub fn run_find_module<T: Transport>(
    controller: &mut MibController<T>,
    name: Option<&str>,
    address: Option<u8>,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if name.is_none() && address.is_none() {
        return Err(CliError::NoModuleQuery.into());
    }

    let module = controller.get_module(name, address, force)?;
    println!("{} at address {}", module.name().trim_end(), module.address());
    Ok(())
}
