//! Bus alarm line commands

use crate::cli::AlarmCommands;
use mibctl_core::{CommandChannel, MibController, Transport};

pub fn run<T: Transport + CommandChannel>(
    controller: &mut MibController<T>,
    command: AlarmCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        AlarmCommands::Status => {
            let asserted = controller.alarm_asserted()?;
            println!("Alarm {}", if asserted { "asserted" } else { "not asserted" });
        }
        AlarmCommands::Set => {
            controller.set_alarm(true)?;
            println!("Alarm asserted");
        }
        AlarmCommands::Clear => {
            controller.set_alarm(false)?;
            println!("Alarm released");
        }
    }
    Ok(())
}
