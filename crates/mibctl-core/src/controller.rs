//! Controller proxy
//!
//! [`MibController`] owns the session's transport and is the only way to
//! reach the bus. It speaks for the controller at address 8 and hands out
//! [`ModuleProxy`] handles for other modules, which borrow the transport for
//! as long as they live.

use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::command::CommandChannel;
use crate::error::{Error, Result};
use crate::firmware::{self, BucketOccupancy, FirmwareImage, FirmwareInfo, FirmwareSource};
use crate::flash;
use crate::module::{module_address, pad_name, ModuleDescriptor, CONTROLLER_ADDRESS, MAX_MODULES};
use crate::progress::Progress;
use crate::rpc::{self, feature, Arg, CommandId, MibProxy, ModuleProxy, ResultShape, RpcResult, Transport};

pub const CMD_COUNT_MODULES: CommandId = CommandId::new(feature::CONTROLLER, 0x01);
pub const CMD_DESCRIBE_MODULE: CommandId = CommandId::new(feature::CONTROLLER, 0x02);
pub const CMD_RESET_BUS: CommandId = CommandId::new(feature::CONTROLLER, 0x05);

/// Time modules need to re-register after a bus reset
pub const RESET_SETTLE_DELAY: Duration = Duration::from_millis(1500);

/// Proxy for the bus controller
pub struct MibController<T> {
    transport: T,
    name: String,
    settle_delay: Duration,
}

impl<T: Transport> MibController<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            name: "Controller".to_string(),
            settle_delay: RESET_SETTLE_DELAY,
        }
    }

    /// Override the wait applied by [`reset_bus`](Self::reset_bus) with `sync`
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Power cycle every module except the controller
    ///
    /// The controller forgets all registered modules. With `sync`, block for a
    /// fixed delay so they can register again before the next command.
    pub fn reset_bus(&mut self, sync: bool) -> Result<()> {
        self.rpc(CMD_RESET_BUS, &[], ResultShape::NONE)?;
        log::info!("Bus reset");
        if sync {
            thread::sleep(self.settle_delay);
        }
        Ok(())
    }

    /// Number of modules registered with the controller
    ///
    /// A count that would run past the last bus address is an error.
    pub fn count_modules(&mut self) -> Result<u16> {
        let res = self.rpc(CMD_COUNT_MODULES, &[], ResultShape::ints(1))?;
        let count = res.ints[0];
        if count > MAX_MODULES {
            log::error!("controller: implausible module count {}", count);
            return Err(Error::TooManyModules {
                count,
                max: MAX_MODULES,
            });
        }
        Ok(count)
    }

    /// Describe the module at census position `index`
    pub fn describe_module(&mut self, index: u8) -> Result<ModuleDescriptor> {
        let address = module_address(index).ok_or(Error::ModuleIndexOutOfRange(index))?;
        let res = self.rpc(CMD_DESCRIBE_MODULE, &[Arg::from(index)], ResultShape::BUFFER)?;
        Ok(ModuleDescriptor::from_buffer(&res.buffer, address))
    }

    /// Count, then describe each module in turn
    pub fn enumerate_modules(&mut self) -> Result<Vec<ModuleDescriptor>> {
        let count = self.count_modules()?;
        log::debug!("controller: {} modules attached", count);
        (0..count)
            .map(|i| {
                let index = u8::try_from(i).map_err(|_| Error::TooManyModules {
                    count,
                    max: MAX_MODULES,
                })?;
                self.describe_module(index)
            })
            .collect()
    }

    /// Find a module by name or address and return a handle to it
    ///
    /// With `force` and an address the bus is not consulted at all and the
    /// handle is named `Unknown`. Names shorter than seven characters are
    /// space padded before comparison, longer ones are compared as given.
    pub fn get_module(
        &mut self,
        by_name: Option<&str>,
        by_address: Option<u8>,
        force: bool,
    ) -> Result<ModuleProxy<'_, T>> {
        if let (Some(address), true) = (by_address, force) {
            return Ok(ModuleProxy::new(&mut self.transport, address, "Unknown"));
        }

        let mods = self.enumerate_modules()?;
        let padded = by_name.map(pad_name);

        let found = mods.into_iter().find(|m| {
            padded.as_deref() == Some(m.name.as_str()) || by_address == Some(m.address)
        });

        match found {
            Some(m) => Ok(ModuleProxy::new(&mut self.transport, m.address, m.name)),
            None => Err(Error::ModuleNotFound {
                name: by_name.map(str::to_string),
                address: by_address,
            }),
        }
    }

    /// Read `count` bytes of external flash starting at `addr`
    pub fn read_flash(
        &mut self,
        addr: u32,
        count: usize,
        progress: &mut dyn Progress,
    ) -> Result<Vec<u8>> {
        flash::read(self, addr, count, progress)
    }

    /// Write `data` to external flash starting at `addr`
    pub fn write_flash(
        &mut self,
        addr: u32,
        data: &[u8],
        progress: &mut dyn Progress,
    ) -> Result<()> {
        flash::write(self, addr, data, progress)
    }

    /// Erase the external flash block containing `addr`
    pub fn erase_flash(&mut self, addr: u32) -> Result<()> {
        flash::erase(self, addr)
    }

    /// Push a hex file (or open reader) and return the bucket it was stored in
    pub fn push_firmware(
        &mut self,
        source: FirmwareSource<'_>,
        module_type: u16,
        progress: &mut dyn Progress,
    ) -> Result<u8> {
        firmware::push(self, source, module_type, progress)
    }

    /// Convenience wrapper for [`push_firmware`](Self::push_firmware) with a path
    pub fn push_firmware_file(
        &mut self,
        path: &Path,
        module_type: u16,
        progress: &mut dyn Progress,
    ) -> Result<u8> {
        self.push_firmware(FirmwareSource::path(path), module_type, progress)
    }

    /// Pull the image stored in `bucket`
    pub fn pull_firmware(
        &mut self,
        bucket: u8,
        mask_program_words: bool,
        progress: &mut dyn Progress,
    ) -> Result<FirmwareImage> {
        firmware::pull(self, bucket, mask_program_words, progress)
    }

    /// Abandon a firmware push the controller is still waiting on
    pub fn cancel_firmware_push(&mut self) -> Result<()> {
        firmware::cancel_push(self)
    }

    /// Which buckets hold firmware
    pub fn firmware_occupancy(&mut self) -> Result<BucketOccupancy> {
        firmware::occupancy(self)
    }

    /// Check a bucket index against the current occupancy
    ///
    /// The outer result reports communication failures, the inner one
    /// whether the bucket is loaded and why not.
    pub fn firmware_bucket_loaded(
        &mut self,
        index: u8,
    ) -> Result<core::result::Result<(), String>> {
        Ok(self.firmware_occupancy()?.check(index))
    }

    pub fn firmware_info(&mut self, bucket: u8) -> Result<FirmwareInfo> {
        firmware::info(self, bucket)
    }

    pub fn clear_firmware_cache(&mut self) -> Result<()> {
        firmware::clear_cache(self)
    }

    pub fn reflash(&mut self) -> Result<()> {
        firmware::reflash(self)
    }
}

impl<T: Transport + CommandChannel> MibController<T> {
    /// Whether the bus alarm line is asserted (it is active low)
    pub fn alarm_asserted(&mut self) -> Result<bool> {
        let cmd = "alarm status";
        let reply = self.transport.send_cmd(cmd)?;
        if !reply.is_okay() {
            return Err(Error::CommandFailed(cmd.to_string()));
        }

        let resp = reply.response.trim();
        match resp.parse::<i64>() {
            Ok(0) => Ok(true),
            Ok(1) => Ok(false),
            _ => Err(Error::AlarmResponse(resp.to_string())),
        }
    }

    /// Assert or release the bus alarm line
    pub fn set_alarm(&mut self, asserted: bool) -> Result<()> {
        let cmd = if asserted { "alarm yes" } else { "alarm no" };
        let reply = self.transport.send_cmd(cmd)?;
        if !reply.is_okay() {
            return Err(Error::CommandFailed(cmd.to_string()));
        }
        log::debug!("controller: alarm {}", if asserted { "asserted" } else { "released" });
        Ok(())
    }
}

impl<T: Transport> MibProxy for MibController<T> {
    fn address(&self) -> u8 {
        CONTROLLER_ADDRESS
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn rpc(
        &mut self,
        command: CommandId,
        args: &[Arg<'_>],
        shape: ResultShape,
    ) -> Result<RpcResult> {
        rpc::rpc(&mut self.transport, CONTROLLER_ADDRESS, command, args, shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandReply;
    use crate::progress::NoProgress;
    use crate::testing::{FakeController, ScriptedTransport};
    use std::io::Cursor;

    fn controller_with(names: &[&str]) -> MibController<FakeController> {
        let mut fake = FakeController::new();
        fake.modules = names.iter().map(|n| n.to_string()).collect();
        MibController::new(fake).with_settle_delay(Duration::ZERO)
    }

    #[test]
    fn test_enumerate_sequential() {
        let mut con = controller_with(&["gsm    ", "sensors"]);
        let mods = con.enumerate_modules().unwrap();
        assert_eq!(
            mods,
            vec![
                ModuleDescriptor {
                    address: 11,
                    name: "gsm    ".into()
                },
                ModuleDescriptor {
                    address: 12,
                    name: "sensors".into()
                },
            ]
        );

        let reqs = &con.transport().requests;
        assert_eq!(reqs.len(), 3);
        assert_eq!(reqs[0].command, CMD_COUNT_MODULES);
        assert_eq!(reqs[1].int_params(), vec![0]);
        assert_eq!(reqs[2].int_params(), vec![1]);
        assert!(reqs.iter().all(|r| r.address == CONTROLLER_ADDRESS));
    }

    #[test]
    fn test_census_fills_address_space() {
        let names: Vec<String> = (0..MAX_MODULES).map(|i| format!("m{:<6}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut con = controller_with(&refs);
        let mods = con.enumerate_modules().unwrap();
        assert_eq!(mods.len(), MAX_MODULES as usize);
        assert_eq!(mods.last().map(|m| m.address), Some(u8::MAX));
    }

    #[test]
    fn test_oversized_census_is_rejected() {
        let names: Vec<String> = (0..300).map(|i| format!("m{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut con = controller_with(&refs);
        assert!(matches!(
            con.enumerate_modules(),
            Err(Error::TooManyModules {
                count: 300,
                max: MAX_MODULES
            })
        ));
        // Only the count went out, no describe requests
        assert_eq!(con.transport().requests.len(), 1);
    }

    #[test]
    fn test_describe_beyond_last_address() {
        let mut con = controller_with(&["gsm    "]);
        assert!(matches!(
            con.describe_module(MAX_MODULES as u8),
            Err(Error::ModuleIndexOutOfRange(245))
        ));
        assert!(con.transport().requests.is_empty());
    }

    #[test]
    fn test_get_module_pads_short_names() {
        let mut con = controller_with(&["gsm    ", "sensors"]);
        let module = con.get_module(Some("gsm"), None, false).unwrap();
        assert_eq!(module.address(), 11);
        assert_eq!(module.name(), "gsm    ");
    }

    #[test]
    fn test_get_module_by_address() {
        let mut con = controller_with(&["gsm    ", "sensors"]);
        let module = con.get_module(None, Some(12), false).unwrap();
        assert_eq!(module.name(), "sensors");
    }

    #[test]
    fn test_get_module_long_name_not_padded() {
        let mut con = controller_with(&["battery"]);
        assert!(con.get_module(Some("battery"), None, false).is_ok());
        assert!(matches!(
            con.get_module(Some("battery1"), None, false),
            Err(Error::ModuleNotFound { .. })
        ));
    }

    #[test]
    fn test_get_module_not_found() {
        let mut con = controller_with(&["gsm    "]);
        let err = con.get_module(Some("radio"), Some(40), false).err().unwrap();
        match err {
            Error::ModuleNotFound { name, address } => {
                assert_eq!(name.as_deref(), Some("radio"));
                assert_eq!(address, Some(40));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_get_module_force_skips_bus() {
        let mut con = controller_with(&[]);
        {
            let module = con.get_module(None, Some(40), true).unwrap();
            assert_eq!(module.address(), 40);
            assert_eq!(module.name(), "Unknown");
        }
        assert!(con.transport().requests.is_empty());
    }

    #[test]
    fn test_reset_bus() {
        let mut con = controller_with(&["gsm    "]);
        con.reset_bus(true).unwrap();
        assert_eq!(con.transport().requests[0].command, CMD_RESET_BUS);
        assert_eq!(con.count_modules().unwrap(), 0);
    }

    #[test]
    fn test_alarm_status() {
        let mut t = ScriptedTransport::new();
        t.push_reply(CommandReply::okay(" 0\r\n"));
        t.push_reply(CommandReply::okay("1"));
        t.push_reply(CommandReply::okay("2"));
        t.push_reply(CommandReply::okay("yes"));
        t.push_reply(CommandReply::failed(""));

        let mut con = MibController::new(t);
        assert!(con.alarm_asserted().unwrap());
        assert!(!con.alarm_asserted().unwrap());
        assert!(matches!(con.alarm_asserted(), Err(Error::AlarmResponse(r)) if r == "2"));
        assert!(matches!(con.alarm_asserted(), Err(Error::AlarmResponse(_))));
        assert!(matches!(con.alarm_asserted(), Err(Error::CommandFailed(_))));
        assert!(con.transport().commands.iter().all(|c| c == "alarm status"));
    }

    #[test]
    fn test_set_alarm() {
        let mut con = controller_with(&[]);
        con.set_alarm(true).unwrap();
        assert!(con.alarm_asserted().unwrap());
        con.set_alarm(false).unwrap();
        assert!(!con.alarm_asserted().unwrap());
        assert_eq!(
            con.transport().commands,
            vec!["alarm yes", "alarm status", "alarm no", "alarm status"]
        );
    }

    #[test]
    fn test_firmware_roundtrip_through_controller() {
        let mut con = controller_with(&[]);
        let hex = ":0400000001020304F2\n:00000001FF\n";
        let bucket = con
            .push_firmware(FirmwareSource::reader(Cursor::new(hex)), 9, &mut NoProgress)
            .unwrap();
        assert_eq!(con.firmware_bucket_loaded(bucket).unwrap(), Ok(()));
        assert!(con.firmware_bucket_loaded(bucket + 1).unwrap().is_err());

        let image = con.pull_firmware(bucket, false, &mut NoProgress).unwrap();
        assert_eq!(image.to_contiguous(0xFF), vec![1, 2, 3, 4]);

        con.clear_firmware_cache().unwrap();
        assert!(con.pull_firmware(bucket, false, &mut NoProgress).is_err());
    }

    #[test]
    fn test_flash_through_controller() {
        let mut con = controller_with(&[]);
        con.write_flash(0x8_0000, b"momo", &mut NoProgress).unwrap();
        assert_eq!(
            con.read_flash(0x8_0000, 4, &mut NoProgress).unwrap(),
            b"momo".to_vec()
        );
        con.erase_flash(0x8_0000).unwrap();
        assert_eq!(
            con.read_flash(0x8_0000, 4, &mut NoProgress).unwrap(),
            vec![0xFF; 4]
        );
    }

    #[test]
    fn test_reflash_nothing_staged() {
        let mut con = controller_with(&[]);
        con.reflash().unwrap();
    }
}
