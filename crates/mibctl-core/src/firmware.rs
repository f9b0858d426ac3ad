//! Firmware bucket management
//!
//! The controller stages firmware images in six fixed slots:
//!
//! | Index | Slot |
//! |-------|------|
//! | 0-3   | module firmware, filled in order, count reported dynamically |
//! | 4     | controller firmware |
//! | 5     | backup controller firmware |
//!
//! Images are pushed one Intel HEX record per RPC and pulled back in
//! 20-byte strides. Nothing is rolled back: a failed push leaves a partially
//! written bucket until the cache is cleared.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use bitflags::bitflags;

use crate::error::{Error, RemoteError, Result};
use crate::hex;
use crate::progress::Progress;
use crate::rpc::{feature, Arg, CommandId, MibProxy, ResultShape};

/// Number of module firmware buckets
pub const MAX_MODULE_BUCKETS: u8 = 4;
/// Bucket holding the controller firmware
pub const CONTROLLER_BUCKET: u8 = 4;
/// Bucket holding the backup controller firmware
pub const BACKUP_BUCKET: u8 = 5;

/// Bytes returned per pull request
pub const PULL_CHUNK_SIZE: usize = 20;

/// Mask applied to odd bytes of 6-bit-wide program words
pub const PROGRAM_WORD_MASK: u8 = 0x3F;

pub const CMD_PUSH_START: CommandId = CommandId::new(feature::FIRMWARE_CACHE, 0x00);
pub const CMD_PUSH_CHUNK: CommandId = CommandId::new(feature::FIRMWARE_CACHE, 0x01);
pub const CMD_PUSH_CANCEL: CommandId = CommandId::new(feature::FIRMWARE_CACHE, 0x02);
pub const CMD_INFO: CommandId = CommandId::new(feature::FIRMWARE_CACHE, 0x03);
pub const CMD_PULL_CHUNK: CommandId = CommandId::new(feature::FIRMWARE_CACHE, 0x04);
pub const CMD_COUNT: CommandId = CommandId::new(feature::FIRMWARE_CACHE, 0x05);
pub const CMD_CLEAR: CommandId = CommandId::new(feature::FIRMWARE_CACHE, 0x0A);
pub const CMD_REFLASH: CommandId = CommandId::new(feature::CONTROLLER, 0x0A);

bitflags! {
    /// Occupancy flags for the controller slots
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BucketFlags: u16 {
        const CONTROLLER_FIRMWARE = 0b01;
        const BACKUP_FIRMWARE     = 0b10;
    }
}

/// Which buckets currently hold firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BucketOccupancy {
    /// Number of filled module buckets (0-4)
    pub module_buckets: u16,
    pub flags: BucketFlags,
}

impl BucketOccupancy {
    pub fn controller_firmware(&self) -> bool {
        self.flags.contains(BucketFlags::CONTROLLER_FIRMWARE)
    }

    pub fn backup_firmware(&self) -> bool {
        self.flags.contains(BucketFlags::BACKUP_FIRMWARE)
    }

    /// Whether `index` names a filled bucket, with the reason if it does not
    pub fn check(&self, index: u8) -> core::result::Result<(), String> {
        match index {
            i if i < MAX_MODULE_BUCKETS => {
                if (i as u16) < self.module_buckets {
                    Ok(())
                } else {
                    Err(format!(
                        "Invalid firmware bucket specified, only {} buckets are filled",
                        self.module_buckets
                    ))
                }
            }
            CONTROLLER_BUCKET if !self.controller_firmware() => {
                Err("Controller firmware requested and none is loaded".into())
            }
            BACKUP_BUCKET if !self.backup_firmware() => {
                Err("Backup firmware requested and none is loaded".into())
            }
            CONTROLLER_BUCKET | BACKUP_BUCKET => Ok(()),
            _ => Err("Invalid bucket index, there are only 6 firmware buckets (0-5).".into()),
        }
    }
}

/// Metadata of the image stored in one bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FirmwareInfo {
    pub module_type: u16,
    pub length: u32,
    /// Flash address the bucket's contents start at
    pub base_address: u32,
    pub bucket_start: u16,
    pub bucket_size: u16,
}

/// Byte-addressable image pulled from a bucket
///
/// Keys are image offsets, i.e. the addresses the hex records carried when
/// the image was pushed. Gaps are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FirmwareImage {
    info: FirmwareInfo,
    data: BTreeMap<u32, u8>,
}

impl FirmwareImage {
    pub fn new(info: FirmwareInfo) -> Self {
        Self {
            info,
            data: BTreeMap::new(),
        }
    }

    pub fn info(&self) -> &FirmwareInfo {
        &self.info
    }

    pub fn base_address(&self) -> u32 {
        self.info.base_address
    }

    /// Declared image length
    pub fn length(&self) -> u32 {
        self.info.length
    }

    /// Number of bytes actually present
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, offset: u32) -> Option<u8> {
        self.data.get(&offset).copied()
    }

    pub fn insert(&mut self, offset: u32, value: u8) {
        self.data.insert(offset, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u8)> + '_ {
        self.data.iter().map(|(&k, &v)| (k, v))
    }

    /// Flatten `[0, length)` into a buffer, filling gaps with `fill`
    pub fn to_contiguous(&self, fill: u8) -> Vec<u8> {
        let mut out = vec![fill; self.info.length as usize];
        for (offset, value) in self.iter() {
            if let Some(slot) = out.get_mut(offset as usize) {
                *slot = value;
            }
        }
        out
    }
}

/// Where pushed firmware comes from
pub enum FirmwareSource<'a> {
    /// An already opened line-oriented source
    Reader(Box<dyn BufRead + 'a>),
    /// Path to a hex file
    Path(PathBuf),
}

impl<'a> FirmwareSource<'a> {
    pub fn reader(reader: impl BufRead + 'a) -> Self {
        Self::Reader(Box::new(reader))
    }

    pub fn path(path: impl AsRef<Path>) -> Self {
        Self::Path(path.as_ref().to_path_buf())
    }

    /// Read all non-blank lines
    fn read_lines(self) -> Result<Vec<String>> {
        let reader: Box<dyn BufRead + 'a> = match self {
            Self::Reader(r) => r,
            Self::Path(p) => Box::new(BufReader::new(File::open(p)?)),
        };
        let mut lines = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        Ok(lines)
    }
}

/// Query bucket occupancy
pub fn occupancy<P: MibProxy + ?Sized>(proxy: &mut P) -> Result<BucketOccupancy> {
    let res = proxy.rpc(CMD_COUNT, &[], ResultShape::ints(2))?;
    Ok(BucketOccupancy {
        module_buckets: res.ints[0],
        flags: BucketFlags::from_bits_truncate(res.ints[1]),
    })
}

/// Fail with a descriptive error unless `index` names a filled bucket
pub fn check_bucket<P: MibProxy + ?Sized>(proxy: &mut P, index: u8) -> Result<()> {
    occupancy(proxy)?.check(index).map_err(Error::InvalidBucket)
}

/// Query the metadata of the image in `bucket`
pub fn info<P: MibProxy + ?Sized>(proxy: &mut P, bucket: u8) -> Result<FirmwareInfo> {
    let res = proxy.rpc(CMD_INFO, &[Arg::Int(bucket as u16)], ResultShape::ints(7))?;
    Ok(FirmwareInfo {
        module_type: res.ints[0],
        length: res.u32_from(1, 2),
        base_address: res.u32_from(3, 4),
        bucket_start: res.ints[5],
        bucket_size: res.ints[6],
    })
}

/// Push a hex image for `module_type`, returning the bucket it landed in
///
/// Every line is decoded before the first request, so a malformed file never
/// starts a push. After that, one RPC is sent per line, in file order.
pub fn push<P: MibProxy + ?Sized>(
    proxy: &mut P,
    source: FirmwareSource<'_>,
    module_type: u16,
    progress: &mut dyn Progress,
) -> Result<u8> {
    let lines = source.read_lines()?;
    if lines.is_empty() {
        return Err(Error::NoFirmwareLines);
    }

    let records = lines
        .iter()
        .map(|line| hex::encode_line(line))
        .collect::<Result<Vec<_>>>()?;

    let res = proxy.rpc(
        CMD_PUSH_START,
        &[Arg::Int(module_type)],
        ResultShape::ints(1),
    )?;
    let bucket = u8::try_from(res.ints[0])
        .ok()
        .filter(|&b| b <= BACKUP_BUCKET)
        .ok_or_else(|| {
            Error::InvalidBucket(format!(
                "Controller assigned bucket {}, there are only 6 firmware buckets (0-5).",
                res.ints[0]
            ))
        })?;
    log::debug!(
        "firmware: pushing {} records for module type {} into bucket {}",
        records.len(),
        module_type,
        bucket
    );

    progress.start(records.len() as u64);
    for (i, record) in records.iter().enumerate() {
        proxy.rpc(CMD_PUSH_CHUNK, &[Arg::Buffer(record)], ResultShape::NONE)?;
        progress.progress(i as u64 + 1);
    }
    progress.end();

    log::info!("Firmware stored in bucket {}", bucket);
    Ok(bucket)
}

/// Abandon a push in progress
pub fn cancel_push<P: MibProxy + ?Sized>(proxy: &mut P) -> Result<()> {
    proxy.rpc(CMD_PUSH_CANCEL, &[], ResultShape::NONE)?;
    Ok(())
}

/// Pull the image stored in `bucket`
///
/// With `mask_program_words`, every odd-offset byte is masked to 6 bits, as
/// needed for devices with 6-bit-wide upper program word bytes.
pub fn pull<P: MibProxy + ?Sized>(
    proxy: &mut P,
    bucket: u8,
    mask_program_words: bool,
    progress: &mut dyn Progress,
) -> Result<FirmwareImage> {
    check_bucket(proxy, bucket)?;

    let info = info(proxy, bucket)?;
    let length = info.length;
    if length > u16::MAX as u32 + 1 {
        return Err(Error::ImageTooLarge(length));
    }
    log::info!("Getting firmware, size=0x{:X}", length);

    let mut image = FirmwareImage::new(info);
    progress.start(length as u64);

    let mut offset = 0u32;
    while offset < length {
        let expected = PULL_CHUNK_SIZE.min((length - offset) as usize);
        let res = proxy.rpc(
            CMD_PULL_CHUNK,
            &[Arg::Int(bucket as u16), Arg::Int(offset as u16)],
            ResultShape::BUFFER,
        )?;

        if res.buffer.len() < expected {
            return Err(Error::LengthMismatch {
                addr: offset,
                expected,
                got: res.buffer.len(),
            });
        }

        for (j, &byte) in res.buffer[..expected].iter().enumerate() {
            let addr = offset + j as u32;
            let value = if mask_program_words && addr % 2 != 0 {
                byte & PROGRAM_WORD_MASK
            } else {
                byte
            };
            image.insert(addr, value);
        }

        offset += expected as u32;
        progress.progress(offset as u64);
    }

    progress.end();
    Ok(image)
}

/// Invalidate every bucket
pub fn clear_cache<P: MibProxy + ?Sized>(proxy: &mut P) -> Result<()> {
    proxy.rpc(CMD_CLEAR, &[], ResultShape::NONE)?;
    log::debug!("firmware: cache cleared");
    Ok(())
}

/// Ask the controller to apply staged firmware
///
/// "Nothing to reflash" is not an error; every other failure is returned.
pub fn reflash<P: MibProxy + ?Sized>(proxy: &mut P) -> Result<()> {
    match proxy.rpc(CMD_REFLASH, &[], ResultShape::NONE) {
        Ok(_) => Ok(()),
        Err(Error::Rpc(e)) if e.remote() == Some(RemoteError::NothingToReflash) => {
            log::info!("firmware: nothing to reflash");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
