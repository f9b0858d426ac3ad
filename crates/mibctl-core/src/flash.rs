//! Controller external flash access
//!
//! The controller exposes its 1 MiB external flash through three commands.
//! Every transfer is split to fit one bus frame: reads return at most 20
//! bytes, writes carry at most 14 bytes because the frame also holds the
//! split address. Addresses travel as two 16-bit halves.
//!
//! The 1 MiB ceiling is checked for the whole range before the first request
//! goes out. Nothing is retried: a failure part way through leaves the flash
//! as the last completed chunk left it.

use crate::error::{Error, Result};
use crate::progress::Progress;
use crate::rpc::{feature, Arg, CommandId, MibProxy, ResultShape};

/// Size of the controller's external flash
pub const FLASH_SIZE: u32 = 1024 * 1024;

/// Largest read that fits in one response frame
pub const READ_CHUNK_SIZE: usize = 20;

/// Largest write payload that fits next to the address in one request frame
pub const WRITE_CHUNK_SIZE: usize = 14;

pub const CMD_READ: CommandId = CommandId::new(feature::CONTROLLER, 0x03);
pub const CMD_WRITE: CommandId = CommandId::new(feature::CONTROLLER, 0x04);
pub const CMD_ERASE: CommandId = CommandId::new(feature::CONTROLLER, 0x06);

/// Split an address into `(low, high)` 16-bit halves
pub fn split_address(addr: u32) -> (u16, u16) {
    ((addr & 0xFFFF) as u16, (addr >> 16) as u16)
}

/// Check that `[addr, addr + len)` lies within the flash
pub fn check_range(addr: u32, len: usize) -> Result<()> {
    let end = addr as u64 + len as u64;
    if addr >= FLASH_SIZE || end > FLASH_SIZE as u64 {
        return Err(Error::AddressOutOfRange {
            addr,
            len,
            limit: FLASH_SIZE,
        });
    }
    Ok(())
}

/// Read `count` bytes starting at `base`
pub fn read<P: MibProxy + ?Sized>(
    proxy: &mut P,
    base: u32,
    count: usize,
    progress: &mut dyn Progress,
) -> Result<Vec<u8>> {
    check_range(base, count)?;

    let mut buffer = Vec::with_capacity(count);
    progress.start(count as u64);

    let mut offset = 0usize;
    while offset < count {
        progress.progress(offset as u64);

        let addr = base + offset as u32;
        let (lo, hi) = split_address(addr);
        let length = READ_CHUNK_SIZE.min(count - offset);

        let res = proxy.rpc(CMD_READ, &[Arg::Int(lo), Arg::Int(hi)], ResultShape::BUFFER)?;
        let take = length.min(res.buffer.len());
        if take < length {
            log::warn!(
                "flash: short read at 0x{:X}, wanted {} bytes, got {}",
                addr,
                length,
                res.buffer.len()
            );
        }
        buffer.extend_from_slice(&res.buffer[..take]);

        offset += length;
    }

    if buffer.len() != count {
        return Err(Error::LengthMismatch {
            addr: base,
            expected: count,
            got: buffer.len(),
        });
    }

    progress.end();
    log::debug!("flash: read {} bytes at 0x{:X}", count, base);
    Ok(buffer)
}

/// Write all of `data` starting at `base`
///
/// Each chunk's echoed address is compared with the requested one; the first
/// mismatch aborts the transfer.
pub fn write<P: MibProxy + ?Sized>(
    proxy: &mut P,
    base: u32,
    data: &[u8],
    progress: &mut dyn Progress,
) -> Result<()> {
    let count = data.len();
    check_range(base, count)?;

    progress.start(count as u64);

    let mut offset = 0usize;
    while offset < count {
        progress.progress(offset as u64);

        let addr = base + offset as u32;
        let (lo, hi) = split_address(addr);
        let length = WRITE_CHUNK_SIZE.min(count - offset);
        let chunk = &data[offset..offset + length];

        let res = proxy.rpc(
            CMD_WRITE,
            &[Arg::Int(lo), Arg::Int(hi), Arg::Buffer(chunk)],
            ResultShape::ints(2),
        )?;

        let written = res.ints[0] as u32 | (res.ints[1] as u32) << 16;
        if written != addr {
            log::error!(
                "flash: write to 0x{:X} landed at 0x{:X}, flash state unknown",
                addr,
                written
            );
            return Err(Error::AddressMismatch {
                requested: addr,
                written,
            });
        }

        offset += length;
    }

    progress.end();
    log::debug!("flash: wrote {} bytes at 0x{:X}", count, base);
    Ok(())
}

/// Erase the block containing `addr`
pub fn erase<P: MibProxy + ?Sized>(proxy: &mut P, addr: u32) -> Result<()> {
    check_range(addr, 0)?;
    let (lo, hi) = split_address(addr);
    proxy.rpc(CMD_ERASE, &[Arg::Int(lo), Arg::Int(hi)], ResultShape::NONE)?;
    log::debug!("flash: erased block at 0x{:X}", addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::CONTROLLER_ADDRESS;
    use crate::progress::NoProgress;
    use crate::rpc::ModuleProxy;
    use crate::testing::{FakeController, RecordingProgress};

    fn proxy(fake: &mut FakeController) -> ModuleProxy<'_, FakeController> {
        ModuleProxy::new(fake, CONTROLLER_ADDRESS, "Controller")
    }

    #[test]
    fn test_split_address() {
        assert_eq!(split_address(0x0001_2345), (0x2345, 0x0001));
        assert_eq!(split_address(0x000F_FFFF), (0xFFFF, 0x000F));
    }

    #[test]
    fn test_read_returns_exact_length() {
        let mut fake = FakeController::new();
        for (base, count) in [(0u32, 0usize), (0, 1), (0x100, 20), (0x100, 21), (0x7FF0, 57)] {
            let data = read(&mut proxy(&mut fake), base, count, &mut NoProgress).unwrap();
            assert_eq!(data.len(), count);
        }
        // Last byte of the flash
        let data = read(&mut proxy(&mut fake), FLASH_SIZE - 1, 1, &mut NoProgress).unwrap();
        assert_eq!(data, vec![0xFF]);
    }

    #[test]
    fn test_read_chunks_of_20() {
        let mut fake = FakeController::new();
        read(&mut proxy(&mut fake), 0x1_0000, 45, &mut NoProgress).unwrap();
        let addrs: Vec<Vec<u16>> = fake.requests.iter().map(|r| r.int_params()).collect();
        assert_eq!(
            addrs,
            vec![vec![0x0000, 1], vec![0x0014, 1], vec![0x0028, 1]]
        );
        assert!(fake.requests.iter().all(|r| r.command == CMD_READ));
    }

    #[test]
    fn test_out_of_range_issues_no_rpc() {
        let mut fake = FakeController::new();
        for addr in [FLASH_SIZE, FLASH_SIZE + 1, u32::MAX] {
            assert!(matches!(
                read(&mut proxy(&mut fake), addr, 1, &mut NoProgress),
                Err(Error::AddressOutOfRange { .. })
            ));
            assert!(matches!(
                write(&mut proxy(&mut fake), addr, &[1, 2, 3], &mut NoProgress),
                Err(Error::AddressOutOfRange { .. })
            ));
            assert!(matches!(
                erase(&mut proxy(&mut fake), addr),
                Err(Error::AddressOutOfRange { .. })
            ));
        }
        assert!(fake.requests.is_empty());
    }

    #[test]
    fn test_range_end_is_checked() {
        let mut fake = FakeController::new();
        assert!(matches!(
            read(&mut proxy(&mut fake), FLASH_SIZE - 10, 11, &mut NoProgress),
            Err(Error::AddressOutOfRange { .. })
        ));
        assert!(matches!(
            write(&mut proxy(&mut fake), FLASH_SIZE - 2, &[0; 3], &mut NoProgress),
            Err(Error::AddressOutOfRange { .. })
        ));
        assert!(fake.requests.is_empty());
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let mut fake = FakeController::new();
        let data: Vec<u8> = (0..100u8).collect();
        write(&mut proxy(&mut fake), 0x2_0003, &data, &mut NoProgress).unwrap();
        let back = read(&mut proxy(&mut fake), 0x2_0003, data.len(), &mut NoProgress).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_write_chunking() {
        let mut fake = FakeController::new();
        let data = [0x5Au8; 30];
        write(&mut proxy(&mut fake), 0x400, &data, &mut NoProgress).unwrap();

        assert_eq!(fake.requests.len(), 3);
        let addrs: Vec<u16> = fake.requests.iter().map(|r| r.int_params()[0]).collect();
        assert_eq!(addrs, vec![0x400, 0x400 + 14, 0x400 + 28]);
        let lens: Vec<usize> = fake
            .requests
            .iter()
            .map(|r| r.buffer_param().map_or(0, |b| b.len()))
            .collect();
        assert_eq!(lens, vec![14, 14, 2]);
    }

    #[test]
    fn test_write_address_mismatch_aborts() {
        let mut fake = FakeController::new();
        fake.write_skew = 2;
        let err = write(&mut proxy(&mut fake), 0x100, &[0u8; 30], &mut NoProgress).unwrap_err();
        assert!(matches!(
            err,
            Error::AddressMismatch {
                requested: 0x100,
                written: 0x102
            }
        ));
        // Aborted after the first chunk
        assert_eq!(fake.requests.len(), 1);
    }

    #[test]
    fn test_short_read_is_length_mismatch() {
        let mut fake = FakeController::new();
        fake.short_reads = true;
        let err = read(&mut proxy(&mut fake), 0, 40, &mut NoProgress).unwrap_err();
        assert!(matches!(
            err,
            Error::LengthMismatch {
                addr: 0,
                expected: 40,
                ..
            }
        ));
    }

    #[test]
    fn test_erase_single_rpc() {
        let mut fake = FakeController::new();
        write(&mut proxy(&mut fake), 0x1_1000, &[0u8; 4], &mut NoProgress).unwrap();
        fake.requests.clear();

        erase(&mut proxy(&mut fake), 0x1_1000).unwrap();
        assert_eq!(fake.requests.len(), 1);
        assert_eq!(fake.requests[0].command, CMD_ERASE);
        assert_eq!(fake.requests[0].int_params(), vec![0x1000, 0x0001]);

        let back = read(&mut proxy(&mut fake), 0x1_1000, 4, &mut NoProgress).unwrap();
        assert_eq!(back, vec![0xFF; 4]);
    }

    #[test]
    fn test_progress_sequence() {
        let mut fake = FakeController::new();
        let mut progress = RecordingProgress::default();
        read(&mut proxy(&mut fake), 0, 50, &mut progress).unwrap();
        assert_eq!(progress.total, Some(50));
        assert_eq!(progress.steps, vec![0, 20, 40]);
        assert!(progress.ended);
    }
}
