//! Intel HEX record decoding
//!
//! Firmware is pushed to the controller one hex record at a time. Each line
//! `:CCAAAARRDD...DDKK` is decoded and packed into the layout the bus
//! firmware expects inside a single frame:
//!
//! ```text
//! [address: u16 LE][record_type: u8][data ...]
//! ```
//!
//! The checksum is parsed but not verified here; the controller validates
//! what it receives.

use crate::error::{Error, Result};

/// Largest data payload the controller accepts in one record
pub const MAX_RECORD_DATA: usize = 16;

/// Record types
pub mod record_type {
    pub const DATA: u8 = 0x00;
    pub const EOF: u8 = 0x01;
    pub const EXT_SEGMENT_ADDR: u8 = 0x02;
    pub const START_SEGMENT_ADDR: u8 = 0x03;
    pub const EXT_LINEAR_ADDR: u8 = 0x04;
    pub const START_LINEAR_ADDR: u8 = 0x05;
}

/// One decoded hex record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
    pub byte_count: u8,
    pub address: u16,
    pub record_type: u8,
    pub data: Vec<u8>,
    pub checksum: u8,
}

impl HexRecord {
    /// Decode a single line
    ///
    /// Trailing whitespace (including CR/LF) is ignored. Anything after the
    /// checksum byte is ignored as well.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end();
        let body = line.strip_prefix(':').ok_or_else(|| {
            Error::HexFormat(format!("did not start with a ':': {}", line))
        })?;

        let byte_count = hex_u8(body, 0)?;
        if byte_count as usize > MAX_RECORD_DATA {
            return Err(Error::HexFormat(format!(
                "cannot use hex file with more than {} bytes per line, line size was {}",
                MAX_RECORD_DATA, byte_count
            )));
        }

        let address = ((hex_u8(body, 2)? as u16) << 8) | hex_u8(body, 4)? as u16;
        let record_type = hex_u8(body, 6)?;

        let data_start = 8;
        let data_end = data_start + 2 * byte_count as usize;
        let data_hex = body.get(data_start..data_end).ok_or_else(|| {
            Error::HexFormat(format!(
                "line too short for {} data bytes: {}",
                byte_count, line
            ))
        })?;
        let data = ::hex::decode(data_hex)
            .map_err(|e| Error::HexFormat(format!("bad data field in {}: {}", line, e)))?;

        let checksum = hex_u8(body, data_end)?;

        Ok(Self {
            byte_count,
            address,
            record_type,
            data,
            checksum,
        })
    }

    /// Pack into the controller's wire layout
    pub fn pack(&self) -> Vec<u8> {
        let mut packed = Vec::with_capacity(3 + self.data.len());
        packed.extend_from_slice(&self.address.to_le_bytes());
        packed.push(self.record_type);
        packed.extend_from_slice(&self.data);
        packed
    }
}

/// Decode a line and pack it in one step
pub fn encode_line(line: &str) -> Result<Vec<u8>> {
    HexRecord::parse(line).map(|r| r.pack())
}

/// Decode the two hex digits at `pos`
fn hex_u8(s: &str, pos: usize) -> Result<u8> {
    let digits = s
        .get(pos..pos + 2)
        .ok_or_else(|| Error::HexFormat(format!("truncated record: :{}", s)))?;
    let mut byte = [0u8; 1];
    ::hex::decode_to_slice(digits, &mut byte)
        .map_err(|_| Error::HexFormat(format!("invalid hex digits '{}' in :{}", digits, s)))?;
    Ok(byte[0])
}
