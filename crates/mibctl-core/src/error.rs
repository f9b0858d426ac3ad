//! Error types for mibctl-core
//!
//! Failures fall into three groups:
//! - precondition errors, detected locally before any bus traffic,
//! - remote errors, reported by the firmware through an RPC status code,
//! - invariant violations, where the controller answered but the answer
//!   proves the host and the hardware are out of step.
//!
//! Nothing in this crate retries. Every variant carries enough context for an
//! operator to decide whether to retry, recover or give up.

use thiserror::Error;

/// Status code the controller returns when `reflash` has nothing staged
pub const NOTHING_TO_REFLASH_CODE: u8 = 7;

/// Error reported by the remote firmware in an RPC status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// No firmware is staged for the controller, so there is nothing to reflash
    #[error("nothing to reflash (type 7)")]
    NothingToReflash,

    /// Any other non-zero status code
    #[error("remote error type {0}")]
    Code(u8),
}

impl RemoteError {
    /// Map a non-zero status code onto a variant
    pub fn from_code(code: u8) -> Self {
        match code {
            NOTHING_TO_REFLASH_CODE => Self::NothingToReflash,
            other => Self::Code(other),
        }
    }

    /// The numeric type code as reported by the firmware
    pub fn code(&self) -> u8 {
        match self {
            Self::NothingToReflash => NOTHING_TO_REFLASH_CODE,
            Self::Code(code) => *code,
        }
    }
}

/// Failures signalled by a [`Transport`](crate::rpc::Transport)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No response arrived in time
    #[error("timed out waiting for response")]
    Timeout,

    /// A response arrived but could not be parsed
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The underlying device failed
    #[error("I/O error: {0}")]
    Io(String),
}

/// Outcome of a failed RPC
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The firmware answered with a non-success status
    #[error("RPC to module {address} command {command} failed: {error}")]
    Remote {
        address: u8,
        command: crate::rpc::CommandId,
        error: RemoteError,
    },

    /// The transport could not complete the exchange
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The response was too short for the declared result shape
    #[error("response payload too short: expected at least {expected} bytes, got {got}")]
    ShortPayload { expected: usize, got: usize },
}

impl RpcError {
    /// The remote error carried by this failure, if the firmware reported one
    pub fn remote(&self) -> Option<RemoteError> {
        match self {
            Self::Remote { error, .. } => Some(*error),
            _ => None,
        }
    }
}

/// Errors returned by controller, flash and firmware operations
#[derive(Debug, Error)]
pub enum Error {
    /// Address (or end of range) outside the 1 MiB flash
    #[error("address range 0x{addr:X}+{len} exceeds flash size of 0x{limit:X} bytes")]
    AddressOutOfRange { addr: u32, len: usize, limit: u32 },

    /// Request parameters do not fit into one bus frame
    #[error("RPC parameters need {needed} bytes, frame holds only {max}")]
    FrameTooLarge { needed: usize, max: usize },

    /// RPC arguments cannot be encoded
    #[error("invalid RPC arguments: {0}")]
    InvalidArguments(String),

    /// Bucket is empty or out of range
    #[error("{0}")]
    InvalidBucket(String),

    /// Hex record could not be parsed
    #[error("invalid hex record: {0}")]
    HexFormat(String),

    /// Firmware source produced no lines
    #[error("firmware source contained no hex records")]
    NoFirmwareLines,

    /// Image does not fit the 16-bit offset used by pull requests
    #[error("firmware image of {0} bytes is too large to pull")]
    ImageTooLarge(u32),

    /// RPC failed
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// A flash write chunk landed somewhere other than requested
    #[error("tried to write to address 0x{requested:X} but wrote to address 0x{written:X} instead")]
    AddressMismatch { requested: u32, written: u32 },

    /// Assembled transfer does not have the requested length
    #[error("transfer at 0x{addr:X} expected {expected} bytes, got {got}")]
    LengthMismatch {
        addr: u32,
        expected: usize,
        got: usize,
    },

    /// Controller reported more modules than bus addresses exist for
    #[error("controller reported {count} modules, at most {max} can be addressed")]
    TooManyModules { count: u16, max: u16 },

    /// Census index has no bus address
    #[error("module index {0} is beyond the last bus address")]
    ModuleIndexOutOfRange(u8),

    /// Alarm status reply was neither 0 nor 1
    #[error("invalid result returned from 'alarm status' command: {0}")]
    AlarmResponse(String),

    /// Textual command returned a failure result
    #[error("command '{0}' failed")]
    CommandFailed(String),

    /// Module lookup found nothing
    #[error("could not find module by name or address (name={name:?}, address={address:?})")]
    ModuleNotFound {
        name: Option<String>,
        address: Option<u8>,
    },

    /// I/O error while reading a firmware source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Rpc(RpcError::Transport(e))
    }
}

/// Result type alias using the crate [`enum@Error`]
pub type Result<T> = core::result::Result<T, Error>;
