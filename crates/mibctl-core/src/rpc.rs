//! RPC primitive
//!
//! Every interaction with a bus module is one request frame answered by one
//! response frame. The caller declares the shape of the result up front
//! ([`ResultShape`]); nothing about it is negotiated with the remote side.
//!
//! # Frame layout
//!
//! A request carries the target address, a `(feature, command)` pair, a spec
//! byte and a parameter block:
//!
//! ```text
//! spec   = int_count (bits 0-2) | 0x80 if a buffer follows
//! params = [int0 LE u16] [int1 LE u16] ... [buf_len u8] [buf ...]
//! ```
//!
//! The parameter block never exceeds [`MAX_FRAME_PAYLOAD`] bytes.
//!
//! A response carries a status byte and a payload. A status code of zero is
//! success; the payload then holds the declared integers (LE u16) followed by
//! the raw buffer, if one was requested.

use core::fmt;

use crate::error::{Error, RemoteError, Result, RpcError, TransportError};

/// Maximum size of the parameter block of a single bus frame
pub const MAX_FRAME_PAYLOAD: usize = 20;

/// Maximum number of integer parameters (3 bits in the spec byte)
pub const MAX_INT_PARAMS: usize = 7;

/// Spec byte flag set when the parameter block ends with a buffer
pub const SPEC_BUFFER_FLAG: u8 = 0x80;

/// Spec byte mask for the integer count
pub const SPEC_INT_MASK: u8 = 0x07;

/// Status byte bits holding the error code
pub const STATUS_CODE_MASK: u8 = 0x3F;

/// Status byte flag the firmware sets when a return value is attached
pub const STATUS_HAS_RETURN: u8 = 0x80;

/// Feature numbers used by the controller
pub mod feature {
    /// Firmware cache (bucket) commands
    pub const FIRMWARE_CACHE: u8 = 7;
    /// Controller bus management and external flash commands
    pub const CONTROLLER: u8 = 42;
}

/// A `(feature, command)` pair identifying a remote procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId {
    pub feature: u8,
    pub command: u8,
}

impl CommandId {
    pub const fn new(feature: u8, command: u8) -> Self {
        Self { feature, command }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:0x{:02X}", self.feature, self.command)
    }
}

/// A single RPC argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg<'a> {
    /// 16-bit integer parameter
    Int(u16),
    /// Raw byte buffer parameter (at most one, and it must come last)
    Buffer(&'a [u8]),
}

impl From<u16> for Arg<'_> {
    fn from(v: u16) -> Self {
        Arg::Int(v)
    }
}

impl From<u8> for Arg<'_> {
    fn from(v: u8) -> Self {
        Arg::Int(v as u16)
    }
}

impl<'a> From<&'a [u8]> for Arg<'a> {
    fn from(buf: &'a [u8]) -> Self {
        Arg::Buffer(buf)
    }
}

/// What the caller expects back from an RPC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResultShape {
    /// Number of 16-bit integers
    pub ints: usize,
    /// Whether a raw buffer follows the integers
    pub buffer: bool,
}

impl ResultShape {
    /// No return value
    pub const NONE: Self = Self {
        ints: 0,
        buffer: false,
    };

    /// Only a raw buffer
    pub const BUFFER: Self = Self {
        ints: 0,
        buffer: true,
    };

    /// `n` integers and no buffer
    pub const fn ints(n: usize) -> Self {
        Self {
            ints: n,
            buffer: false,
        }
    }
}

/// Decoded RPC result, owned by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcResult {
    pub ints: Vec<u16>,
    pub buffer: Vec<u8>,
}

impl RpcResult {
    /// Combine two integers as `(hi << 16) | lo`
    pub fn u32_from(&self, hi: usize, lo: usize) -> u32 {
        ((self.ints[hi] as u32) << 16) | self.ints[lo] as u32
    }
}

/// An encoded request, ready for a [`Transport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    pub address: u8,
    pub command: CommandId,
    pub spec: u8,
    pub params: Vec<u8>,
}

impl RawRequest {
    /// Serialize arguments into a request frame
    ///
    /// Fails without touching the bus if there are too many integers, more
    /// than one buffer, a buffer that is not last, or if the parameter block
    /// would not fit into one frame.
    pub fn encode(address: u8, command: CommandId, args: &[Arg<'_>]) -> Result<Self> {
        let mut params = Vec::with_capacity(MAX_FRAME_PAYLOAD);
        let mut int_count = 0usize;
        let mut buffer: Option<&[u8]> = None;

        for arg in args {
            match *arg {
                Arg::Int(v) => {
                    if buffer.is_some() {
                        return Err(Error::InvalidArguments(
                            "integer parameter after buffer".into(),
                        ));
                    }
                    params.extend_from_slice(&v.to_le_bytes());
                    int_count += 1;
                }
                Arg::Buffer(buf) => {
                    if buffer.is_some() {
                        return Err(Error::InvalidArguments(
                            "more than one buffer parameter".into(),
                        ));
                    }
                    buffer = Some(buf);
                }
            }
        }

        if int_count > MAX_INT_PARAMS {
            return Err(Error::InvalidArguments(format!(
                "{} integer parameters, at most {} allowed",
                int_count, MAX_INT_PARAMS
            )));
        }

        let mut spec = int_count as u8;
        if let Some(buf) = buffer {
            spec |= SPEC_BUFFER_FLAG;
            // One length byte precedes the buffer contents
            let needed = params.len() + 1 + buf.len();
            if needed > MAX_FRAME_PAYLOAD {
                return Err(Error::FrameTooLarge {
                    needed,
                    max: MAX_FRAME_PAYLOAD,
                });
            }
            params.push(buf.len() as u8);
            params.extend_from_slice(buf);
        }

        Ok(Self {
            address,
            command,
            spec,
            params,
        })
    }

    /// Full frame: `[address][feature][command][spec][params...]`
    pub fn to_frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(4 + self.params.len());
        frame.push(self.address);
        frame.push(self.command.feature);
        frame.push(self.command.command);
        frame.push(self.spec);
        frame.extend_from_slice(&self.params);
        frame
    }

    /// Parse a frame produced by [`RawRequest::to_frame`]
    pub fn from_frame(frame: &[u8]) -> Option<Self> {
        if frame.len() < 4 {
            return None;
        }
        let req = Self {
            address: frame[0],
            command: CommandId::new(frame[1], frame[2]),
            spec: frame[3],
            params: frame[4..].to_vec(),
        };
        // Reject frames whose parameter block disagrees with the spec byte
        let ints_len = req.int_count() * 2;
        if req.params.len() < ints_len {
            return None;
        }
        if req.has_buffer() {
            let len = *req.params.get(ints_len)? as usize;
            if req.params.len() != ints_len + 1 + len {
                return None;
            }
        } else if req.params.len() != ints_len {
            return None;
        }
        Some(req)
    }

    /// Number of integer parameters declared by the spec byte
    pub fn int_count(&self) -> usize {
        (self.spec & SPEC_INT_MASK) as usize
    }

    /// Whether a buffer parameter is present
    pub fn has_buffer(&self) -> bool {
        self.spec & SPEC_BUFFER_FLAG != 0
    }

    /// Decoded integer parameters
    pub fn int_params(&self) -> Vec<u16> {
        self.params
            .chunks_exact(2)
            .take(self.int_count())
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    /// Buffer parameter contents, if present
    pub fn buffer_param(&self) -> Option<&[u8]> {
        if !self.has_buffer() {
            return None;
        }
        let start = self.int_count() * 2 + 1;
        self.params.get(start..)
    }
}

/// Undecoded response from a [`Transport`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u8,
    pub payload: Vec<u8>,
}

impl RawResponse {
    /// Successful response with no return value
    pub fn empty() -> Self {
        Self::default()
    }

    /// Successful response carrying integers and an optional buffer
    pub fn with_values(ints: &[u16], buffer: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(ints.len() * 2 + buffer.len());
        for v in ints {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        payload.extend_from_slice(buffer);
        Self {
            status: STATUS_HAS_RETURN,
            payload,
        }
    }

    /// Failed response with the given error type code
    pub fn error(code: u8) -> Self {
        Self {
            status: code & STATUS_CODE_MASK,
            payload: Vec::new(),
        }
    }

    /// Error code in the status byte (0 means success)
    pub fn code(&self) -> u8 {
        self.status & STATUS_CODE_MASK
    }
}

/// Send-one-frame/receive-one-frame transport
///
/// Implementations must not retry internally and must report timeouts and
/// malformed responses as distinct [`TransportError`] variants.
pub trait Transport {
    fn send_request(
        &mut self,
        request: &RawRequest,
    ) -> core::result::Result<RawResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_request(
        &mut self,
        request: &RawRequest,
    ) -> core::result::Result<RawResponse, TransportError> {
        (**self).send_request(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_request(
        &mut self,
        request: &RawRequest,
    ) -> core::result::Result<RawResponse, TransportError> {
        (**self).send_request(request)
    }
}

/// Encode, send and decode one RPC
pub fn rpc<T: Transport + ?Sized>(
    transport: &mut T,
    address: u8,
    command: CommandId,
    args: &[Arg<'_>],
    shape: ResultShape,
) -> Result<RpcResult> {
    let request = RawRequest::encode(address, command, args)?;
    log::trace!(
        "rpc: -> module {} cmd {} spec 0x{:02X} params {:02X?}",
        address,
        command,
        request.spec,
        request.params
    );

    let response = transport
        .send_request(&request)
        .map_err(RpcError::Transport)?;

    let code = response.code();
    if code != 0 {
        log::debug!(
            "rpc: module {} cmd {} returned error type {}",
            address,
            command,
            code
        );
        return Err(RpcError::Remote {
            address,
            command,
            error: RemoteError::from_code(code),
        }
        .into());
    }

    Ok(decode_response(&response, shape)?)
}

/// Split a successful payload according to the declared shape
pub fn decode_response(
    response: &RawResponse,
    shape: ResultShape,
) -> core::result::Result<RpcResult, RpcError> {
    let ints_len = shape.ints * 2;
    if response.payload.len() < ints_len {
        return Err(RpcError::ShortPayload {
            expected: ints_len,
            got: response.payload.len(),
        });
    }

    let ints = response.payload[..ints_len]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    let buffer = if shape.buffer {
        response.payload[ints_len..].to_vec()
    } else {
        Vec::new()
    };

    Ok(RpcResult { ints, buffer })
}

/// Capability shared by every module handle, the controller included
pub trait MibProxy {
    /// Bus address of the module
    fn address(&self) -> u8;

    /// Human readable module name
    fn name(&self) -> &str;

    /// Issue one RPC to this module
    fn rpc(
        &mut self,
        command: CommandId,
        args: &[Arg<'_>],
        shape: ResultShape,
    ) -> Result<RpcResult>;
}

/// Handle to an ordinary bus module
///
/// Borrows the session's transport, so no other request can be in flight
/// while the handle is alive.
pub struct ModuleProxy<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    address: u8,
    name: String,
}

impl<'a, T: Transport + ?Sized> ModuleProxy<'a, T> {
    pub fn new(transport: &'a mut T, address: u8, name: impl Into<String>) -> Self {
        Self {
            transport,
            address,
            name: name.into(),
        }
    }
}

impl<T: Transport + ?Sized> MibProxy for ModuleProxy<'_, T> {
    fn address(&self) -> u8 {
        self.address
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
        rpc(&mut *self.transport, self.address, command, args, shape)
    }
}
