//! Field service unit line protocol
//!
//! Every command is one ASCII line terminated by `\n`. The unit answers with
//! zero or more response lines followed by a status line, either `OK` or a
//! line starting with `ERROR`.
//!
//! RPCs travel as the command `binrpc <HEX>`, where `<HEX>` is the request
//! frame `[address][feature][command][spec][params...]`. The unit answers
//! with one response line `<HEX>` holding `[status][len][payload...]`, then
//! `OK`.

use mibctl_core::{CommandResult, RawRequest, RawResponse, TransportError};

/// Command used to tunnel an RPC frame
pub const RPC_COMMAND: &str = "binrpc";

/// Status line for a successful command
pub const OK_LINE: &str = "OK";

/// Prefix of a failed command's status line
pub const ERROR_PREFIX: &str = "ERROR";

/// Upper bound on response lines before a status line must appear
pub const MAX_REPLY_LINES: usize = 64;

/// Classify a line as a status line, if it is one
pub fn status_line(line: &str) -> Option<CommandResult> {
    let line = line.trim();
    if line == OK_LINE {
        Some(CommandResult::Okay)
    } else if line.starts_with(ERROR_PREFIX) {
        Some(CommandResult::Failed)
    } else {
        None
    }
}

/// Build the command line carrying `request`
pub fn encode_rpc(request: &RawRequest) -> String {
    format!("{} {}", RPC_COMMAND, hex::encode_upper(request.to_frame()))
}

/// Parse the response line of an RPC
pub fn decode_rpc_response(body: &str) -> Result<RawResponse, TransportError> {
    let body = body.trim();
    let bytes = hex::decode(body)
        .map_err(|e| TransportError::Malformed(format!("bad hex in RPC response '{}': {}", body, e)))?;

    if bytes.len() < 2 {
        return Err(TransportError::Malformed(format!(
            "RPC response too short: '{}'",
            body
        )));
    }

    let status = bytes[0];
    let len = bytes[1] as usize;
    let payload = &bytes[2..];
    if payload.len() != len {
        return Err(TransportError::Malformed(format!(
            "RPC response declares {} payload bytes, carries {}",
            len,
            payload.len()
        )));
    }

    Ok(RawResponse {
        status,
        payload: payload.to_vec(),
    })
}

/// Build the response line for `response` (the unit's side of the exchange)
pub fn encode_rpc_response(response: &RawResponse) -> String {
    let mut bytes = Vec::with_capacity(2 + response.payload.len());
    bytes.push(response.status);
    bytes.push(response.payload.len() as u8);
    bytes.extend_from_slice(&response.payload);
    hex::encode_upper(bytes)
}

/// Parse an RPC command line back into a request (the unit's side)
pub fn decode_rpc(line: &str) -> Option<RawRequest> {
    let body = line.trim().strip_prefix(RPC_COMMAND)?.trim();
    let frame = hex::decode(body).ok()?;
    RawRequest::from_frame(&frame)
}
