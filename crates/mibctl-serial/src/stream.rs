//! Command stream over a line link
//!
//! [`CmdStream`] implements both the RPC [`Transport`] and the textual
//! [`CommandChannel`] of `mibctl-core` on top of one [`LineIo`] link.

use mibctl_core::{
    CommandChannel, CommandReply, CommandResult, RawRequest, RawResponse, Transport,
    TransportError,
};

use crate::protocol::{self, MAX_REPLY_LINES};
use crate::transport::LineIo;

/// Command stream to the field service unit
pub struct CmdStream<L: LineIo> {
    link: L,
}

impl<L: LineIo> CmdStream<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_inner(self) -> L {
        self.link
    }
}

impl<L: LineIo> CommandChannel for CmdStream<L> {
    fn send_cmd(&mut self, cmd: &str) -> Result<CommandReply, TransportError> {
        log::trace!("stream: > {}", cmd);
        self.link.write_line(cmd)?;

        let mut response = Vec::new();
        for _ in 0..MAX_REPLY_LINES {
            let line = self.link.read_line()?;
            log::trace!("stream: < {}", line);

            if let Some(result) = protocol::status_line(&line) {
                if result == CommandResult::Failed {
                    log::debug!("stream: '{}' failed: {}", cmd, line);
                }
                return Ok(CommandReply {
                    response: response.join("\n"),
                    result,
                });
            }
            response.push(line);
        }

        Err(TransportError::Malformed(format!(
            "no status line after {} lines in reply to '{}'",
            MAX_REPLY_LINES, cmd
        )))
    }
}

impl<L: LineIo> Transport for CmdStream<L> {
    fn send_request(&mut self, request: &RawRequest) -> Result<RawResponse, TransportError> {
        let reply = self.send_cmd(&protocol::encode_rpc(request))?;
        if !reply.is_okay() {
            return Err(TransportError::Malformed(format!(
                "RPC command rejected: {}",
                reply.response
            )));
        }

        let body = reply
            .response
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| TransportError::Malformed("empty RPC response".into()))?;
        protocol::decode_rpc_response(body)
    }
}
