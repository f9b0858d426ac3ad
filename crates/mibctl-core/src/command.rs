//! Line-oriented textual command channel
//!
//! A few controller features (the alarm line) are only reachable through
//! human readable commands such as `alarm status`, answered with a response
//! string and a result code.

use crate::error::TransportError;

/// Result code attached to a textual command reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    Okay,
    Failed,
}

/// Reply to one textual command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub response: String,
    pub result: CommandResult,
}

impl CommandReply {
    pub fn okay(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            result: CommandResult::Okay,
        }
    }

    pub fn failed(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            result: CommandResult::Failed,
        }
    }

    pub fn is_okay(&self) -> bool {
        self.result == CommandResult::Okay
    }
}

/// Send a single command line and wait for its reply
pub trait CommandChannel {
    fn send_cmd(&mut self, cmd: &str) -> Result<CommandReply, TransportError>;
}

impl<C: CommandChannel + ?Sized> CommandChannel for &mut C {
    fn send_cmd(&mut self, cmd: &str) -> Result<CommandReply, TransportError> {
        (**self).send_cmd(cmd)
    }
}

impl<C: CommandChannel + ?Sized> CommandChannel for Box<C> {
    fn send_cmd(&mut self, cmd: &str) -> Result<CommandReply, TransportError> {
        (**self).send_cmd(cmd)
    }
}
