//! In-memory stand-ins for the serial link, used by unit tests

use std::collections::VecDeque;

use crate::command::{CommandChannel, CommandReply};
use crate::error::TransportError;
use crate::firmware::BucketFlags;
use crate::hex::record_type;
use crate::progress::Progress;
use crate::rpc::{feature, RawRequest, RawResponse, Transport};

/// Replays queued responses and records every request
#[derive(Default)]
pub struct ScriptedTransport {
    pub requests: Vec<RawRequest>,
    pub commands: Vec<String>,
    responses: VecDeque<Result<RawResponse, TransportError>>,
    replies: VecDeque<CommandReply>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, response: RawResponse) {
        self.responses.push_back(Ok(response));
    }

    pub fn push_failure(&mut self, error: TransportError) {
        self.responses.push_back(Err(error));
    }

    pub fn push_reply(&mut self, reply: CommandReply) {
        self.replies.push_back(reply);
    }
}

impl Transport for ScriptedTransport {
    fn send_request(&mut self, request: &RawRequest) -> Result<RawResponse, TransportError> {
        self.requests.push(request.clone());
        self.responses
            .pop_front()
            .unwrap_or(Err(TransportError::Timeout))
    }
}

impl CommandChannel for ScriptedTransport {
    fn send_cmd(&mut self, cmd: &str) -> Result<CommandReply, TransportError> {
        self.commands.push(cmd.to_string());
        self.replies.pop_front().ok_or(TransportError::Timeout)
    }
}

const FLASH_SIZE: usize = 1024 * 1024;
const SECTOR_SIZE: usize = 4096;
const BUCKET_BASE: u32 = 0x6_4000;
const BUCKET_SPAN: u32 = 0x1_0000;

const ERR_UNKNOWN_COMMAND: u8 = 2;
const ERR_BAD_PARAM: u8 = 3;
const ERR_NOTHING_TO_REFLASH: u8 = 7;

struct FakeBucket {
    module_type: u16,
    data: Vec<u8>,
}

/// Behaves like the controller firmware: flash, module census, buckets, alarm
pub struct FakeController {
    pub requests: Vec<RawRequest>,
    pub commands: Vec<String>,
    pub flash: Vec<u8>,
    pub modules: Vec<String>,
    pub controller_firmware: bool,
    pub backup_firmware: bool,
    pub alarm: bool,
    /// Added to every echoed write address
    pub write_skew: u32,
    /// Return only half of every read chunk
    pub short_reads: bool,
    buckets: Vec<FakeBucket>,
    pushing: Option<FakeBucket>,
}

impl FakeController {
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
            commands: Vec::new(),
            flash: vec![0xFF; FLASH_SIZE],
            modules: Vec::new(),
            controller_firmware: false,
            backup_firmware: false,
            alarm: false,
            write_skew: 0,
            short_reads: false,
            buckets: Vec::new(),
            pushing: None,
        }
    }

    pub fn add_bucket(&mut self, module_type: u16, data: Vec<u8>) {
        self.buckets.push(FakeBucket { module_type, data });
    }

    fn controller(&mut self, cmd: u8, ints: &[u16], buf: &[u8]) -> RawResponse {
        match cmd {
            0x01 => RawResponse::with_values(&[self.modules.len() as u16], &[]),
            0x02 => match self.modules.get(ints[0] as usize) {
                Some(name) => {
                    let mut desc = name.as_bytes().to_vec();
                    desc.push(0x01);
                    RawResponse::with_values(&[], &desc)
                }
                None => RawResponse::error(ERR_BAD_PARAM),
            },
            0x03 => {
                let addr = (ints[0] as usize) | (ints[1] as usize) << 16;
                let want = if self.short_reads { 10 } else { 20 };
                let end = (addr + want).min(FLASH_SIZE);
                RawResponse::with_values(&[], &self.flash[addr.min(end)..end])
            }
            0x04 => {
                let addr = (ints[0] as usize) | (ints[1] as usize) << 16;
                self.flash[addr..addr + buf.len()].copy_from_slice(buf);
                let echoed = addr as u32 + self.write_skew;
                RawResponse::with_values(&[echoed as u16, (echoed >> 16) as u16], &[])
            }
            0x05 => {
                self.modules.clear();
                RawResponse::empty()
            }
            0x06 => {
                let addr = (ints[0] as usize) | (ints[1] as usize) << 16;
                let start = addr & !(SECTOR_SIZE - 1);
                self.flash[start..start + SECTOR_SIZE].fill(0xFF);
                RawResponse::empty()
            }
            0x0A if self.controller_firmware => RawResponse::empty(),
            0x0A => RawResponse::error(ERR_NOTHING_TO_REFLASH),
            _ => RawResponse::error(ERR_UNKNOWN_COMMAND),
        }
    }

    fn firmware_cache(&mut self, cmd: u8, ints: &[u16], buf: &[u8]) -> RawResponse {
        match cmd {
            0x00 => {
                self.pushing = Some(FakeBucket {
                    module_type: ints[0],
                    data: Vec::new(),
                });
                RawResponse::with_values(&[self.buckets.len() as u16], &[])
            }
            0x01 => {
                let Some(bucket) = self.pushing.as_mut() else {
                    return RawResponse::error(ERR_BAD_PARAM);
                };
                let addr = u16::from_le_bytes([buf[0], buf[1]]) as usize;
                match buf[2] {
                    record_type::DATA => {
                        let data = &buf[3..];
                        if bucket.data.len() < addr + data.len() {
                            bucket.data.resize(addr + data.len(), 0xFF);
                        }
                        bucket.data[addr..addr + data.len()].copy_from_slice(data);
                    }
                    record_type::EOF => {
                        if let Some(done) = self.pushing.take() {
                            self.buckets.push(done);
                        }
                    }
                    _ => {}
                }
                RawResponse::empty()
            }
            0x02 => {
                self.pushing = None;
                RawResponse::empty()
            }
            0x03 => match self.buckets.get(ints[0] as usize) {
                Some(b) => {
                    let len = b.data.len() as u32;
                    let base = BUCKET_BASE + ints[0] as u32 * BUCKET_SPAN;
                    RawResponse::with_values(
                        &[
                            b.module_type,
                            (len >> 16) as u16,
                            len as u16,
                            (base >> 16) as u16,
                            base as u16,
                            (base / SECTOR_SIZE as u32) as u16,
                            (BUCKET_SPAN / SECTOR_SIZE as u32) as u16,
                        ],
                        &[],
                    )
                }
                None => RawResponse::error(ERR_BAD_PARAM),
            },
            0x04 => match self.buckets.get(ints[0] as usize) {
                Some(b) => {
                    let start = (ints[1] as usize).min(b.data.len());
                    let end = (start + 20).min(b.data.len());
                    RawResponse::with_values(&[], &b.data[start..end])
                }
                None => RawResponse::error(ERR_BAD_PARAM),
            },
            0x05 => {
                let mut flags = BucketFlags::empty();
                flags.set(BucketFlags::CONTROLLER_FIRMWARE, self.controller_firmware);
                flags.set(BucketFlags::BACKUP_FIRMWARE, self.backup_firmware);
                RawResponse::with_values(&[self.buckets.len() as u16, flags.bits()], &[])
            }
            0x0A => {
                self.buckets.clear();
                self.pushing = None;
                self.controller_firmware = false;
                self.backup_firmware = false;
                RawResponse::empty()
            }
            _ => RawResponse::error(ERR_UNKNOWN_COMMAND),
        }
    }
}

impl Transport for FakeController {
    fn send_request(&mut self, request: &RawRequest) -> Result<RawResponse, TransportError> {
        self.requests.push(request.clone());
        let ints = request.int_params();
        let buf = request.buffer_param().unwrap_or(&[]).to_vec();
        let cmd = request.command.command;
        Ok(match request.command.feature {
            feature::CONTROLLER => self.controller(cmd, &ints, &buf),
            feature::FIRMWARE_CACHE => self.firmware_cache(cmd, &ints, &buf),
            _ => RawResponse::error(ERR_UNKNOWN_COMMAND),
        })
    }
}

impl CommandChannel for FakeController {
    fn send_cmd(&mut self, cmd: &str) -> Result<CommandReply, TransportError> {
        self.commands.push(cmd.to_string());
        Ok(match cmd {
            "alarm status" => CommandReply::okay(if self.alarm { "0" } else { "1" }),
            "alarm yes" => {
                self.alarm = true;
                CommandReply::okay("")
            }
            "alarm no" => {
                self.alarm = false;
                CommandReply::okay("")
            }
            _ => CommandReply::failed("unknown command"),
        })
    }
}

/// Records the progress calls it receives
#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub total: Option<u64>,
    pub steps: Vec<u64>,
    pub ended: bool,
}

impl Progress for RecordingProgress {
    fn start(&mut self, total: u64) {
        self.total = Some(total);
    }

    fn progress(&mut self, n: u64) {
        self.steps.push(n);
    }

    fn end(&mut self) {
        self.ended = true;
    }
}
