//! mibctl-core - MIB controller protocol library
//!
//! This crate implements the host side of the MoMo module bus ("MIB"):
//! remote procedure calls addressed to bus modules, chunked access to the
//! controller's external flash, and management of the firmware buckets the
//! controller uses to stage images for modules and for itself.
//!
//! # Architecture
//!
//! Everything is layered on top of two injected collaborators:
//! - a [`Transport`] that exchanges exactly one request frame for one
//!   response frame, and
//! - a [`CommandChannel`] for the line-oriented textual commands
//!   (only the alarm line uses it).
//!
//! [`MibController`] owns the transport and is the entry point. Flash and
//! firmware operations are generic over [`MibProxy`], the small capability
//! shared by the controller and ordinary [`ModuleProxy`] handles.
//!
//! # Example
//!
//! ```no_run
//! use mibctl_core::{MibController, NoProgress, Transport};
//!
//! fn census_and_dump<T: Transport>(transport: T) -> mibctl_core::Result<Vec<u8>> {
//!     let mut controller = MibController::new(transport);
//!     for module in controller.enumerate_modules()? {
//!         println!("{} at {}", module.trimmed_name(), module.address);
//!     }
//!     controller.read_flash(0x1000, 64, &mut NoProgress)
//! }
//! ```

pub mod command;
pub mod controller;
pub mod error;
pub mod firmware;
pub mod flash;
pub mod hex;
pub mod module;
pub mod progress;
pub mod rpc;

#[cfg(test)]
pub(crate) mod testing;

pub use command::{CommandChannel, CommandReply, CommandResult};
pub use controller::MibController;
pub use error::{Error, RemoteError, Result, RpcError, TransportError};
pub use firmware::{BucketFlags, BucketOccupancy, FirmwareImage, FirmwareInfo, FirmwareSource};
pub use hex::HexRecord;
pub use module::ModuleDescriptor;
pub use progress::{NoProgress, Progress};
pub use rpc::{
    Arg, CommandId, MibProxy, ModuleProxy, RawRequest, RawResponse, ResultShape, RpcResult,
    Transport,
};
