//! IPC between isolated extension surfaces and the host.
//!
//! Extension script posts `INVOKE_REQUEST` messages; the [`CommandBridge`]
//! checks where they came from and whether the command is allowlisted, hands
//! them to a [`HostDispatcher`], and posts `INVOKE_RESPONSE` or
//! `INVOKE_ERROR` back to the originating surface.

mod bridge;
mod commands;
mod context;
mod dispatch;
mod types;

pub use bridge::{BridgeError, BridgeOutcome, CommandBridge, ListenerId};
pub use commands::{CommandKind, HostCommand, UnknownCommand};
pub use context::InvokeContext;
pub use dispatch::{DispatchError, FsDispatcher, HostDispatcher};
pub use types::{
    Inbound, InvokeErrorPayload, InvokeRequest, OutboundMessage, INVOKE_ERROR, INVOKE_REQUEST,
    INVOKE_RESPONSE,
};
