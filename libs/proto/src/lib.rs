//! Shared wire protocol for the darter task scheduler.
//!
//! Schedulers, node monitors, and application backends exchange
//! length-prefixed binary records over TCP. This crate is the single source
//! of truth for those records: the message types, the framing codec, and the
//! request/response client used by every peer.
//!
//! Field and variant order in [`messages`] is fixed by the wire format and
//! must not change between releases.

pub mod client;
pub mod codec;
pub mod error;
pub mod messages;

pub use client::{ClientPool, RpcClient};
pub use codec::{ClientCodec, RpcCodec, ServerCodec};
pub use error::ProtoError;
pub use messages::{
    EnqueueTaskReservationsRequest, FullTaskId, HostPort, Request, ResourceUsage, ResourceVector,
    Response, TaskLaunchSpec, UserGroupInfo,
};
