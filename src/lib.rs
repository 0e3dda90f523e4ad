//! Operation management for poll-driven RPC transports.
//!
//! This crate sits between an application and a message driver that offers
//! raw, unordered, possibly-failing delivery. It adds exactly one thing:
//! operation lifecycles. A client-side call is a [`RemoteOp`], a
//! server-side handling unit is a [`ServerOp`], and the [`OpManager`]
//! registry correlates inbound messages with whichever operation is
//! waiting for them, including operations whose owners walked away before
//! they finished (detached ops) and calls forwarded through several server
//! stages (delegation).
//!
//! There are no internal threads; everything advances inside
//! [`OpManager::poll`], which the application calls in its own loop.

pub mod driver;
pub mod error;
pub mod header;
pub mod manager;
pub mod remote;
pub mod server;
pub mod types;

#[cfg(test)]
mod proptests;

pub use driver::{Driver, InMessage, OutMessage, OutStatus};
pub use error::OpError;
pub use header::{Header, HEADER_SIZE};
pub use manager::{ManagerConfig, OpManager};
pub use remote::{RemoteOp, RemoteState};
pub use server::{ServerOp, ServerState};
pub use types::{Address, OpId, RawAddress, StageId, RAW_ADDRESS_SIZE};
