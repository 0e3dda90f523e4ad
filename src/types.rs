// src/types.rs

use std::fmt;

/// Number of bytes an address occupies on the wire.
pub const RAW_ADDRESS_SIZE: usize = 16;

/// A driver-level address token.
///
/// The value is opaque to this crate; only the driver that produced it can
/// interpret it. Addresses are `Copy` so operations can stash the reply
/// address without borrowing the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(u64);

impl Address {
    /// Wrap a driver-defined address token.
    pub fn new(token: u64) -> Self {
        Address(token)
    }

    /// Get the raw token back out.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Wire-encoded form of an [`Address`], as produced by the driver.
///
/// A fixed-width opaque blob. This crate copies it in and out of headers
/// but never looks inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAddress([u8; RAW_ADDRESS_SIZE]);

impl RawAddress {
    /// Build from raw wire bytes.
    pub fn from_bytes(bytes: [u8; RAW_ADDRESS_SIZE]) -> Self {
        RawAddress(bytes)
    }

    /// The wire bytes.
    pub fn as_bytes(&self) -> &[u8; RAW_ADDRESS_SIZE] {
        &self.0
    }
}

impl Default for RawAddress {
    fn default() -> Self {
        RawAddress([0; RAW_ADDRESS_SIZE])
    }
}

/// Identifier for one logical RPC operation.
///
/// A pair of the originating transport's identifier and a sequence number
/// that increases monotonically within that transport. Unique for the
/// lifetime of the `OpManager` that allocated it; sequence wraparound past
/// 2^64 is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpId {
    transport_id: u64,
    sequence: u64,
}

impl OpId {
    /// Create an operation id.
    pub fn new(transport_id: u64, sequence: u64) -> Self {
        OpId {
            transport_id,
            sequence,
        }
    }

    /// Identifier of the transport that originated the operation.
    pub fn transport_id(self) -> u64 {
        self.transport_id
    }

    /// Sequence number within the originating transport.
    pub fn sequence(self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transport_id, self.sequence)
    }
}

/// Position of a message within an operation's delegation chain.
///
/// Two values are reserved: [`StageId::INITIAL_REQUEST`] marks the request
/// as sent by the original client, and [`StageId::ULTIMATE_RESPONSE`] marks
/// the final response headed back to that client. Everything in between is
/// an intermediate delegation stage, and stage ids strictly increase along
/// a chain of delegations for one op id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(u32);

impl StageId {
    /// The request as sent by the original client.
    pub const INITIAL_REQUEST: StageId = StageId(0);

    /// The final response, addressed to the original client.
    pub const ULTIMATE_RESPONSE: StageId = StageId(u32::MAX);

    /// Wrap a raw wire value.
    pub fn from_wire(value: u32) -> Self {
        StageId(value)
    }

    /// The raw wire value.
    pub fn get(self) -> u32 {
        self.0
    }

    /// True if this is the initial-request sentinel.
    pub fn is_initial_request(self) -> bool {
        self == Self::INITIAL_REQUEST
    }

    /// True if this is the ultimate-response sentinel.
    pub fn is_ultimate_response(self) -> bool {
        self == Self::ULTIMATE_RESPONSE
    }

    /// The stage id for the next hop in a delegation chain.
    ///
    /// Must not be called on the response sentinel; delegation always
    /// happens on a request or intermediate stage.
    pub fn next(self) -> StageId {
        debug_assert!(!self.is_ultimate_response());
        StageId(self.0 + 1)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_initial_request() {
            write!(f, "initial-request")
        } else if self.is_ultimate_response() {
            write!(f, "ultimate-response")
        } else {
            write!(f, "stage-{}", self.0)
        }
    }
}
