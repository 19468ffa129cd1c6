// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy for the DLEP core.
//!
//! Each subsystem reports through its own kind enum; `Error` aggregates
//! them for API boundaries. Propagation rules:
//!
//! - `DecodeError` is local: the offending packet is dropped, a reject
//!   counter is bumped, the session stays up.
//! - `ProtocolError` terminates the peer with the matching status code.
//! - `TimeoutError` is consumed by the owning state machine.
//! - `TransportError` at session level terminates the peer.
//! - `ConfigError::OutOfRange` is clamped at parse time (warning only).

use std::fmt;
use std::io;

/// Inbound packet validation failures (packet is dropped, peer stays up).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Packet header carries an unsupported protocol version.
    BadVersion { got: u8 },
    /// Fewer bytes on the wire than a header or declared length requires.
    ShortPacket { need: usize, have: usize },
    /// A TLV length field runs past the end of its message.
    TlvOverrun { tlv_type: u16, declared: u16, remaining: usize },
    /// A message is missing a TLV its code requires.
    MandatoryTlvMissing { message_code: u16, tlv_type: u16 },
    /// The same single-valued TLV appeared twice in one message.
    DuplicateTlv { tlv_type: u16 },
    /// A recognized TLV carried a length its type does not allow.
    BadTlvLength { tlv_type: u16, got: u16, want: u16 },
    /// An unrecognized TLV with the mandatory bit set cannot be skipped.
    UnknownMandatory { tlv_type: u16 },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::BadVersion { got } => {
                write!(f, "unsupported protocol version {got}")
            }
            DecodeError::ShortPacket { need, have } => {
                write!(f, "short packet: need {need} bytes, have {have}")
            }
            DecodeError::TlvOverrun { tlv_type, declared, remaining } => write!(
                f,
                "tlv {tlv_type} overruns message: declared {declared}, {remaining} remaining"
            ),
            DecodeError::MandatoryTlvMissing { message_code, tlv_type } => write!(
                f,
                "message {message_code} missing mandatory tlv {tlv_type}"
            ),
            DecodeError::DuplicateTlv { tlv_type } => {
                write!(f, "duplicate tlv {tlv_type}")
            }
            DecodeError::BadTlvLength { tlv_type, got, want } => {
                write!(f, "tlv {tlv_type} length {got}, expected {want}")
            }
            DecodeError::UnknownMandatory { tlv_type } => {
                write!(f, "unknown mandatory tlv {tlv_type}")
            }
        }
    }
}

/// Session-layer violations that force peer termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// A recognized message the radio role never accepts.
    UnexpectedMessageForRole { message_code: u16 },
    /// A message code outside the recognized set.
    UnknownMessageCode { message_code: u16 },
    /// A neighbor-scoped message named a MAC not in the table.
    UnknownNeighborMac,
    /// An ACK arrived with a sequence that matches no in-flight request.
    SequenceMismatch { got: u16, expected: u16 },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnexpectedMessageForRole { message_code } => {
                write!(f, "message {message_code} not valid for the radio role")
            }
            ProtocolError::UnknownMessageCode { message_code } => {
                write!(f, "unknown message code {message_code}")
            }
            ProtocolError::UnknownNeighborMac => write!(f, "unknown neighbor mac"),
            ProtocolError::SequenceMismatch { got, expected } => {
                write!(f, "sequence {got} does not match expected {expected}")
            }
        }
    }
}

/// Retransmission supervision outcomes, consumed by the owning FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutError {
    InitAck { missed: u32 },
    UpdateAck { missed: u32 },
    TermAck { missed: u32 },
    HeartbeatMissed { missed: u32 },
}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutError::InitAck { missed } => write!(f, "init-ack missed {missed}"),
            TimeoutError::UpdateAck { missed } => write!(f, "update-ack missed {missed}"),
            TimeoutError::TermAck { missed } => write!(f, "term-ack missed {missed}"),
            TimeoutError::HeartbeatMissed { missed } => {
                write!(f, "heartbeat-missed {missed}")
            }
        }
    }
}

/// Socket-level failures.
#[derive(Debug)]
pub enum TransportError {
    BindFailed { addr: String, source: io::Error },
    ConnectFailed { addr: String, source: io::Error },
    SendFailed(io::Error),
    RecvFailed(io::Error),
    /// Zero-byte read: the router closed the session.
    PeerClosed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::BindFailed { addr, source } => {
                write!(f, "bind {addr} failed: {source}")
            }
            TransportError::ConnectFailed { addr, source } => {
                write!(f, "connect {addr} failed: {source}")
            }
            TransportError::SendFailed(e) => write!(f, "send failed: {e}"),
            TransportError::RecvFailed(e) => write!(f, "recv failed: {e}"),
            TransportError::PeerClosed => write!(f, "peer closed the session"),
        }
    }
}

/// Configuration file problems.
#[derive(Debug)]
pub enum ConfigError {
    FileNotFound { path: String, source: io::Error },
    /// A line whose key or value could not be parsed.
    BadKey { line: usize, key: String },
    /// Value clamped into its legal range; parsing continues.
    OutOfRange { key: String, got: u64, min: u64, max: u64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound { path, source } => {
                write!(f, "config file {path}: {source}")
            }
            ConfigError::BadKey { line, key } => {
                write!(f, "config line {line}: bad key/value '{key}'")
            }
            ConfigError::OutOfRange { key, got, min, max } => {
                write!(f, "config {key}={got} outside [{min}, {max}], clamped")
            }
        }
    }
}

// ============================================================================
// Aggregate
// ============================================================================

/// Top-level error for API boundaries (runtime construction, agent startup).
#[derive(Debug)]
pub enum Error {
    Decode(DecodeError),
    Protocol(ProtocolError),
    Timeout(TimeoutError),
    Transport(TransportError),
    Config(ConfigError),
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Decode(e) => write!(f, "decode: {e}"),
            Error::Protocol(e) => write!(f, "protocol: {e}"),
            Error::Timeout(e) => write!(f, "timeout: {e}"),
            Error::Transport(e) => write!(f, "transport: {e}"),
            Error::Config(e) => write!(f, "config: {e}"),
            Error::Io(e) => write!(f, "io: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<TimeoutError> for Error {
    fn from(e: TimeoutError) -> Self {
        Error::Timeout(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
