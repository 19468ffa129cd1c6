// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Admin surface: the command queue posted into the event loop and the
//! snapshot structs the loop publishes back.
//!
//! The peer table is owned solely by the loop; an inspecting CLI never
//! reads it directly. `Show` carries a reply channel, everything else is
//! fire-and-forget.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::core::{AddressOp, MacAddress};
use crate::error::DecodeError;
use crate::protocol::LinkMetrics;

/// Commands posted from outside the loop (CLI, tests).
#[derive(Debug)]
pub enum AdminCommand {
    /// Create the peer and begin discovery/offering.
    Start,
    /// Tear the peer down gracefully.
    Stop,
    /// Announce a newly heard station: neighbor-up handshake.
    NeighborUp { mac: MacAddress, ipv4: Option<Ipv4Addr>, ipv6: Option<Ipv6Addr> },
    /// Take a station down: neighbor-down handshake.
    NeighborDown { mac: MacAddress },
    /// Stage and send a neighbor layer-3 address change.
    NeighborAddress {
        mac: MacAddress,
        ipv4: Option<(AddressOp, Ipv4Addr)>,
        ipv6: Option<(AddressOp, Ipv6Addr)>,
    },
    /// Stage and send a peer-level layer-3 address change.
    PeerAddress {
        ipv4: Option<(AddressOp, Ipv4Addr)>,
        ipv6: Option<(AddressOp, Ipv6Addr)>,
    },
    /// Overwrite the debug-flag word.
    SetDebugFlags(u32),
    /// Read back current state through the queue.
    Show(crossbeam::channel::Sender<StatusSnapshot>),
}

/// Counter block surfaced by the `show` tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    pub signals_rx: u64,
    pub signals_tx: u64,
    pub messages_rx: u64,
    pub messages_tx: u64,
    pub send_failures: u64,

    // Decoder rejects, per kind.
    pub decode_bad_version: u64,
    pub decode_short_packet: u64,
    pub decode_tlv_overrun: u64,
    pub decode_mandatory_missing: u64,
    pub decode_duplicate_tlv: u64,
    pub decode_bad_tlv_length: u64,
    pub decode_unknown_mandatory: u64,

    // Protocol violations.
    pub unknown_message: u64,
    pub unexpected_message: u64,
    pub unknown_neighbor_mac: u64,
    pub sequence_mismatch: u64,

    // Missed acks, per class.
    pub heartbeats_missed: u64,
    pub init_ack_timeouts: u64,
    pub update_ack_timeouts: u64,
    pub down_ack_timeouts: u64,
    pub term_ack_timeouts: u64,
}

impl Counters {
    /// Total decoder rejections.
    pub fn decode_rejects(&self) -> u64 {
        self.decode_bad_version
            + self.decode_short_packet
            + self.decode_tlv_overrun
            + self.decode_mandatory_missing
            + self.decode_duplicate_tlv
            + self.decode_bad_tlv_length
            + self.decode_unknown_mandatory
    }

    pub fn note_decode_error(&mut self, err: &DecodeError) {
        match err {
            DecodeError::BadVersion { .. } => self.decode_bad_version += 1,
            DecodeError::ShortPacket { .. } => self.decode_short_packet += 1,
            DecodeError::TlvOverrun { .. } => self.decode_tlv_overrun += 1,
            DecodeError::MandatoryTlvMissing { .. } => self.decode_mandatory_missing += 1,
            DecodeError::DuplicateTlv { .. } => self.decode_duplicate_tlv += 1,
            DecodeError::BadTlvLength { .. } => self.decode_bad_tlv_length += 1,
            DecodeError::UnknownMandatory { .. } => self.decode_unknown_mandatory += 1,
        }
    }
}

/// One neighbor, as the `show` tree prints it.
#[derive(Debug, Clone)]
pub struct NeighborSnapshot {
    pub mac: MacAddress,
    pub local_id: u16,
    pub state: &'static str,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub metrics: LinkMetrics,
    pub up_ack_tmo_count: u32,
    pub update_ack_tmo_count: u32,
    pub down_ack_tmo_count: u32,
    pub activity_flag: bool,
}

/// The peer, as the `show` tree prints it.
#[derive(Debug, Clone)]
pub struct PeerSnapshot {
    pub peer_id: u32,
    pub state: &'static str,
    pub description: String,
    pub ipv4: Option<Ipv4Addr>,
    pub udp_port: u16,
    pub tcp_port: u16,
    pub sequence: u16,
    pub heartbeat_missed_count: u32,
    pub status_code: u16,
    pub neighbors: Vec<NeighborSnapshot>,
}

/// Everything a `show` returns in one consistent read.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub sim_name: String,
    pub debug_flags: u32,
    pub peer: Option<PeerSnapshot>,
    pub counters: Counters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reject_total_tracks_kinds() {
        let mut counters = Counters::default();
        counters.note_decode_error(&DecodeError::BadVersion { got: 3 });
        counters.note_decode_error(&DecodeError::TlvOverrun {
            tlv_type: 4,
            declared: 40,
            remaining: 12,
        });
        counters.note_decode_error(&DecodeError::TlvOverrun {
            tlv_type: 4,
            declared: 9,
            remaining: 1,
        });
        assert_eq!(counters.decode_bad_version, 1);
        assert_eq!(counters.decode_tlv_overrun, 2);
        assert_eq!(counters.decode_rejects(), 3);
    }
}
