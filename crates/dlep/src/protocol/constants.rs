// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire constants: header sizes, signal/message codes, data-item (TLV)
//! codes, status codes, and the per-type TLV length table.
//!
//! All multi-byte fields are network byte order. Code points below are the
//! single source of truth for both ends of a deployment; never hardcode
//! them elsewhere.

/// Protocol version carried in every packet header.
pub const PROTOCOL_VERSION: u8 = 7;

/// Packet header: flags (1) + version (1) + payload length (2).
pub const PACKET_HEADER_LEN: usize = 4;

/// Message header: code (2) + length (2) + sequence (2).
pub const MESSAGE_HEADER_LEN: usize = 6;

/// TLV header: type (2) + length (2).
pub const TLV_HEADER_LEN: usize = 4;

/// Packet flag bit: payload is signal-class (discovery over UDP).
pub const PACKET_FLAG_SIGNAL: u8 = 0x01;

/// TLV type bit marking a data item the receiver must understand.
/// An unrecognized type with this bit set rejects the whole packet.
pub const TLV_MANDATORY_BIT: u16 = 0x8000;

/// Largest encoded packet this implementation emits or accepts.
pub const MAX_PACKET_LEN: usize = PACKET_HEADER_LEN + u16::MAX as usize;

/// Longest peer-type description, excluding any terminator.
pub const PEER_TYPE_MAX_LEN: usize = 80;

// ============================================================================
// Well-known endpoints (overridable via the config file)
// ============================================================================

/// Router-side default UDP/TCP port.
pub const ROUTER_DEFAULT_PORT: u16 = 5000;

/// Radio-side default UDP/TCP port.
pub const RADIO_DEFAULT_PORT: u16 = 5001;

/// IPv4 discovery multicast group.
pub const DISCOVERY_MCAST_V4: std::net::Ipv4Addr = std::net::Ipv4Addr::new(224, 0, 0, 117);

/// IPv6 link-local discovery multicast group (transported, not routed).
pub const DISCOVERY_MCAST_V6: std::net::Ipv6Addr =
    std::net::Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x0075);

// ============================================================================
// Signal codes (discovery class, UDP multicast)
// ============================================================================

pub const SIG_PEER_ATTACHED_DISCOVERY: u16 = 1;
pub const SIG_PEER_DETACHED_DISCOVERY: u16 = 2;
pub const SIG_PEER_OFFER: u16 = 3;

// ============================================================================
// Message codes (session class, TCP)
// ============================================================================

pub const MSG_PEER_INIT_REQ: u16 = 1;
pub const MSG_PEER_INIT_RES: u16 = 2;
pub const MSG_PEER_HEARTBEAT: u16 = 3;
pub const MSG_PEER_UPDATE_REQ: u16 = 4;
pub const MSG_PEER_UPDATE_RES: u16 = 5;
pub const MSG_PEER_TERM_REQ: u16 = 6;
pub const MSG_PEER_TERM_RES: u16 = 7;
pub const MSG_NEIGHBOR_UP_REQ: u16 = 8;
pub const MSG_NEIGHBOR_UP_RES: u16 = 9;
pub const MSG_NEIGHBOR_METRICS: u16 = 10;
pub const MSG_NEIGHBOR_ADDRESS_REQ: u16 = 11;
pub const MSG_NEIGHBOR_ADDRESS_RES: u16 = 12;
pub const MSG_NEIGHBOR_DOWN_REQ: u16 = 13;
pub const MSG_NEIGHBOR_DOWN_RES: u16 = 14;
pub const MSG_LINK_CHAR_REQ: u16 = 15;
pub const MSG_LINK_CHAR_RES: u16 = 16;

/// One past the highest assigned message code (bitmap sizing).
pub const MAX_MESSAGE_CODE: u16 = 17;

// ============================================================================
// Data item (TLV) codes
// ============================================================================

pub const TLV_VERSION: u16 = 1;
pub const TLV_PEER_TYPE: u16 = 2;
pub const TLV_HEARTBEAT_INTERVAL: u16 = 3;
pub const TLV_STATUS: u16 = 4;
pub const TLV_MAC_ADDRESS: u16 = 5;
pub const TLV_IPV4_ADDRESS: u16 = 6;
pub const TLV_IPV6_ADDRESS: u16 = 7;
pub const TLV_IPV4_ATTACHED_SUBNET: u16 = 8;
pub const TLV_IPV6_ATTACHED_SUBNET: u16 = 9;
pub const TLV_LINK_MDR_METRIC_TX: u16 = 10;
pub const TLV_LINK_MDR_METRIC_RX: u16 = 11;
pub const TLV_LINK_CDR_METRIC_TX: u16 = 12;
pub const TLV_LINK_CDR_METRIC_RX: u16 = 13;
pub const TLV_LINK_LATENCY_METRIC: u16 = 14;
pub const TLV_LINK_RESOURCES_METRIC_TX: u16 = 15;
pub const TLV_LINK_RESOURCES_METRIC_RX: u16 = 16;
pub const TLV_LINK_RLQ_METRIC_TX: u16 = 17;
pub const TLV_LINK_RLQ_METRIC_RX: u16 = 18;
pub const TLV_MTU: u16 = 19;
pub const TLV_CREDIT_GRANT: u16 = 20;
pub const TLV_CREDIT_REQUEST: u16 = 21;
pub const TLV_CREDIT_WINDOW_STATUS: u16 = 22;
pub const TLV_VENDOR_EXTENSION: u16 = 23;

/// One past the highest assigned data item code (bitmap sizing).
pub const MAX_DATA_ITEM: u16 = 24;

// ============================================================================
// Status codes
// ============================================================================

pub const STATUS_SUCCESS: u16 = 0;
pub const STATUS_UNKNOWN_MESSAGE: u16 = 1;
pub const STATUS_UNEXPECTED_MESSAGE: u16 = 2;
pub const STATUS_INVALID_DATA: u16 = 3;
pub const STATUS_INVALID_DESTINATION: u16 = 4;
pub const STATUS_TIMED_OUT: u16 = 5;
pub const STATUS_REQUEST_DENIED: u16 = 6;

// ============================================================================
// TLV value lengths
// ============================================================================

/// Expected value length for a recognized fixed-length TLV.
///
/// `None` means variable length (peer-type, vendor-extension); the decoder
/// bounds-checks those against the message remainder only.
pub fn tlv_fixed_len(tlv_type: u16) -> Option<u16> {
    match tlv_type {
        TLV_VERSION => Some(2),                 // major, minor
        TLV_PEER_TYPE => None,                  // 0..=80 bytes utf-8
        TLV_HEARTBEAT_INTERVAL => Some(4),      // seconds
        TLV_STATUS => Some(2),
        TLV_MAC_ADDRESS => Some(6),
        TLV_IPV4_ADDRESS => Some(5),            // op + addr
        TLV_IPV6_ADDRESS => Some(17),           // op + addr
        TLV_IPV4_ATTACHED_SUBNET => Some(6),    // op + addr + prefix
        TLV_IPV6_ATTACHED_SUBNET => Some(18),   // op + addr + prefix
        TLV_LINK_MDR_METRIC_TX
        | TLV_LINK_MDR_METRIC_RX
        | TLV_LINK_CDR_METRIC_TX
        | TLV_LINK_CDR_METRIC_RX
        | TLV_LINK_LATENCY_METRIC => Some(8),   // bps / milliseconds
        TLV_LINK_RESOURCES_METRIC_TX
        | TLV_LINK_RESOURCES_METRIC_RX
        | TLV_LINK_RLQ_METRIC_TX
        | TLV_LINK_RLQ_METRIC_RX => Some(1),    // 0..=100
        TLV_MTU => Some(2),
        TLV_CREDIT_GRANT | TLV_CREDIT_REQUEST => Some(8),
        TLV_CREDIT_WINDOW_STATUS => Some(16),   // mrw + rrw
        TLV_VENDOR_EXTENSION => None,           // oui + opaque payload
        _ => None,
    }
}

/// Data items a message code cannot arrive without.
pub fn mandatory_tlvs(message_code: u16, is_signal: bool) -> &'static [u16] {
    if is_signal {
        return match message_code {
            SIG_PEER_OFFER => &[TLV_PEER_TYPE],
            _ => &[],
        };
    }
    match message_code {
        MSG_PEER_INIT_REQ => &[TLV_VERSION, TLV_PEER_TYPE, TLV_HEARTBEAT_INTERVAL],
        MSG_PEER_INIT_RES => &[TLV_VERSION, TLV_PEER_TYPE, TLV_HEARTBEAT_INTERVAL, TLV_STATUS],
        MSG_PEER_UPDATE_RES | MSG_PEER_TERM_REQ | MSG_PEER_TERM_RES => &[TLV_STATUS],
        MSG_NEIGHBOR_UP_REQ => &[TLV_MAC_ADDRESS],
        MSG_NEIGHBOR_UP_RES => &[TLV_MAC_ADDRESS, TLV_STATUS],
        MSG_NEIGHBOR_METRICS => &[TLV_MAC_ADDRESS],
        MSG_NEIGHBOR_ADDRESS_REQ => &[TLV_MAC_ADDRESS],
        MSG_NEIGHBOR_ADDRESS_RES => &[TLV_MAC_ADDRESS, TLV_STATUS],
        MSG_NEIGHBOR_DOWN_REQ => &[TLV_MAC_ADDRESS],
        MSG_NEIGHBOR_DOWN_RES => &[TLV_MAC_ADDRESS, TLV_STATUS],
        MSG_LINK_CHAR_REQ => &[TLV_MAC_ADDRESS],
        MSG_LINK_CHAR_RES => &[TLV_MAC_ADDRESS],
        _ => &[],
    }
}

/// Printable name for a signal or message code (trace output).
pub fn code_name(code: u16, is_signal: bool) -> &'static str {
    if is_signal {
        return match code {
            SIG_PEER_ATTACHED_DISCOVERY => "peer-attached-discovery",
            SIG_PEER_DETACHED_DISCOVERY => "peer-detached-discovery",
            SIG_PEER_OFFER => "peer-offer",
            _ => "unknown-signal",
        };
    }
    match code {
        MSG_PEER_INIT_REQ => "peer-init-request",
        MSG_PEER_INIT_RES => "peer-init-response",
        MSG_PEER_HEARTBEAT => "peer-heartbeat",
        MSG_PEER_UPDATE_REQ => "peer-update-request",
        MSG_PEER_UPDATE_RES => "peer-update-response",
        MSG_PEER_TERM_REQ => "peer-term-request",
        MSG_PEER_TERM_RES => "peer-term-response",
        MSG_NEIGHBOR_UP_REQ => "neighbor-up-request",
        MSG_NEIGHBOR_UP_RES => "neighbor-up-response",
        MSG_NEIGHBOR_METRICS => "neighbor-metrics",
        MSG_NEIGHBOR_ADDRESS_REQ => "neighbor-address-request",
        MSG_NEIGHBOR_ADDRESS_RES => "neighbor-address-response",
        MSG_NEIGHBOR_DOWN_REQ => "neighbor-down-request",
        MSG_NEIGHBOR_DOWN_RES => "neighbor-down-response",
        MSG_LINK_CHAR_REQ => "link-characteristics-request",
        MSG_LINK_CHAR_RES => "link-characteristics-response",
        _ => "unknown-message",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_spaces_are_dense_and_disjoint() {
        for code in 1..MAX_MESSAGE_CODE {
            assert_ne!(code_name(code, false), "unknown-message", "code {code}");
        }
        assert_eq!(code_name(MAX_MESSAGE_CODE, false), "unknown-message");
        for code in [SIG_PEER_ATTACHED_DISCOVERY, SIG_PEER_DETACHED_DISCOVERY, SIG_PEER_OFFER] {
            assert_ne!(code_name(code, true), "unknown-signal");
        }
    }

    #[test]
    fn test_every_recognized_tlv_has_a_length_rule() {
        for t in 1..MAX_DATA_ITEM {
            // Variable-length types are the only ones allowed to answer None.
            if tlv_fixed_len(t).is_none() {
                assert!(
                    t == TLV_PEER_TYPE || t == TLV_VENDOR_EXTENSION,
                    "tlv {t} missing a fixed length"
                );
            }
        }
    }

    #[test]
    fn test_mandatory_tables_reference_recognized_tlvs() {
        for code in 1..MAX_MESSAGE_CODE {
            for &t in mandatory_tlvs(code, false) {
                assert!(t < MAX_DATA_ITEM);
            }
        }
    }
}
