// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outbound frame construction.
//!
//! [`PacketBuilder`] owns the byte layout: it writes placeholder headers,
//! appends TLVs, and back-patches the message length on `end_message` and
//! the packet length on `seal`. The per-message builders below it write
//! data items in canonical order; they cover every recognized signal and
//! message so both ends of a deployment (and the round-trip tests) build
//! from the same code.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::core::{AddressOp, MacAddress};
use crate::protocol::constants::*;
use crate::protocol::{CreditWindow, LinkMetrics};

/// Incremental packet writer with header back-patching.
pub struct PacketBuilder {
    buf: Vec<u8>,
    /// Offset of the open message header, if any.
    msg_start: Option<usize>,
}

impl PacketBuilder {
    /// Start a signal-class (discovery) packet.
    pub fn signal() -> Self {
        Self::with_flags(PACKET_FLAG_SIGNAL)
    }

    /// Start a message-class (session) packet.
    pub fn message() -> Self {
        Self::with_flags(0)
    }

    fn with_flags(flags: u8) -> Self {
        let mut buf = Vec::with_capacity(128);
        buf.push(flags);
        buf.push(PROTOCOL_VERSION);
        buf.extend_from_slice(&0u16.to_be_bytes()); // payload length, patched in seal()
        PacketBuilder { buf, msg_start: None }
    }

    /// Open a message with the given code and sequence number.
    pub fn begin_message(&mut self, code: u16, sequence: u16) -> &mut Self {
        debug_assert!(self.msg_start.is_none(), "previous message not ended");
        self.msg_start = Some(self.buf.len());
        self.buf.extend_from_slice(&code.to_be_bytes());
        self.buf.extend_from_slice(&0u16.to_be_bytes()); // TLV bytes, patched in end_message()
        self.buf.extend_from_slice(&sequence.to_be_bytes());
        self
    }

    /// Close the open message, back-patching its length field.
    pub fn end_message(&mut self) -> &mut Self {
        let Some(start) = self.msg_start.take() else {
            debug_assert!(false, "end_message without begin_message");
            return self;
        };
        let tlv_len = (self.buf.len() - start - MESSAGE_HEADER_LEN) as u16;
        self.buf[start + 2..start + 4].copy_from_slice(&tlv_len.to_be_bytes());
        self
    }

    /// Back-patch the packet header and return the finished frame.
    pub fn seal(mut self) -> Vec<u8> {
        debug_assert!(self.msg_start.is_none(), "message left open");
        let payload = (self.buf.len() - PACKET_HEADER_LEN) as u16;
        self.buf[2..4].copy_from_slice(&payload.to_be_bytes());
        self.buf
    }

    // ------------------------------------------------------------------
    // TLV primitives
    // ------------------------------------------------------------------

    fn tlv_header(&mut self, tlv_type: u16, len: u16) {
        self.buf.extend_from_slice(&tlv_type.to_be_bytes());
        self.buf.extend_from_slice(&len.to_be_bytes());
    }

    pub fn tlv_u8(&mut self, tlv_type: u16, v: u8) -> &mut Self {
        self.tlv_header(tlv_type, 1);
        self.buf.push(v);
        self
    }

    pub fn tlv_u16(&mut self, tlv_type: u16, v: u16) -> &mut Self {
        self.tlv_header(tlv_type, 2);
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn tlv_u32(&mut self, tlv_type: u16, v: u32) -> &mut Self {
        self.tlv_header(tlv_type, 4);
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn tlv_u64(&mut self, tlv_type: u16, v: u64) -> &mut Self {
        self.tlv_header(tlv_type, 8);
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn tlv_bytes(&mut self, tlv_type: u16, v: &[u8]) -> &mut Self {
        self.tlv_header(tlv_type, v.len() as u16);
        self.buf.extend_from_slice(v);
        self
    }

    // ------------------------------------------------------------------
    // Typed data items
    // ------------------------------------------------------------------

    pub fn tlv_version(&mut self) -> &mut Self {
        self.tlv_bytes(TLV_VERSION, &[PROTOCOL_VERSION, 0])
    }

    /// Peer type description, truncated to the wire maximum.
    pub fn tlv_peer_type(&mut self, description: &str) -> &mut Self {
        let bytes = description.as_bytes();
        let take = bytes.len().min(PEER_TYPE_MAX_LEN);
        let slice = &bytes[..take];
        self.tlv_bytes(TLV_PEER_TYPE, slice)
    }

    pub fn tlv_heartbeat_interval(&mut self, seconds: u32) -> &mut Self {
        self.tlv_u32(TLV_HEARTBEAT_INTERVAL, seconds)
    }

    pub fn tlv_status(&mut self, status: u16) -> &mut Self {
        self.tlv_u16(TLV_STATUS, status)
    }

    pub fn tlv_mac(&mut self, mac: &MacAddress) -> &mut Self {
        self.tlv_bytes(TLV_MAC_ADDRESS, mac.octets())
    }

    pub fn tlv_ipv4(&mut self, op: AddressOp, addr: Ipv4Addr) -> &mut Self {
        let mut v = [0u8; 5];
        v[0] = op.to_wire();
        v[1..5].copy_from_slice(&addr.octets());
        self.tlv_bytes(TLV_IPV4_ADDRESS, &v)
    }

    pub fn tlv_ipv6(&mut self, op: AddressOp, addr: Ipv6Addr) -> &mut Self {
        let mut v = [0u8; 17];
        v[0] = op.to_wire();
        v[1..17].copy_from_slice(&addr.octets());
        self.tlv_bytes(TLV_IPV6_ADDRESS, &v)
    }

    pub fn tlv_ipv4_subnet(&mut self, op: AddressOp, addr: Ipv4Addr, prefix: u8) -> &mut Self {
        let mut v = [0u8; 6];
        v[0] = op.to_wire();
        v[1..5].copy_from_slice(&addr.octets());
        v[5] = prefix;
        self.tlv_bytes(TLV_IPV4_ATTACHED_SUBNET, &v)
    }

    pub fn tlv_ipv6_subnet(&mut self, op: AddressOp, addr: Ipv6Addr, prefix: u8) -> &mut Self {
        let mut v = [0u8; 18];
        v[0] = op.to_wire();
        v[1..17].copy_from_slice(&addr.octets());
        v[17] = prefix;
        self.tlv_bytes(TLV_IPV6_ATTACHED_SUBNET, &v)
    }

    /// Metric block in canonical order. The block is written whole so a
    /// receiver never observes a partial snapshot.
    pub fn tlv_metrics(&mut self, m: &LinkMetrics) -> &mut Self {
        self.tlv_u64(TLV_LINK_MDR_METRIC_TX, m.mdr_tx)
            .tlv_u64(TLV_LINK_MDR_METRIC_RX, m.mdr_rx)
            .tlv_u64(TLV_LINK_CDR_METRIC_TX, m.cdr_tx)
            .tlv_u64(TLV_LINK_CDR_METRIC_RX, m.cdr_rx)
            .tlv_u64(TLV_LINK_LATENCY_METRIC, m.latency_ms)
            .tlv_u8(TLV_LINK_RESOURCES_METRIC_TX, m.resources_tx)
            .tlv_u8(TLV_LINK_RESOURCES_METRIC_RX, m.resources_rx)
            .tlv_u8(TLV_LINK_RLQ_METRIC_TX, m.rlq_tx)
            .tlv_u8(TLV_LINK_RLQ_METRIC_RX, m.rlq_rx)
            .tlv_u16(TLV_MTU, m.mtu)
    }

    pub fn tlv_credit_grant(&mut self, grant: u64) -> &mut Self {
        self.tlv_u64(TLV_CREDIT_GRANT, grant)
    }

    pub fn tlv_credit_window(&mut self, mrw: u64, rrw: u64) -> &mut Self {
        let mut v = [0u8; 16];
        v[..8].copy_from_slice(&mrw.to_be_bytes());
        v[8..].copy_from_slice(&rrw.to_be_bytes());
        self.tlv_bytes(TLV_CREDIT_WINDOW_STATUS, &v)
    }

    /// Vendor extension carrying the locally supported signal and data
    /// item bitmaps (negotiation is advisory; unknown receivers skip it).
    pub fn tlv_supported_bitmaps(&mut self, signals: u32, data_items: u32) -> &mut Self {
        let mut v = [0u8; 11];
        v[..3].copy_from_slice(VENDOR_OUI);
        v[3..7].copy_from_slice(&signals.to_be_bytes());
        v[7..11].copy_from_slice(&data_items.to_be_bytes());
        self.tlv_bytes(TLV_VENDOR_EXTENSION, &v)
    }
}

/// OUI prefix for the vendor-extension data item.
pub const VENDOR_OUI: &[u8; 3] = &[0x00, 0x0b, 0x85];

// ============================================================================
// Signals
// ============================================================================

/// Discovery signal (attached or detached) announcing a router.
pub fn peer_discovery(seq: u16, attached: bool, description: &str) -> Vec<u8> {
    let code = if attached { SIG_PEER_ATTACHED_DISCOVERY } else { SIG_PEER_DETACHED_DISCOVERY };
    let mut b = PacketBuilder::signal();
    b.begin_message(code, seq).tlv_version().tlv_peer_type(description).end_message();
    b.seal()
}

/// The radio's answer to a discovery: where the session lives.
pub fn peer_offer(
    seq: u16,
    description: &str,
    heartbeat_interval: u32,
    local_ipv4: Ipv4Addr,
) -> Vec<u8> {
    let mut b = PacketBuilder::signal();
    b.begin_message(SIG_PEER_OFFER, seq)
        .tlv_version()
        .tlv_peer_type(description)
        .tlv_heartbeat_interval(heartbeat_interval)
        .tlv_ipv4(AddressOp::Add, local_ipv4)
        .end_message();
    b.seal()
}

// ============================================================================
// Peer messages
// ============================================================================

pub fn peer_init_request(seq: u16, description: &str, heartbeat_interval: u32) -> Vec<u8> {
    let mut b = PacketBuilder::message();
    b.begin_message(MSG_PEER_INIT_REQ, seq)
        .tlv_version()
        .tlv_peer_type(description)
        .tlv_heartbeat_interval(heartbeat_interval)
        .end_message();
    b.seal()
}

pub fn peer_init_response(
    seq: u16,
    description: &str,
    heartbeat_interval: u32,
    status: u16,
    optional_signals: u32,
    optional_data_items: u32,
) -> Vec<u8> {
    let mut b = PacketBuilder::message();
    b.begin_message(MSG_PEER_INIT_RES, seq)
        .tlv_version()
        .tlv_peer_type(description)
        .tlv_heartbeat_interval(heartbeat_interval)
        .tlv_status(status)
        .tlv_supported_bitmaps(optional_signals, optional_data_items)
        .end_message();
    b.seal()
}

pub fn peer_heartbeat(seq: u16) -> Vec<u8> {
    let mut b = PacketBuilder::message();
    b.begin_message(MSG_PEER_HEARTBEAT, seq).end_message();
    b.seal()
}

/// Peer-level layer-3 address change.
pub fn peer_update_request(
    seq: u16,
    ipv4: Option<(AddressOp, Ipv4Addr)>,
    ipv6: Option<(AddressOp, Ipv6Addr)>,
) -> Vec<u8> {
    let mut b = PacketBuilder::message();
    b.begin_message(MSG_PEER_UPDATE_REQ, seq);
    if let Some((op, addr)) = ipv4 {
        b.tlv_ipv4(op, addr);
    }
    if let Some((op, addr)) = ipv6 {
        b.tlv_ipv6(op, addr);
    }
    b.end_message();
    b.seal()
}

pub fn peer_update_response(seq: u16, status: u16) -> Vec<u8> {
    let mut b = PacketBuilder::message();
    b.begin_message(MSG_PEER_UPDATE_RES, seq).tlv_status(status).end_message();
    b.seal()
}

pub fn peer_term_request(seq: u16, status: u16) -> Vec<u8> {
    let mut b = PacketBuilder::message();
    b.begin_message(MSG_PEER_TERM_REQ, seq).tlv_status(status).end_message();
    b.seal()
}

pub fn peer_term_response(seq: u16, status: u16) -> Vec<u8> {
    let mut b = PacketBuilder::message();
    b.begin_message(MSG_PEER_TERM_RES, seq).tlv_status(status).end_message();
    b.seal()
}

// ============================================================================
// Neighbor messages
// ============================================================================

pub struct NeighborUp<'a> {
    pub mac: MacAddress,
    pub metrics: &'a LinkMetrics,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub credits: Option<&'a CreditWindow>,
}

pub fn neighbor_up_request(seq: u16, up: &NeighborUp<'_>) -> Vec<u8> {
    let mut b = PacketBuilder::message();
    b.begin_message(MSG_NEIGHBOR_UP_REQ, seq).tlv_mac(&up.mac);
    if let Some(addr) = up.ipv4 {
        b.tlv_ipv4(AddressOp::Add, addr);
    }
    if let Some(addr) = up.ipv6 {
        b.tlv_ipv6(AddressOp::Add, addr);
    }
    b.tlv_metrics(up.metrics);
    if let Some(credits) = up.credits {
        b.tlv_credit_grant(credits.cgr).tlv_credit_window(credits.mrw, credits.rrw);
    }
    b.end_message();
    b.seal()
}

pub fn neighbor_up_response(seq: u16, mac: &MacAddress, status: u16) -> Vec<u8> {
    let mut b = PacketBuilder::message();
    b.begin_message(MSG_NEIGHBOR_UP_RES, seq).tlv_mac(mac).tlv_status(status).end_message();
    b.seal()
}

pub fn neighbor_metrics(
    seq: u16,
    mac: &MacAddress,
    metrics: &LinkMetrics,
    credits: Option<&CreditWindow>,
) -> Vec<u8> {
    let mut b = PacketBuilder::message();
    b.begin_message(MSG_NEIGHBOR_METRICS, seq).tlv_mac(mac).tlv_metrics(metrics);
    if let Some(credits) = credits {
        b.tlv_credit_window(credits.mrw, credits.rrw);
    }
    b.end_message();
    b.seal()
}

pub fn neighbor_address_request(
    seq: u16,
    mac: &MacAddress,
    ipv4: Option<(AddressOp, Ipv4Addr)>,
    ipv6: Option<(AddressOp, Ipv6Addr)>,
    ipv6_subnet: Option<(AddressOp, Ipv6Addr, u8)>,
) -> Vec<u8> {
    let mut b = PacketBuilder::message();
    b.begin_message(MSG_NEIGHBOR_ADDRESS_REQ, seq).tlv_mac(mac);
    if let Some((op, addr)) = ipv4 {
        b.tlv_ipv4(op, addr);
    }
    if let Some((op, addr)) = ipv6 {
        b.tlv_ipv6(op, addr);
    }
    if let Some((op, addr, prefix)) = ipv6_subnet {
        b.tlv_ipv6_subnet(op, addr, prefix);
    }
    b.end_message();
    b.seal()
}

pub fn neighbor_address_response(seq: u16, mac: &MacAddress, status: u16) -> Vec<u8> {
    let mut b = PacketBuilder::message();
    b.begin_message(MSG_NEIGHBOR_ADDRESS_RES, seq).tlv_mac(mac).tlv_status(status).end_message();
    b.seal()
}

pub fn neighbor_down_request(seq: u16, mac: &MacAddress, status: u16) -> Vec<u8> {
    let mut b = PacketBuilder::message();
    b.begin_message(MSG_NEIGHBOR_DOWN_REQ, seq).tlv_mac(mac).tlv_status(status).end_message();
    b.seal()
}

pub fn neighbor_down_response(seq: u16, mac: &MacAddress, status: u16) -> Vec<u8> {
    let mut b = PacketBuilder::message();
    b.begin_message(MSG_NEIGHBOR_DOWN_RES, seq).tlv_mac(mac).tlv_status(status).end_message();
    b.seal()
}

/// Router asks for characteristics the link should meet (CDR, latency).
pub fn link_char_request(
    seq: u16,
    mac: &MacAddress,
    cdr_tx: Option<u64>,
    latency_ms: Option<u64>,
) -> Vec<u8> {
    let mut b = PacketBuilder::message();
    b.begin_message(MSG_LINK_CHAR_REQ, seq).tlv_mac(mac);
    if let Some(cdr) = cdr_tx {
        b.tlv_u64(TLV_LINK_CDR_METRIC_TX, cdr);
    }
    if let Some(latency) = latency_ms {
        b.tlv_u64(TLV_LINK_LATENCY_METRIC, latency);
    }
    b.end_message();
    b.seal()
}

pub fn link_char_response(seq: u16, mac: &MacAddress, metrics: &LinkMetrics) -> Vec<u8> {
    let mut b = PacketBuilder::message();
    b.begin_message(MSG_LINK_CHAR_RES, seq).tlv_mac(mac).tlv_metrics(metrics).end_message();
    b.seal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_header_backpatch() {
        let frame = peer_heartbeat(9);
        assert_eq!(frame[0], 0); // message class
        assert_eq!(frame[1], PROTOCOL_VERSION);
        let payload = u16::from_be_bytes([frame[2], frame[3]]) as usize;
        assert_eq!(payload, frame.len() - PACKET_HEADER_LEN);
        // Heartbeat carries no TLVs.
        assert_eq!(payload, MESSAGE_HEADER_LEN);
    }

    #[test]
    fn test_message_header_fields() {
        let frame = peer_term_request(0x1234, STATUS_SUCCESS);
        let code = u16::from_be_bytes([frame[4], frame[5]]);
        let tlv_len = u16::from_be_bytes([frame[6], frame[7]]) as usize;
        let seq = u16::from_be_bytes([frame[8], frame[9]]);
        assert_eq!(code, MSG_PEER_TERM_REQ);
        assert_eq!(seq, 0x1234);
        assert_eq!(tlv_len, frame.len() - PACKET_HEADER_LEN - MESSAGE_HEADER_LEN);
    }

    #[test]
    fn test_signal_flag_set_on_discovery_class() {
        let frame = peer_offer(1, "radio", 5, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(frame[0] & PACKET_FLAG_SIGNAL, PACKET_FLAG_SIGNAL);
    }

    #[test]
    fn test_peer_type_truncated_to_wire_max() {
        let long = "x".repeat(200);
        let frame = peer_init_request(1, &long, 5);
        // TLV_PEER_TYPE value must be capped at PEER_TYPE_MAX_LEN.
        let mut off = PACKET_HEADER_LEN + MESSAGE_HEADER_LEN;
        let mut seen = None;
        while off + TLV_HEADER_LEN <= frame.len() {
            let t = u16::from_be_bytes([frame[off], frame[off + 1]]);
            let l = u16::from_be_bytes([frame[off + 2], frame[off + 3]]) as usize;
            if t == TLV_PEER_TYPE {
                seen = Some(l);
            }
            off += TLV_HEADER_LEN + l;
        }
        assert_eq!(seen, Some(PEER_TYPE_MAX_LEN));
    }
}
