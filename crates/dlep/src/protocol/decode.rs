// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound frame validation and scratch-pad population.
//!
//! Decoding is all-or-nothing per packet: any violation returns a specific
//! [`DecodeError`] and no pad escapes. Unknown-but-well-formed data items
//! are logged under the `DECODER` flag and skipped, unless their mandatory
//! bit is set.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::core::{AddressOp, MacAddress};
use crate::debug_flag;
use crate::error::DecodeError;
use crate::logging::DebugFlags;
use crate::protocol::constants::*;
use crate::protocol::scratch::{PadClass, ScratchPad};

/// A validated packet: the frame class plus one pad per contained message.
#[derive(Debug)]
pub struct DecodedPacket {
    pub class: PadClass,
    pub pads: Vec<ScratchPad>,
}

/// Decode and validate one packet.
pub fn decode_packet(bytes: &[u8], flags: DebugFlags) -> Result<DecodedPacket, DecodeError> {
    if bytes.len() < PACKET_HEADER_LEN {
        return Err(DecodeError::ShortPacket { need: PACKET_HEADER_LEN, have: bytes.len() });
    }

    let header_flags = bytes[0];
    let version = bytes[1];
    if version != PROTOCOL_VERSION {
        return Err(DecodeError::BadVersion { got: version });
    }

    let declared = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    let remaining = bytes.len() - PACKET_HEADER_LEN;
    if declared != remaining {
        return Err(DecodeError::ShortPacket {
            need: PACKET_HEADER_LEN + declared,
            have: bytes.len(),
        });
    }

    let class = if header_flags & PACKET_FLAG_SIGNAL != 0 {
        PadClass::Signal
    } else {
        PadClass::Message
    };

    let mut pads = Vec::with_capacity(1);
    let mut offset = PACKET_HEADER_LEN;
    while offset < bytes.len() {
        let (pad, consumed) = decode_message(&bytes[offset..], class, flags)?;
        pads.push(pad);
        offset += consumed;
    }

    if pads.is_empty() {
        return Err(DecodeError::ShortPacket {
            need: PACKET_HEADER_LEN + MESSAGE_HEADER_LEN,
            have: bytes.len(),
        });
    }

    Ok(DecodedPacket { class, pads })
}

fn decode_message(
    bytes: &[u8],
    class: PadClass,
    flags: DebugFlags,
) -> Result<(ScratchPad, usize), DecodeError> {
    if bytes.len() < MESSAGE_HEADER_LEN {
        return Err(DecodeError::ShortPacket { need: MESSAGE_HEADER_LEN, have: bytes.len() });
    }

    let code = u16::from_be_bytes([bytes[0], bytes[1]]);
    let tlv_len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    let sequence = u16::from_be_bytes([bytes[4], bytes[5]]);

    let body_end = MESSAGE_HEADER_LEN + tlv_len;
    if bytes.len() < body_end {
        return Err(DecodeError::ShortPacket { need: body_end, have: bytes.len() });
    }

    let mut pad = ScratchPad::new(class);
    pad.message_code = code;
    pad.sequence = sequence;
    pad.sequence_present = true;

    let mut offset = MESSAGE_HEADER_LEN;
    while offset < body_end {
        let remaining = body_end - offset;
        if remaining < TLV_HEADER_LEN {
            return Err(DecodeError::TlvOverrun {
                tlv_type: 0,
                declared: remaining as u16,
                remaining,
            });
        }

        let tlv_type = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
        let declared = u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]);
        let value_start = offset + TLV_HEADER_LEN;
        let value_remaining = body_end - value_start;
        if declared as usize > value_remaining {
            return Err(DecodeError::TlvOverrun {
                tlv_type,
                declared,
                remaining: value_remaining,
            });
        }

        let value = &bytes[value_start..value_start + declared as usize];
        apply_tlv(&mut pad, tlv_type, declared, value, flags)?;
        offset = value_start + declared as usize;
    }

    for &required in mandatory_tlvs(code, class == PadClass::Signal) {
        if !tlv_present(&pad, required) {
            return Err(DecodeError::MandatoryTlvMissing { message_code: code, tlv_type: required });
        }
    }

    Ok((pad, body_end))
}

fn check_len(tlv_type: u16, declared: u16) -> Result<(), DecodeError> {
    match tlv_fixed_len(tlv_type) {
        Some(want) if declared != want => {
            Err(DecodeError::BadTlvLength { tlv_type, got: declared, want })
        }
        _ => Ok(()),
    }
}

fn check_dup(present: bool, tlv_type: u16) -> Result<(), DecodeError> {
    if present {
        Err(DecodeError::DuplicateTlv { tlv_type })
    } else {
        Ok(())
    }
}

fn be_u32(v: &[u8]) -> u32 {
    u32::from_be_bytes([v[0], v[1], v[2], v[3]])
}

fn be_u64(v: &[u8]) -> u64 {
    u64::from_be_bytes([v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7]])
}

// Unknown operation bytes decode as None; the dispatcher treats that as
// "address transported, nothing to apply".
fn addr_op(v: u8) -> AddressOp {
    AddressOp::from_wire(v).unwrap_or(AddressOp::None)
}

fn apply_tlv(
    pad: &mut ScratchPad,
    tlv_type: u16,
    declared: u16,
    value: &[u8],
    flags: DebugFlags,
) -> Result<(), DecodeError> {
    check_len(tlv_type, declared)?;

    match tlv_type {
        TLV_VERSION => {
            check_dup(pad.version_present, tlv_type)?;
            pad.version_major = value[0];
            pad.version_minor = value[1];
            pad.version_present = true;
        }
        TLV_PEER_TYPE => {
            check_dup(pad.peer_type_present, tlv_type)?;
            if declared as usize > PEER_TYPE_MAX_LEN {
                return Err(DecodeError::BadTlvLength {
                    tlv_type,
                    got: declared,
                    want: PEER_TYPE_MAX_LEN as u16,
                });
            }
            pad.peer_type = String::from_utf8_lossy(value).into_owned();
            pad.peer_type_present = true;
        }
        TLV_HEARTBEAT_INTERVAL => {
            check_dup(pad.heartbeat_interval_present, tlv_type)?;
            pad.heartbeat_interval = be_u32(value);
            pad.heartbeat_interval_present = true;
        }
        TLV_STATUS => {
            check_dup(pad.status_present, tlv_type)?;
            pad.status_code = u16::from_be_bytes([value[0], value[1]]);
            pad.status_present = true;
        }
        TLV_MAC_ADDRESS => {
            check_dup(pad.mac_present, tlv_type)?;
            let mut octets = [0u8; 6];
            octets.copy_from_slice(value);
            pad.mac_address = MacAddress::new(octets);
            pad.mac_present = true;
        }
        TLV_IPV4_ADDRESS => {
            check_dup(pad.ipv4_present, tlv_type)?;
            pad.ipv4_operation = addr_op(value[0]);
            pad.ipv4_address = Ipv4Addr::new(value[1], value[2], value[3], value[4]);
            pad.ipv4_present = true;
        }
        TLV_IPV6_ADDRESS => {
            check_dup(pad.ipv6_present, tlv_type)?;
            pad.ipv6_operation = addr_op(value[0]);
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&value[1..17]);
            pad.ipv6_address = Ipv6Addr::from(octets);
            pad.ipv6_present = true;
        }
        TLV_IPV4_ATTACHED_SUBNET => {
            check_dup(pad.ipv4_subnet_present, tlv_type)?;
            pad.ipv4_subnet_operation = addr_op(value[0]);
            pad.ipv4_subnet = Ipv4Addr::new(value[1], value[2], value[3], value[4]);
            pad.ipv4_subnet_prefix = value[5];
            pad.ipv4_subnet_present = true;
        }
        TLV_IPV6_ATTACHED_SUBNET => {
            check_dup(pad.ipv6_subnet_present, tlv_type)?;
            pad.ipv6_subnet_operation = addr_op(value[0]);
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&value[1..17]);
            pad.ipv6_subnet = Ipv6Addr::from(octets);
            pad.ipv6_subnet_prefix = value[17];
            pad.ipv6_subnet_present = true;
        }
        TLV_LINK_MDR_METRIC_TX => {
            check_dup(pad.mdr_tx_present, tlv_type)?;
            pad.mdr_tx = be_u64(value);
            pad.mdr_tx_present = true;
        }
        TLV_LINK_MDR_METRIC_RX => {
            check_dup(pad.mdr_rx_present, tlv_type)?;
            pad.mdr_rx = be_u64(value);
            pad.mdr_rx_present = true;
        }
        TLV_LINK_CDR_METRIC_TX => {
            check_dup(pad.cdr_tx_present, tlv_type)?;
            pad.cdr_tx = be_u64(value);
            pad.cdr_tx_present = true;
        }
        TLV_LINK_CDR_METRIC_RX => {
            check_dup(pad.cdr_rx_present, tlv_type)?;
            pad.cdr_rx = be_u64(value);
            pad.cdr_rx_present = true;
        }
        TLV_LINK_LATENCY_METRIC => {
            check_dup(pad.latency_present, tlv_type)?;
            pad.latency = be_u64(value);
            pad.latency_present = true;
        }
        TLV_LINK_RESOURCES_METRIC_TX => {
            check_dup(pad.resources_tx_present, tlv_type)?;
            pad.resources_tx = value[0];
            pad.resources_tx_present = true;
        }
        TLV_LINK_RESOURCES_METRIC_RX => {
            check_dup(pad.resources_rx_present, tlv_type)?;
            pad.resources_rx = value[0];
            pad.resources_rx_present = true;
        }
        TLV_LINK_RLQ_METRIC_TX => {
            check_dup(pad.rlq_tx_present, tlv_type)?;
            pad.rlq_tx = value[0];
            pad.rlq_tx_present = true;
        }
        TLV_LINK_RLQ_METRIC_RX => {
            check_dup(pad.rlq_rx_present, tlv_type)?;
            pad.rlq_rx = value[0];
            pad.rlq_rx_present = true;
        }
        TLV_MTU => {
            check_dup(pad.mtu_present, tlv_type)?;
            pad.mtu = u16::from_be_bytes([value[0], value[1]]);
            pad.mtu_present = true;
        }
        TLV_CREDIT_GRANT => {
            check_dup(pad.credit_grant_present, tlv_type)?;
            pad.credit_grant = be_u64(value);
            pad.credit_grant_present = true;
        }
        TLV_CREDIT_REQUEST => {
            check_dup(pad.credit_request_present, tlv_type)?;
            pad.credit_request = be_u64(value);
            pad.credit_request_present = true;
        }
        TLV_CREDIT_WINDOW_STATUS => {
            check_dup(pad.credit_window_present, tlv_type)?;
            pad.credit_mrw = be_u64(&value[..8]);
            pad.credit_rrw = be_u64(&value[8..]);
            pad.credit_window_present = true;
        }
        TLV_VENDOR_EXTENSION => {
            // Opaque; negotiation payloads are advisory and skipped here.
            debug_flag!(
                flags,
                DECODER,
                "[CODEC] skipping vendor-extension, {} bytes",
                declared
            );
        }
        unknown => {
            if unknown & TLV_MANDATORY_BIT != 0 {
                return Err(DecodeError::UnknownMandatory { tlv_type: unknown });
            }
            debug_flag!(flags, DECODER, "[CODEC] skipping unknown tlv {}, {} bytes", unknown, declared);
        }
    }
    Ok(())
}

fn tlv_present(pad: &ScratchPad, tlv_type: u16) -> bool {
    match tlv_type {
        TLV_VERSION => pad.version_present,
        TLV_PEER_TYPE => pad.peer_type_present,
        TLV_HEARTBEAT_INTERVAL => pad.heartbeat_interval_present,
        TLV_STATUS => pad.status_present,
        TLV_MAC_ADDRESS => pad.mac_present,
        TLV_IPV4_ADDRESS => pad.ipv4_present,
        TLV_IPV6_ADDRESS => pad.ipv6_present,
        TLV_IPV4_ATTACHED_SUBNET => pad.ipv4_subnet_present,
        TLV_IPV6_ATTACHED_SUBNET => pad.ipv6_subnet_present,
        TLV_LINK_MDR_METRIC_TX => pad.mdr_tx_present,
        TLV_LINK_MDR_METRIC_RX => pad.mdr_rx_present,
        TLV_LINK_CDR_METRIC_TX => pad.cdr_tx_present,
        TLV_LINK_CDR_METRIC_RX => pad.cdr_rx_present,
        TLV_LINK_LATENCY_METRIC => pad.latency_present,
        TLV_LINK_RESOURCES_METRIC_TX => pad.resources_tx_present,
        TLV_LINK_RESOURCES_METRIC_RX => pad.resources_rx_present,
        TLV_LINK_RLQ_METRIC_TX => pad.rlq_tx_present,
        TLV_LINK_RLQ_METRIC_RX => pad.rlq_rx_present,
        TLV_MTU => pad.mtu_present,
        TLV_CREDIT_GRANT => pad.credit_grant_present,
        TLV_CREDIT_REQUEST => pad.credit_request_present,
        TLV_CREDIT_WINDOW_STATUS => pad.credit_window_present,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::builder;
    use crate::protocol::LinkMetrics;

    fn decode_one(frame: &[u8]) -> ScratchPad {
        let packet = decode_packet(frame, DebugFlags::default()).expect("decode");
        assert_eq!(packet.pads.len(), 1);
        packet.pads.into_iter().next().unwrap()
    }

    #[test]
    fn test_rejects_bad_version() {
        let mut frame = builder::peer_heartbeat(1);
        frame[1] = 99;
        let err = decode_packet(&frame, DebugFlags::default()).unwrap_err();
        assert_eq!(err, DecodeError::BadVersion { got: 99 });
    }

    #[test]
    fn test_rejects_truncated_packet() {
        let frame = builder::peer_heartbeat(1);
        let err = decode_packet(&frame[..3], DebugFlags::default()).unwrap_err();
        assert!(matches!(err, DecodeError::ShortPacket { .. }));

        // Declared length larger than what arrived.
        let mut frame = builder::peer_heartbeat(1);
        frame[3] += 4;
        let err = decode_packet(&frame, DebugFlags::default()).unwrap_err();
        assert!(matches!(err, DecodeError::ShortPacket { .. }));
    }

    #[test]
    fn test_rejects_tlv_overrun() {
        // Heartbeat with a status TLV whose length claims more bytes than
        // the message holds.
        let mut b = builder::PacketBuilder::message();
        b.begin_message(MSG_PEER_HEARTBEAT, 5).tlv_status(0).end_message();
        let mut frame = b.seal();
        // Inflate the TLV length field (offset: 4 pkt + 6 msg + 2 type).
        let off = PACKET_HEADER_LEN + MESSAGE_HEADER_LEN + 2;
        frame[off..off + 2].copy_from_slice(&40u16.to_be_bytes());

        let err = decode_packet(&frame, DebugFlags::default()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TlvOverrun { tlv_type: TLV_STATUS, declared: 40, remaining: 2 }
        );
    }

    #[test]
    fn test_rejects_duplicate_tlv() {
        let mut b = builder::PacketBuilder::message();
        b.begin_message(MSG_PEER_TERM_REQ, 5).tlv_status(0).tlv_status(1).end_message();
        let frame = b.seal();
        let err = decode_packet(&frame, DebugFlags::default()).unwrap_err();
        assert_eq!(err, DecodeError::DuplicateTlv { tlv_type: TLV_STATUS });
    }

    #[test]
    fn test_rejects_bad_tlv_length() {
        let mut b = builder::PacketBuilder::message();
        b.begin_message(MSG_PEER_HEARTBEAT, 5).tlv_u8(TLV_STATUS, 1).end_message();
        let frame = b.seal();
        let err = decode_packet(&frame, DebugFlags::default()).unwrap_err();
        assert_eq!(err, DecodeError::BadTlvLength { tlv_type: TLV_STATUS, got: 1, want: 2 });
    }

    #[test]
    fn test_rejects_missing_mandatory() {
        let mut b = builder::PacketBuilder::message();
        b.begin_message(MSG_NEIGHBOR_UP_RES, 5).tlv_status(0).end_message();
        let frame = b.seal();
        let err = decode_packet(&frame, DebugFlags::default()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::MandatoryTlvMissing {
                message_code: MSG_NEIGHBOR_UP_RES,
                tlv_type: TLV_MAC_ADDRESS
            }
        );
    }

    #[test]
    fn test_unknown_tlv_skipped_unless_mandatory_bit() {
        let mut b = builder::PacketBuilder::message();
        b.begin_message(MSG_PEER_HEARTBEAT, 5).tlv_u8(500, 1).end_message();
        let frame = b.seal();
        assert!(decode_packet(&frame, DebugFlags::default()).is_ok());

        let mut b = builder::PacketBuilder::message();
        b.begin_message(MSG_PEER_HEARTBEAT, 5)
            .tlv_u8(500 | TLV_MANDATORY_BIT, 1)
            .end_message();
        let frame = b.seal();
        let err = decode_packet(&frame, DebugFlags::default()).unwrap_err();
        assert_eq!(err, DecodeError::UnknownMandatory { tlv_type: 500 | TLV_MANDATORY_BIT });
    }

    #[test]
    fn test_neighbor_up_roundtrip() {
        let metrics = LinkMetrics {
            rlq_tx: 100,
            rlq_rx: 90,
            resources_tx: 80,
            resources_rx: 70,
            latency_ms: 250,
            cdr_tx: 11_000_000,
            cdr_rx: 12_000_000,
            mdr_tx: 110_000_000,
            mdr_rx: 120_000_000,
            mtu: 1500,
        };
        let mac = MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]);
        let frame = builder::neighbor_up_request(
            42,
            &builder::NeighborUp {
                mac,
                metrics: &metrics,
                ipv4: Some(Ipv4Addr::new(192, 168, 1, 7)),
                ipv6: None,
                credits: None,
            },
        );

        let pad = decode_one(&frame);
        assert_eq!(pad.class, PadClass::Message);
        assert_eq!(pad.message_code, MSG_NEIGHBOR_UP_REQ);
        assert_eq!(pad.sequence, 42);
        assert!(pad.sequence_present);
        assert!(pad.mac_present);
        assert_eq!(pad.mac_address, mac);
        assert!(pad.ipv4_present);
        assert_eq!(pad.ipv4_address, Ipv4Addr::new(192, 168, 1, 7));
        assert_eq!(pad.ipv4_operation, AddressOp::Add);
        assert!(!pad.ipv6_present);
        assert_eq!(pad.mdr_tx, 110_000_000);
        assert_eq!(pad.mdr_rx, 120_000_000);
        assert_eq!(pad.cdr_tx, 11_000_000);
        assert_eq!(pad.cdr_rx, 12_000_000);
        assert_eq!(pad.latency, 250);
        assert_eq!(pad.rlq_tx, 100);
        assert_eq!(pad.rlq_rx, 90);
        assert_eq!(pad.resources_tx, 80);
        assert_eq!(pad.resources_rx, 70);
        assert_eq!(pad.mtu, 1500);
        assert!(pad.mtu_present);
    }

    #[test]
    fn test_offer_roundtrip_signal_class() {
        let frame = builder::peer_offer(7, "mobile-radio", 5, Ipv4Addr::new(10, 0, 0, 2));
        let packet = decode_packet(&frame, DebugFlags::default()).expect("decode");
        assert_eq!(packet.class, PadClass::Signal);
        let pad = &packet.pads[0];
        assert_eq!(pad.message_code, SIG_PEER_OFFER);
        assert_eq!(pad.peer_type, "mobile-radio");
        assert_eq!(pad.heartbeat_interval, 5);
        assert!(pad.version_present);
        assert_eq!(pad.version_major, PROTOCOL_VERSION);
    }

    #[test]
    fn test_init_response_roundtrip_with_bitmaps() {
        let frame =
            builder::peer_init_response(3, "router", 2, STATUS_SUCCESS, 0xffff, 0x00ff);
        let pad = decode_one(&frame);
        assert_eq!(pad.message_code, MSG_PEER_INIT_RES);
        assert!(pad.status_present);
        assert_eq!(pad.status_code, STATUS_SUCCESS);
        // Vendor extension is advisory; it must not pollute the pad.
        assert!(!pad.credit_grant_present);
    }

    #[test]
    fn test_random_garbage_never_panics() {
        fastrand::seed(0x5444);
        for _ in 0..2_000 {
            let len = fastrand::usize(..96);
            let bytes: Vec<u8> = (0..len).map(|_| fastrand::u8(..)).collect();
            // Rejection is fine; panicking is not.
            let _ = decode_packet(&bytes, DebugFlags::default());
        }
    }

    #[test]
    fn test_truncated_valid_frames_never_panic() {
        let frame = builder::peer_init_request(9, "router", 5);
        for cut in 0..frame.len() {
            let _ = decode_packet(&frame[..cut], DebugFlags::default());
        }
    }

    #[test]
    fn test_two_messages_one_packet() {
        let mut b = builder::PacketBuilder::message();
        b.begin_message(MSG_PEER_HEARTBEAT, 10).end_message();
        b.begin_message(MSG_PEER_TERM_REQ, 11).tlv_status(STATUS_SUCCESS).end_message();
        let frame = b.seal();

        let packet = decode_packet(&frame, DebugFlags::default()).expect("decode");
        assert_eq!(packet.pads.len(), 2);
        assert_eq!(packet.pads[0].message_code, MSG_PEER_HEARTBEAT);
        assert_eq!(packet.pads[0].sequence, 10);
        assert_eq!(packet.pads[1].message_code, MSG_PEER_TERM_REQ);
        assert_eq!(packet.pads[1].sequence, 11);
    }
}
