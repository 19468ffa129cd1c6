// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Decoded-message dispatch: map a scratch pad onto a peer or neighbor
//! FSM event.
//!
//! Neighbor-scoped messages resolve the neighbor by the pad's MAC. For an
//! unknown MAC, metric acks and address responses are silently dropped
//! (stale races after a local down), request-class messages are answered
//! with an invalid-destination status, and other responses are only
//! logged and counted. Unknown or role-invalid message codes set the
//! status code and start peer termination.

use crate::debug_flag;
use crate::neighbor::{fsm as neighbor_fsm, NeighborEvent};
use crate::peer::{fsm as peer_fsm, Peer, PeerEvent};
use crate::protocol::builder::PacketBuilder;
use crate::protocol::constants::*;
use crate::protocol::{PadClass, ScratchPad};

use super::node::Services;

/// Dispatch one decoded pad. The caller scrubs the pad afterwards.
pub fn dispatch(services: &mut Services, peer: &mut Peer, pad: &ScratchPad) {
    peer.status_code = STATUS_SUCCESS;
    pad.show(services.flags);

    if pad.class == PadClass::Signal {
        dispatch_signal(services, peer, pad);
    } else {
        dispatch_message(services, peer, pad);
    }
}

fn dispatch_signal(services: &mut Services, peer: &mut Peer, pad: &ScratchPad) {
    match pad.message_code {
        SIG_PEER_ATTACHED_DISCOVERY => {
            peer_fsm::engine(services, peer, PeerEvent::AttachedDiscovery, Some(pad));
        }
        SIG_PEER_DETACHED_DISCOVERY => {
            peer_fsm::engine(services, peer, PeerEvent::DetachedDiscovery, Some(pad));
        }
        SIG_PEER_OFFER => {
            peer_fsm::engine(services, peer, PeerEvent::OfferReceived, Some(pad));
        }
        unknown => {
            // Unknown signals are logged and ignored, not fatal.
            debug_flag!(services.flags, ERROR, "[UDP] unknown signal code {}", unknown);
        }
    }
}

fn dispatch_message(services: &mut Services, peer: &mut Peer, pad: &ScratchPad) {
    match pad.message_code {
        MSG_PEER_INIT_REQ => peer_fsm::engine(services, peer, PeerEvent::InitRequest, Some(pad)),
        MSG_PEER_HEARTBEAT => peer_fsm::engine(services, peer, PeerEvent::Heartbeat, Some(pad)),
        MSG_PEER_UPDATE_REQ => {
            peer_fsm::engine(services, peer, PeerEvent::UpdateRequest, Some(pad));
        }
        MSG_PEER_UPDATE_RES => {
            peer_fsm::engine(services, peer, PeerEvent::UpdateResponse, Some(pad));
        }
        MSG_PEER_TERM_REQ => peer_fsm::engine(services, peer, PeerEvent::TermRequest, Some(pad)),
        MSG_PEER_TERM_RES => peer_fsm::engine(services, peer, PeerEvent::TermResponse, Some(pad)),

        MSG_NEIGHBOR_UP_RES => {
            neighbor_scoped(services, peer, pad, NeighborEvent::InitAck, UnknownMac::LogOnly);
        }
        MSG_NEIGHBOR_METRICS => {
            neighbor_scoped(services, peer, pad, NeighborEvent::UpdateAck, UnknownMac::Drop);
        }
        MSG_NEIGHBOR_ADDRESS_RES => {
            neighbor_scoped(services, peer, pad, NeighborEvent::AddressResponse, UnknownMac::Drop);
        }
        MSG_NEIGHBOR_DOWN_REQ => {
            neighbor_scoped(
                services,
                peer,
                pad,
                NeighborEvent::TermRequest,
                UnknownMac::Reply(MSG_NEIGHBOR_DOWN_RES),
            );
        }
        MSG_NEIGHBOR_DOWN_RES => {
            neighbor_scoped(services, peer, pad, NeighborEvent::TermAck, UnknownMac::LogOnly);
        }
        MSG_LINK_CHAR_REQ => {
            neighbor_scoped(
                services,
                peer,
                pad,
                NeighborEvent::LinkCharRequest,
                UnknownMac::Reply(MSG_LINK_CHAR_RES),
            );
        }

        // Recognized, but the radio role never receives these.
        MSG_PEER_INIT_RES | MSG_NEIGHBOR_UP_REQ | MSG_NEIGHBOR_ADDRESS_REQ | MSG_LINK_CHAR_RES => {
            services.counters.unexpected_message += 1;
            debug_flag!(
                services.flags,
                ERROR,
                "[PEER] peer_id={} {} not valid for the radio role, terminating",
                peer.peer_id,
                code_name(pad.message_code, false)
            );
            peer.status_code = STATUS_UNEXPECTED_MESSAGE;
            peer_fsm::engine(services, peer, PeerEvent::StartTermination, Some(pad));
        }

        unknown => {
            services.counters.unknown_message += 1;
            debug_flag!(
                services.flags,
                ERROR,
                "[PEER] peer_id={} unknown message code {}, terminating",
                peer.peer_id,
                unknown
            );
            peer.status_code = STATUS_UNKNOWN_MESSAGE;
            peer_fsm::engine(services, peer, PeerEvent::StartTermination, Some(pad));
        }
    }
}

/// What to do when a neighbor-scoped message names a MAC we do not have.
enum UnknownMac {
    /// Stale race, e.g. metrics ack after a local down. Say nothing.
    Drop,
    /// Response-class message; nothing sensible to reply with.
    LogOnly,
    /// Request-class message; answer with invalid-destination.
    Reply(u16),
}

fn neighbor_scoped(
    services: &mut Services,
    peer: &mut Peer,
    pad: &ScratchPad,
    event: NeighborEvent,
    on_unknown: UnknownMac,
) {
    let mac = pad.mac_address;
    let known = match peer.neighbor_by_mac(&mac) {
        Some(neighbor) => {
            // Any message for a known neighbor counts as activity.
            neighbor.activity_flag = true;
            true
        }
        None => false,
    };
    if known {
        neighbor_fsm::engine(services, peer, mac, event, Some(pad));
        return;
    }

    services.counters.unknown_neighbor_mac += 1;
    debug_flag!(
        services.flags,
        ERROR,
        "[PEER] peer_id={} {} for unknown neighbor {}",
        peer.peer_id,
        code_name(pad.message_code, false),
        mac
    );

    match on_unknown {
        UnknownMac::Drop | UnknownMac::LogOnly => {}
        UnknownMac::Reply(response_code) => {
            let mut b = PacketBuilder::message();
            b.begin_message(response_code, pad.sequence)
                .tlv_mac(&mac)
                .tlv_status(STATUS_INVALID_DESTINATION)
                .end_message();
            let frame = b.seal();
            services.send_message(&frame);
        }
    }
}
