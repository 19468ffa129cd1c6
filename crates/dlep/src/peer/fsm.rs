// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer lifecycle state machine:
//! discovery -> initialization -> in-session -> terminating -> reset.
//!
//! The transition relation lives in [`TABLE`] so tests can assert against
//! it directly. Actions whose outcome depends on a runtime counter
//! (retransmit-or-give-up) return a state override instead of the row's
//! declared next state. The node reaps a peer once it reaches `Reset`.

use crate::core::fsm::{lookup, Row, Step};
use crate::debug_flag;
use crate::engine::node::{Services, TimerEvent};
use crate::peer::context::{Peer, PeerState};
use crate::protocol::builder;
use crate::protocol::constants::*;
use crate::protocol::ScratchPad;

/// Normalized peer events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    // Signals
    AttachedDiscovery,
    DetachedDiscovery,
    OfferReceived,
    // Session messages
    InitRequest,
    Heartbeat,
    UpdateRequest,
    UpdateResponse,
    TermRequest,
    TermResponse,
    // Session transport
    SessionOpen,
    SessionClosed,
    // Timers and internal triggers
    OfferIntervalExpiry,
    HeartbeatSendExpiry,
    HeartbeatWindowExpiry,
    TermAckExpiry,
    UpdateAddrRequest,
    StartTermination,
}

impl PeerEvent {
    /// Events that arrive from the router; an unhandled one is a protocol
    /// violation, while unhandled internal events are late fires.
    fn from_router(self) -> bool {
        matches!(
            self,
            PeerEvent::InitRequest
                | PeerEvent::Heartbeat
                | PeerEvent::UpdateRequest
                | PeerEvent::UpdateResponse
                | PeerEvent::TermRequest
                | PeerEvent::TermResponse
        )
    }
}

/// Named actions, one per table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerAction {
    SendOffer,
    NoteMisconfiguredOffer,
    EnterInitialization,
    InitResponse,
    HeartbeatReceived,
    SendHeartbeat,
    HeartbeatWindow,
    ReplyUpdateResponse,
    MatchUpdateResponse,
    SendUpdateRequest,
    ReplyTermResponse,
    MatchTermAck,
    RetransmitTermRequest,
    BeginTermination,
    SessionTeardown,
    Ignore,
}

use self::PeerAction as A;
use self::PeerEvent as E;
use crate::peer::context::PeerState as S;

/// The peer transition relation.
pub static TABLE: &[Row<PeerState, PeerEvent, PeerAction>] = &[
    // Discovery: offer on every router discovery until the session opens.
    Row { state: S::Discovery, event: E::AttachedDiscovery, action: A::SendOffer, next: S::Discovery },
    Row { state: S::Discovery, event: E::DetachedDiscovery, action: A::SendOffer, next: S::Discovery },
    Row { state: S::Discovery, event: E::OfferReceived, action: A::NoteMisconfiguredOffer, next: S::Discovery },
    Row { state: S::Discovery, event: E::OfferIntervalExpiry, action: A::SendOffer, next: S::Discovery },
    Row { state: S::Discovery, event: E::SessionOpen, action: A::EnterInitialization, next: S::Initialization },
    Row { state: S::Discovery, event: E::InitRequest, action: A::InitResponse, next: S::InSession },

    // Initialization: the router opened TCP, waiting for its init-request.
    Row { state: S::Initialization, event: E::InitRequest, action: A::InitResponse, next: S::InSession },
    Row { state: S::Initialization, event: E::OfferIntervalExpiry, action: A::Ignore, next: S::Initialization },
    Row { state: S::Initialization, event: E::AttachedDiscovery, action: A::Ignore, next: S::Initialization },
    Row { state: S::Initialization, event: E::DetachedDiscovery, action: A::Ignore, next: S::Initialization },
    Row { state: S::Initialization, event: E::SessionClosed, action: A::SessionTeardown, next: S::Reset },

    // In-session: steady state.
    Row { state: S::InSession, event: E::Heartbeat, action: A::HeartbeatReceived, next: S::InSession },
    Row { state: S::InSession, event: E::HeartbeatSendExpiry, action: A::SendHeartbeat, next: S::InSession },
    Row { state: S::InSession, event: E::HeartbeatWindowExpiry, action: A::HeartbeatWindow, next: S::InSession },
    Row { state: S::InSession, event: E::UpdateRequest, action: A::ReplyUpdateResponse, next: S::InSession },
    Row { state: S::InSession, event: E::UpdateResponse, action: A::MatchUpdateResponse, next: S::InSession },
    Row { state: S::InSession, event: E::UpdateAddrRequest, action: A::SendUpdateRequest, next: S::InSession },
    Row { state: S::InSession, event: E::TermRequest, action: A::ReplyTermResponse, next: S::Reset },
    Row { state: S::InSession, event: E::StartTermination, action: A::BeginTermination, next: S::Terminating },
    Row { state: S::InSession, event: E::SessionClosed, action: A::SessionTeardown, next: S::Reset },
    Row { state: S::InSession, event: E::AttachedDiscovery, action: A::Ignore, next: S::InSession },
    Row { state: S::InSession, event: E::DetachedDiscovery, action: A::Ignore, next: S::InSession },
    Row { state: S::InSession, event: E::OfferIntervalExpiry, action: A::Ignore, next: S::InSession },

    // Terminating: waiting for the term-ack, retransmitting with threshold.
    Row { state: S::Terminating, event: E::TermResponse, action: A::MatchTermAck, next: S::Reset },
    Row { state: S::Terminating, event: E::TermAckExpiry, action: A::RetransmitTermRequest, next: S::Terminating },
    Row { state: S::Terminating, event: E::TermRequest, action: A::ReplyTermResponse, next: S::Reset },
    Row { state: S::Terminating, event: E::Heartbeat, action: A::Ignore, next: S::Terminating },
    Row { state: S::Terminating, event: E::HeartbeatSendExpiry, action: A::Ignore, next: S::Terminating },
    Row { state: S::Terminating, event: E::HeartbeatWindowExpiry, action: A::Ignore, next: S::Terminating },
    Row { state: S::Terminating, event: E::UpdateRequest, action: A::Ignore, next: S::Terminating },
    Row { state: S::Terminating, event: E::UpdateResponse, action: A::Ignore, next: S::Terminating },
    Row { state: S::Terminating, event: E::InitRequest, action: A::Ignore, next: S::Terminating },
    Row { state: S::Terminating, event: E::StartTermination, action: A::Ignore, next: S::Terminating },
    Row { state: S::Terminating, event: E::SessionClosed, action: A::SessionTeardown, next: S::Reset },
];

/// Drive the peer FSM with one event.
pub fn engine(services: &mut Services, peer: &mut Peer, event: PeerEvent, pad: Option<&ScratchPad>) {
    let state = peer.state;
    let Some(row) = lookup(TABLE, state, event) else {
        on_miss(services, peer, event);
        return;
    };

    let step = apply(row.action, services, peer, pad);
    let next = match step {
        Step::Advance => row.next,
        Step::Override(next) => next,
        // Peers are reaped by the node once they reach Reset.
        Step::Destroy => PeerState::Reset,
    };
    if next != state {
        debug_flag!(
            services.flags,
            PEER,
            "[PEER] peer_id={} {} -> {} on {:?}",
            peer.peer_id,
            state.name(),
            next.name(),
            event
        );
        peer.state = next;
    }
}

/// A `(state, event)` pair outside the table. Router messages terminate
/// the association; internal events are late fires and only logged.
fn on_miss(services: &mut Services, peer: &mut Peer, event: PeerEvent) {
    if event.from_router() && peer.state != PeerState::Reset {
        services.counters.unexpected_message += 1;
        debug_flag!(
            services.flags,
            ERROR,
            "[PEER] peer_id={} unexpected {:?} in {}, terminating",
            peer.peer_id,
            event,
            peer.state.name()
        );
        peer.status_code = STATUS_UNEXPECTED_MESSAGE;
        if peer.state != PeerState::Terminating {
            begin_termination(services, peer);
            peer.state = PeerState::Terminating;
        }
    } else {
        debug_flag!(
            services.flags,
            PEER,
            "[PEER] peer_id={} ignoring {:?} in {}",
            peer.peer_id,
            event,
            peer.state.name()
        );
    }
}

fn apply(
    action: PeerAction,
    services: &mut Services,
    peer: &mut Peer,
    pad: Option<&ScratchPad>,
) -> Step<PeerState> {
    match action {
        A::SendOffer => send_offer(services, peer),
        A::NoteMisconfiguredOffer => {
            debug_flag!(
                services.flags,
                ERROR,
                "[PEER] peer_id={} received a peer-offer; two radios on one segment?",
                peer.peer_id
            );
            Step::Advance
        }
        A::EnterInitialization => {
            services.wheel.stop(&mut peer.peer_offer_tmr);
            Step::Advance
        }
        A::InitResponse => init_response(services, peer, pad),
        A::HeartbeatReceived => {
            peer.heartbeat_received_flag = true;
            peer.heartbeat_missed_count = 0;
            Step::Advance
        }
        A::SendHeartbeat => {
            let seq = peer.next_sequence();
            let frame = builder::peer_heartbeat(seq);
            services.send_message(&frame);
            Step::Advance
        }
        A::HeartbeatWindow => heartbeat_window(services, peer),
        A::ReplyUpdateResponse => reply_update_response(services, peer, pad),
        A::MatchUpdateResponse => match_update_response(services, peer, pad),
        A::SendUpdateRequest => send_update_request(services, peer),
        A::ReplyTermResponse => reply_term_response(services, peer, pad),
        A::MatchTermAck => match_term_ack(services, peer, pad),
        A::RetransmitTermRequest => retransmit_term_request(services, peer),
        A::BeginTermination => {
            begin_termination(services, peer);
            Step::Advance
        }
        A::SessionTeardown => {
            // Timers die here; the node closes the socket and reaps.
            services.wheel.stop(&mut peer.peer_offer_tmr);
            services.wheel.stop(&mut peer.heartbeat_send_tmr);
            services.wheel.stop(&mut peer.heartbeat_window_tmr);
            services.wheel.stop(&mut peer.peer_term_ack_tmr);
            Step::Advance
        }
        A::Ignore => Step::Advance,
    }
}

// ============================================================================
// Action bodies
// ============================================================================

fn send_offer(services: &mut Services, peer: &mut Peer) -> Step<PeerState> {
    let seq = peer.next_sequence();
    peer.expected_peer_offer_sequence = seq;
    let frame = builder::peer_offer(
        seq,
        &services.cfg.type_description,
        peer.timers.peer_heartbeat_interval,
        services.cfg.local_ipv4,
    );
    services.send_signal(peer.udp_endpoint, &frame);

    if !services.wheel.is_running(&peer.peer_offer_tmr) {
        let event = TimerEvent::PeerOffer { peer_id: peer.peer_id };
        services.wheel.start(
            &mut peer.peer_offer_tmr,
            u64::from(peer.timers.peer_offer_interval) * 1_000,
            true,
            event,
        );
    }
    Step::Advance
}

fn init_response(services: &mut Services, peer: &mut Peer, pad: Option<&ScratchPad>) -> Step<PeerState> {
    let Some(pad) = pad else { return Step::Override(peer.state) };

    // Adopt the router's declared identity and heartbeat cadence for the
    // send direction; our own interval governs the receive window.
    peer.peer_type_description = pad.peer_type.clone();
    peer.heartbeat_send_interval =
        pad.heartbeat_interval.min(crate::config::PEER_HEARTBEAT_INTERVAL_MAX);

    let frame = builder::peer_init_response(
        pad.sequence,
        &services.cfg.type_description,
        peer.timers.peer_heartbeat_interval,
        STATUS_SUCCESS,
        peer.optional_signal,
        peer.optional_data_item,
    );
    services.send_message(&frame);

    services.wheel.stop(&mut peer.peer_offer_tmr);
    peer.heartbeat_missed_count = 0;
    peer.heartbeat_received_flag = false;

    if peer.heartbeat_send_interval > 0 {
        let interval_ms = u64::from(peer.heartbeat_send_interval) * 1_000;
        let send = TimerEvent::PeerHeartbeatSend { peer_id: peer.peer_id };
        services.wheel.start(&mut peer.heartbeat_send_tmr, interval_ms, true, send);
        let window = TimerEvent::PeerHeartbeatWindow { peer_id: peer.peer_id };
        services.wheel.start(&mut peer.heartbeat_window_tmr, interval_ms, true, window);
    }
    Step::Advance
}

fn heartbeat_window(services: &mut Services, peer: &mut Peer) -> Step<PeerState> {
    if peer.heartbeat_received_flag {
        peer.heartbeat_received_flag = false;
        peer.heartbeat_missed_count = 0;
        return Step::Advance;
    }

    peer.heartbeat_missed_count += 1;
    services.counters.heartbeats_missed += 1;
    debug_flag!(
        services.flags,
        PEER,
        "[PEER] peer_id={} heartbeat-missed count={}",
        peer.peer_id,
        peer.heartbeat_missed_count
    );

    if peer.heartbeat_missed_count >= peer.timers.peer_heartbeat_missed_threshold {
        log::warn!(
            "[PEER] peer_id={} heartbeat-missed count={} reached threshold, terminating",
            peer.peer_id,
            peer.heartbeat_missed_count
        );
        peer.status_code = STATUS_TIMED_OUT;
        begin_termination(services, peer);
        return Step::Override(PeerState::Terminating);
    }
    Step::Advance
}

fn reply_update_response(
    services: &mut Services,
    peer: &mut Peer,
    pad: Option<&ScratchPad>,
) -> Step<PeerState> {
    let Some(pad) = pad else { return Step::Override(peer.state) };
    if pad.ipv4_present {
        // Addresses are transported, not acted on.
        debug_flag!(
            services.flags,
            PEER,
            "[PEER] peer_id={} router {} ipv4 {}",
            peer.peer_id,
            pad.ipv4_operation,
            pad.ipv4_address
        );
    }
    if pad.ipv6_present {
        debug_flag!(
            services.flags,
            PEER,
            "[PEER] peer_id={} router {} ipv6 {}",
            peer.peer_id,
            pad.ipv6_operation,
            pad.ipv6_address
        );
    }
    let frame = builder::peer_update_response(pad.sequence, STATUS_SUCCESS);
    services.send_message(&frame);
    Step::Advance
}

fn match_update_response(
    services: &mut Services,
    peer: &mut Peer,
    pad: Option<&ScratchPad>,
) -> Step<PeerState> {
    let Some(pad) = pad else { return Step::Override(peer.state) };
    let expected = peer.expected_peer_update_response_sequence;
    if expected != 0 && pad.sequence == expected {
        peer.expected_peer_update_response_sequence = 0;
        // The staged peer address change is now acknowledged.
        peer.update_ipv4_operation = crate::core::AddressOp::None;
        peer.update_ipv6_operation = crate::core::AddressOp::None;
        if pad.status_present && pad.status_code != STATUS_SUCCESS {
            debug_flag!(
                services.flags,
                ERROR,
                "[PEER] peer_id={} update rejected, status={}",
                peer.peer_id,
                pad.status_code
            );
        }
    } else {
        services.counters.sequence_mismatch += 1;
        debug_flag!(
            services.flags,
            ERROR,
            "[PEER] peer_id={} update-response seq={} expected={}",
            peer.peer_id,
            pad.sequence,
            expected
        );
    }
    Step::Advance
}

fn send_update_request(services: &mut Services, peer: &mut Peer) -> Step<PeerState> {
    let ipv4 = (peer.update_ipv4_operation != crate::core::AddressOp::None)
        .then_some((peer.update_ipv4_operation, peer.update_ipv4_address));
    let ipv6 = (peer.update_ipv6_operation != crate::core::AddressOp::None)
        .then_some((peer.update_ipv6_operation, peer.update_ipv6_address));
    if ipv4.is_none() && ipv6.is_none() {
        return Step::Advance;
    }

    let seq = peer.next_sequence();
    peer.expected_peer_update_response_sequence = seq;
    let frame = builder::peer_update_request(seq, ipv4, ipv6);
    services.send_message(&frame);
    Step::Advance
}

fn reply_term_response(
    services: &mut Services,
    peer: &mut Peer,
    pad: Option<&ScratchPad>,
) -> Step<PeerState> {
    let Some(pad) = pad else { return Step::Override(peer.state) };
    if pad.status_present {
        peer.status_code = pad.status_code;
    }
    let frame = builder::peer_term_response(pad.sequence, STATUS_SUCCESS);
    services.send_message(&frame);

    services.wheel.stop(&mut peer.peer_offer_tmr);
    services.wheel.stop(&mut peer.heartbeat_send_tmr);
    services.wheel.stop(&mut peer.heartbeat_window_tmr);
    services.wheel.stop(&mut peer.peer_term_ack_tmr);
    Step::Advance
}

fn match_term_ack(services: &mut Services, peer: &mut Peer, pad: Option<&ScratchPad>) -> Step<PeerState> {
    let Some(pad) = pad else { return Step::Override(peer.state) };
    let expected = peer.expected_peer_term_ack_sequence;
    if expected != 0 && pad.sequence == expected {
        services.wheel.stop(&mut peer.peer_term_ack_tmr);
        peer.expected_peer_term_ack_sequence = 0;
        peer.peer_term_ack_timeout_count = 0;
        Step::Advance
    } else {
        services.counters.sequence_mismatch += 1;
        debug_flag!(
            services.flags,
            ERROR,
            "[PEER] peer_id={} term-response seq={} expected={}",
            peer.peer_id,
            pad.sequence,
            expected
        );
        Step::Override(PeerState::Terminating)
    }
}

fn retransmit_term_request(services: &mut Services, peer: &mut Peer) -> Step<PeerState> {
    // Late fire after the ack already landed.
    if peer.expected_peer_term_ack_sequence == 0 {
        return Step::Advance;
    }

    peer.peer_term_ack_timeout_count += 1;
    services.counters.term_ack_timeouts += 1;
    if peer.peer_term_ack_timeout_count >= peer.timers.peer_term_missed_ack_threshold {
        log::warn!(
            "[PEER] peer_id={} term-ack missed {} times, forcing reset",
            peer.peer_id,
            peer.peer_term_ack_timeout_count
        );
        peer.expected_peer_term_ack_sequence = 0;
        return Step::Override(PeerState::Reset);
    }

    let seq = peer.next_sequence();
    peer.expected_peer_term_ack_sequence = seq;
    let frame = builder::peer_term_request(seq, peer.status_code);
    services.send_message(&frame);
    let event = TimerEvent::PeerTermAck { peer_id: peer.peer_id };
    services.wheel.start(
        &mut peer.peer_term_ack_tmr,
        u64::from(peer.timers.peer_term_ack_tmo),
        false,
        event,
    );
    Step::Advance
}

/// Shared by the in-session row, the unexpected-message path and the
/// heartbeat window: emit a term-request and arm its ack supervision.
pub(crate) fn begin_termination(services: &mut Services, peer: &mut Peer) {
    services.wheel.stop(&mut peer.peer_offer_tmr);
    services.wheel.stop(&mut peer.heartbeat_send_tmr);
    services.wheel.stop(&mut peer.heartbeat_window_tmr);

    let seq = peer.next_sequence();
    peer.expected_peer_term_ack_sequence = seq;
    peer.peer_term_ack_timeout_count = 0;
    let frame = builder::peer_term_request(seq, peer.status_code);
    services.send_message(&frame);

    let event = TimerEvent::PeerTermAck { peer_id: peer.peer_id };
    services.wheel.start(
        &mut peer.peer_term_ack_tmr,
        u64::from(peer.timers.peer_term_ack_tmo),
        false,
        event,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_has_no_duplicate_pairs() {
        for (i, a) in TABLE.iter().enumerate() {
            for b in &TABLE[i + 1..] {
                assert!(
                    !(a.state == b.state && a.event == b.event),
                    "duplicate row for ({:?}, {:?})",
                    a.state,
                    a.event
                );
            }
        }
    }

    #[test]
    fn test_reset_is_terminal() {
        assert!(!TABLE.iter().any(|row| row.state == PeerState::Reset));
    }

    #[test]
    fn test_key_transitions_match_design() {
        let row = lookup(TABLE, S::Discovery, E::InitRequest).unwrap();
        assert_eq!(row.next, S::InSession);

        let row = lookup(TABLE, S::InSession, E::TermRequest).unwrap();
        assert_eq!(row.next, S::Reset);

        let row = lookup(TABLE, S::InSession, E::StartTermination).unwrap();
        assert_eq!(row.next, S::Terminating);

        let row = lookup(TABLE, S::Terminating, E::TermResponse).unwrap();
        assert_eq!(row.next, S::Reset);

        // Every state with a session reaches Reset on transport close.
        for state in [S::Initialization, S::InSession, S::Terminating] {
            let row = lookup(TABLE, state, E::SessionClosed).unwrap();
            assert_eq!(row.next, S::Reset);
        }
    }
}
