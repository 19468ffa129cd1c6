// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Neighbor lifecycle state machine:
//! initializing -> update -> terminating -> (destroyed).
//!
//! Destruction is a `Step::Destroy` outcome rather than a state: the
//! engine removes the neighbor from its peer's table and stops every
//! timer it still owns. All retransmit actions are guarded against late
//! timer fires by the expected-sequence slot (0 = nothing in flight).

use crate::core::fsm::{lookup, Row, Step};
use crate::core::AddressOp;
use crate::debug_flag;
use crate::engine::node::{Services, TimerEvent};
use crate::neighbor::context::{Neighbor, NeighborState};
use crate::peer::context::Peer;
use crate::protocol::builder;
use crate::protocol::constants::*;
use crate::protocol::ScratchPad;

/// Normalized neighbor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborEvent {
    // Router messages
    InitAck,
    UpdateAck,
    AddressResponse,
    LinkCharRequest,
    TermRequest,
    TermAck,
    // Internal triggers
    AddressRequest,
    Term,
    // Timers
    UpdateInterval,
    InitAckExpiry,
    UpdateAckExpiry,
    TermAckExpiry,
    ActivityExpiry,
}

/// Named actions, one per table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborAction {
    MatchInitAck,
    RetransmitUpRequest,
    SendMetrics,
    MatchUpdateAck,
    RetransmitMetrics,
    SendAddressRequest,
    MatchAddressResponse,
    HonorLinkCharRequest,
    StartTermination,
    ReplyDownResponse,
    MatchTermAck,
    RetransmitDownRequest,
    ActivityCheck,
    Ignore,
}

use self::NeighborAction as A;
use self::NeighborEvent as E;
use crate::neighbor::context::NeighborState as S;

/// The neighbor transition relation.
pub static TABLE: &[Row<NeighborState, NeighborEvent, NeighborAction>] = &[
    // Initializing: neighbor-up sent, waiting for the router's ack.
    Row { state: S::Initializing, event: E::InitAck, action: A::MatchInitAck, next: S::Update },
    Row { state: S::Initializing, event: E::InitAckExpiry, action: A::RetransmitUpRequest, next: S::Initializing },
    Row { state: S::Initializing, event: E::TermRequest, action: A::ReplyDownResponse, next: S::Initializing },
    Row { state: S::Initializing, event: E::Term, action: A::StartTermination, next: S::Terminating },

    // Update: periodic metrics, address exchanges, link characteristics.
    Row { state: S::Update, event: E::UpdateInterval, action: A::SendMetrics, next: S::Update },
    Row { state: S::Update, event: E::UpdateAck, action: A::MatchUpdateAck, next: S::Update },
    Row { state: S::Update, event: E::UpdateAckExpiry, action: A::RetransmitMetrics, next: S::Update },
    Row { state: S::Update, event: E::AddressRequest, action: A::SendAddressRequest, next: S::Update },
    Row { state: S::Update, event: E::AddressResponse, action: A::MatchAddressResponse, next: S::Update },
    Row { state: S::Update, event: E::LinkCharRequest, action: A::HonorLinkCharRequest, next: S::Update },
    Row { state: S::Update, event: E::ActivityExpiry, action: A::ActivityCheck, next: S::Update },
    Row { state: S::Update, event: E::Term, action: A::StartTermination, next: S::Terminating },
    Row { state: S::Update, event: E::TermRequest, action: A::ReplyDownResponse, next: S::Update },
    Row { state: S::Update, event: E::InitAck, action: A::Ignore, next: S::Update },

    // Terminating: neighbor-down sent, waiting for the router's ack.
    Row { state: S::Terminating, event: E::TermAck, action: A::MatchTermAck, next: S::Terminating },
    Row { state: S::Terminating, event: E::TermAckExpiry, action: A::RetransmitDownRequest, next: S::Terminating },
    Row { state: S::Terminating, event: E::TermRequest, action: A::ReplyDownResponse, next: S::Terminating },
    Row { state: S::Terminating, event: E::UpdateInterval, action: A::Ignore, next: S::Terminating },
    Row { state: S::Terminating, event: E::UpdateAck, action: A::Ignore, next: S::Terminating },
    Row { state: S::Terminating, event: E::UpdateAckExpiry, action: A::Ignore, next: S::Terminating },
    Row { state: S::Terminating, event: E::AddressResponse, action: A::Ignore, next: S::Terminating },
    Row { state: S::Terminating, event: E::LinkCharRequest, action: A::Ignore, next: S::Terminating },
    Row { state: S::Terminating, event: E::ActivityExpiry, action: A::Ignore, next: S::Terminating },
    Row { state: S::Terminating, event: E::Term, action: A::Ignore, next: S::Terminating },
];

/// Drive one neighbor, identified by MAC, with one event.
///
/// The neighbor is taken out of the peer table for the duration of the
/// action so handlers can touch the peer (sequence meter, timer config)
/// and the neighbor together, then reinserted unless destroyed.
pub fn engine(
    services: &mut Services,
    peer: &mut Peer,
    mac: crate::core::MacAddress,
    event: NeighborEvent,
    pad: Option<&ScratchPad>,
) {
    let Some(mut neighbor) = peer.neighbors.remove(&mac) else {
        debug_flag!(services.flags, ERROR, "[NEIGHBOR] {} vanished before {:?}", mac, event);
        return;
    };

    let state = neighbor.state;
    let Some(row) = lookup(TABLE, state, event) else {
        debug_flag!(
            services.flags,
            NEIGHBOR,
            "[NEIGHBOR] {} ignoring {:?} in {}",
            mac,
            event,
            state.name()
        );
        peer.neighbors.insert(mac, neighbor);
        return;
    };

    let step = apply(row.action, services, peer, &mut neighbor, pad);
    match step {
        Step::Destroy => {
            destroy(services, &mut neighbor);
            debug_flag!(
                services.flags,
                NEIGHBOR,
                "[NEIGHBOR] {} local_id={} destroyed",
                mac,
                neighbor.local_id
            );
        }
        Step::Advance | Step::Override(_) => {
            let next = if let Step::Override(next) = step { next } else { row.next };
            if next != state {
                debug_flag!(
                    services.flags,
                    NEIGHBOR,
                    "[NEIGHBOR] {} {} -> {} on {:?}",
                    mac,
                    state.name(),
                    next.name(),
                    event
                );
                neighbor.state = next;
            }
            peer.neighbors.insert(mac, neighbor);
        }
    }
}

/// Stop every timer a neighbor still owns; called on all destroy paths,
/// including the peer teardown cascade.
pub(crate) fn destroy(services: &mut Services, neighbor: &mut Neighbor) {
    services.wheel.stop(&mut neighbor.init_ack_tmr);
    services.wheel.stop(&mut neighbor.update_ack_tmr);
    services.wheel.stop(&mut neighbor.activity_tmr);
    services.wheel.stop(&mut neighbor.update_interval_tmr);
    services.wheel.stop(&mut neighbor.term_ack_tmr);
}

fn apply(
    action: NeighborAction,
    services: &mut Services,
    peer: &mut Peer,
    n: &mut Neighbor,
    pad: Option<&ScratchPad>,
) -> Step<NeighborState> {
    match action {
        A::MatchInitAck => match_init_ack(services, peer, n, pad),
        A::RetransmitUpRequest => retransmit_up_request(services, peer, n),
        A::SendMetrics => send_metrics(services, peer, n),
        A::MatchUpdateAck => match_update_ack(services, n, pad),
        A::RetransmitMetrics => retransmit_metrics(services, peer, n),
        A::SendAddressRequest => send_address_request(services, peer, n),
        A::MatchAddressResponse => match_address_response(services, n, pad),
        A::HonorLinkCharRequest => honor_link_char_request(services, n, pad),
        A::StartTermination => start_termination(services, peer, n),
        A::ReplyDownResponse => reply_down_response(services, n, pad),
        A::MatchTermAck => match_term_ack(services, n, pad),
        A::RetransmitDownRequest => retransmit_down_request(services, peer, n),
        A::ActivityCheck => activity_check(services, peer, n),
        A::Ignore => Step::Advance,
    }
}

// ============================================================================
// Action bodies
// ============================================================================

fn match_init_ack(
    services: &mut Services,
    peer: &mut Peer,
    n: &mut Neighbor,
    pad: Option<&ScratchPad>,
) -> Step<NeighborState> {
    let Some(pad) = pad else { return Step::Override(n.state) };
    let expected = n.expected_init_ack_sequence;
    if expected == 0 || pad.sequence != expected {
        services.counters.sequence_mismatch += 1;
        debug_flag!(
            services.flags,
            ERROR,
            "[NEIGHBOR] {} init-ack seq={} expected={}",
            n.mac_address,
            pad.sequence,
            expected
        );
        return Step::Override(n.state);
    }

    services.wheel.stop(&mut n.init_ack_tmr);
    n.expected_init_ack_sequence = 0;
    n.up_ack_tmo_count = 0;

    if pad.status_present && pad.status_code != STATUS_SUCCESS {
        debug_flag!(
            services.flags,
            ERROR,
            "[NEIGHBOR] {} refused by router, status={}",
            n.mac_address,
            pad.status_code
        );
        return Step::Destroy;
    }

    let timers = peer.timers;
    let peer_id = peer.peer_id;
    let mac = n.mac_address;

    if timers.neighbor_update_interval_tmo > 0 {
        let event = TimerEvent::NeighborUpdateInterval { peer_id, mac };
        services.wheel.start(
            &mut n.update_interval_tmr,
            u64::from(timers.neighbor_update_interval_tmo),
            true,
            event,
        );
    }
    if n.activity_duration > 0 {
        n.activity_flag = false;
        let event = TimerEvent::NeighborActivity { peer_id, mac };
        services.wheel.start(
            &mut n.activity_tmr,
            u64::from(n.activity_duration) * 1_000,
            true,
            event,
        );
    }
    Step::Advance
}

fn retransmit_up_request(
    services: &mut Services,
    peer: &mut Peer,
    n: &mut Neighbor,
) -> Step<NeighborState> {
    // Late fire after the ack already landed.
    if n.expected_init_ack_sequence == 0 {
        return Step::Advance;
    }

    n.up_ack_tmo_count += 1;
    services.counters.init_ack_timeouts += 1;
    if n.up_ack_tmo_count >= peer.timers.neighbor_up_missed_ack_threshold {
        log::warn!(
            "[NEIGHBOR] {} up-ack missed {} times, giving up",
            n.mac_address,
            n.up_ack_tmo_count
        );
        return Step::Destroy;
    }

    let seq = peer.next_sequence();
    n.expected_init_ack_sequence = seq;
    let frame = builder::neighbor_up_request(
        seq,
        &builder::NeighborUp {
            mac: n.mac_address,
            metrics: &n.metrics,
            ipv4: n.ipv4_address,
            ipv6: n.ipv6_address,
            credits: n.credit_supported.then_some(&n.credits),
        },
    );
    services.send_message(&frame);

    let event = TimerEvent::NeighborInitAck { peer_id: peer.peer_id, mac: n.mac_address };
    services.wheel.start(
        &mut n.init_ack_tmr,
        u64::from(peer.timers.neighbor_up_ack_tmo),
        false,
        event,
    );
    Step::Advance
}

fn send_metrics(services: &mut Services, peer: &mut Peer, n: &mut Neighbor) -> Step<NeighborState> {
    // Refresh the whole block before emission; no partial publishes.
    n.metrics = services.metrics.sample(&n.mac_address, &n.metrics);

    let seq = peer.next_sequence();
    let frame = builder::neighbor_metrics(
        seq,
        &n.mac_address,
        &n.metrics,
        n.credit_supported.then_some(&n.credits),
    );
    services.send_message(&frame);
    debug_flag!(
        services.flags,
        METRICS,
        "[METRICS] {} cdr tx/rx={}/{} rlq tx/rx={}/{}",
        n.mac_address,
        n.metrics.cdr_tx,
        n.metrics.cdr_rx,
        n.metrics.rlq_tx,
        n.metrics.rlq_rx
    );

    if peer.update_acks_negotiated {
        // A newer update supersedes an unacked older one.
        n.expected_update_ack_sequence = seq;
        let event = TimerEvent::NeighborUpdateAck { peer_id: peer.peer_id, mac: n.mac_address };
        services.wheel.start(
            &mut n.update_ack_tmr,
            u64::from(peer.timers.neighbor_up_ack_tmo),
            false,
            event,
        );
    }
    Step::Advance
}

fn match_update_ack(
    services: &mut Services,
    n: &mut Neighbor,
    pad: Option<&ScratchPad>,
) -> Step<NeighborState> {
    let Some(pad) = pad else { return Step::Override(n.state) };
    let expected = n.expected_update_ack_sequence;
    if expected == 0 {
        // Acks not negotiated; the message still counts as activity.
        return Step::Advance;
    }
    if pad.sequence == expected {
        services.wheel.stop(&mut n.update_ack_tmr);
        n.expected_update_ack_sequence = 0;
        n.update_ack_tmo_count = 0;
    } else {
        services.counters.sequence_mismatch += 1;
        debug_flag!(
            services.flags,
            ERROR,
            "[NEIGHBOR] {} update-ack seq={} expected={}",
            n.mac_address,
            pad.sequence,
            expected
        );
    }
    Step::Advance
}

fn retransmit_metrics(
    services: &mut Services,
    peer: &mut Peer,
    n: &mut Neighbor,
) -> Step<NeighborState> {
    if n.expected_update_ack_sequence == 0 {
        return Step::Advance;
    }

    n.update_ack_tmo_count += 1;
    services.counters.update_ack_timeouts += 1;
    if n.update_ack_tmo_count >= peer.timers.neighbor_up_missed_ack_threshold {
        log::warn!(
            "[NEIGHBOR] {} update-ack missed {} times, taking neighbor down",
            n.mac_address,
            n.update_ack_tmo_count
        );
        n.status_code = STATUS_TIMED_OUT;
        start_termination(services, peer, n);
        return Step::Override(NeighborState::Terminating);
    }

    let seq = peer.next_sequence();
    n.expected_update_ack_sequence = seq;
    let frame = builder::neighbor_metrics(
        seq,
        &n.mac_address,
        &n.metrics,
        n.credit_supported.then_some(&n.credits),
    );
    services.send_message(&frame);
    let event = TimerEvent::NeighborUpdateAck { peer_id: peer.peer_id, mac: n.mac_address };
    services.wheel.start(
        &mut n.update_ack_tmr,
        u64::from(peer.timers.neighbor_up_ack_tmo),
        false,
        event,
    );
    Step::Advance
}

fn send_address_request(
    services: &mut Services,
    peer: &mut Peer,
    n: &mut Neighbor,
) -> Step<NeighborState> {
    if !n.has_staged_address_update() {
        return Step::Advance;
    }

    let ipv4 = (n.update_ipv4_operation != AddressOp::None)
        .then_some((n.update_ipv4_operation, n.update_ipv4_address));
    let ipv6 = (n.update_ipv6_operation != AddressOp::None)
        .then_some((n.update_ipv6_operation, n.update_ipv6_address));

    let seq = peer.next_sequence();
    n.expected_address_response_sequence = seq;
    let frame = builder::neighbor_address_request(seq, &n.mac_address, ipv4, ipv6, None);
    services.send_message(&frame);
    Step::Advance
}

fn match_address_response(
    services: &mut Services,
    n: &mut Neighbor,
    pad: Option<&ScratchPad>,
) -> Step<NeighborState> {
    let Some(pad) = pad else { return Step::Override(n.state) };
    let expected = n.expected_address_response_sequence;
    if expected == 0 || pad.sequence != expected {
        services.counters.sequence_mismatch += 1;
        debug_flag!(
            services.flags,
            ERROR,
            "[NEIGHBOR] {} address-response seq={} expected={}",
            n.mac_address,
            pad.sequence,
            expected
        );
        return Step::Advance;
    }
    n.expected_address_response_sequence = 0;

    let accepted = !pad.status_present || pad.status_code == STATUS_SUCCESS;
    if accepted {
        match n.update_ipv4_operation {
            AddressOp::Add => n.ipv4_address = Some(n.update_ipv4_address),
            AddressOp::Delete => n.ipv4_address = None,
            AddressOp::None => {}
        }
        match n.update_ipv6_operation {
            AddressOp::Add => n.ipv6_address = Some(n.update_ipv6_address),
            AddressOp::Delete => n.ipv6_address = None,
            AddressOp::None => {}
        }
    } else {
        debug_flag!(
            services.flags,
            ERROR,
            "[NEIGHBOR] {} address update rejected, status={}",
            n.mac_address,
            pad.status_code
        );
    }
    n.update_ipv4_operation = AddressOp::None;
    n.update_ipv6_operation = AddressOp::None;
    Step::Advance
}

fn honor_link_char_request(
    services: &mut Services,
    n: &mut Neighbor,
    pad: Option<&ScratchPad>,
) -> Step<NeighborState> {
    let Some(pad) = pad else { return Step::Override(n.state) };

    // The simulated radio grants the requested characteristics and echoes
    // the resulting block back.
    let mut metrics = n.metrics;
    if pad.cdr_tx_present {
        metrics.cdr_tx = pad.cdr_tx.min(metrics.mdr_tx);
    }
    if pad.latency_present {
        metrics.latency_ms = pad.latency;
    }
    n.metrics = metrics;

    let frame = builder::link_char_response(pad.sequence, &n.mac_address, &n.metrics);
    services.send_message(&frame);
    Step::Advance
}

fn start_termination(services: &mut Services, peer: &mut Peer, n: &mut Neighbor) -> Step<NeighborState> {
    services.wheel.stop(&mut n.init_ack_tmr);
    services.wheel.stop(&mut n.update_ack_tmr);
    services.wheel.stop(&mut n.activity_tmr);
    services.wheel.stop(&mut n.update_interval_tmr);

    let seq = peer.next_sequence();
    n.expected_term_ack_sequence = seq;
    n.down_ack_tmo_count = 0;
    let frame = builder::neighbor_down_request(seq, &n.mac_address, n.status_code);
    services.send_message(&frame);

    let event = TimerEvent::NeighborTermAck { peer_id: peer.peer_id, mac: n.mac_address };
    services.wheel.start(
        &mut n.term_ack_tmr,
        u64::from(peer.timers.neighbor_down_ack_tmo),
        false,
        event,
    );
    Step::Advance
}

fn reply_down_response(
    services: &mut Services,
    n: &mut Neighbor,
    pad: Option<&ScratchPad>,
) -> Step<NeighborState> {
    let Some(pad) = pad else { return Step::Override(n.state) };
    let frame = builder::neighbor_down_response(pad.sequence, &n.mac_address, STATUS_SUCCESS);
    services.send_message(&frame);
    Step::Destroy
}

fn match_term_ack(
    services: &mut Services,
    n: &mut Neighbor,
    pad: Option<&ScratchPad>,
) -> Step<NeighborState> {
    let Some(pad) = pad else { return Step::Override(n.state) };
    let expected = n.expected_term_ack_sequence;
    if expected != 0 && pad.sequence == expected {
        services.wheel.stop(&mut n.term_ack_tmr);
        n.expected_term_ack_sequence = 0;
        Step::Destroy
    } else {
        services.counters.sequence_mismatch += 1;
        debug_flag!(
            services.flags,
            ERROR,
            "[NEIGHBOR] {} down-ack seq={} expected={}",
            n.mac_address,
            pad.sequence,
            expected
        );
        Step::Advance
    }
}

fn retransmit_down_request(
    services: &mut Services,
    peer: &mut Peer,
    n: &mut Neighbor,
) -> Step<NeighborState> {
    if n.expected_term_ack_sequence == 0 {
        return Step::Advance;
    }

    n.down_ack_tmo_count += 1;
    services.counters.down_ack_timeouts += 1;
    if n.down_ack_tmo_count >= peer.timers.neighbor_down_missed_ack_threshold {
        log::warn!(
            "[NEIGHBOR] {} down-ack missed {} times, dropping without ack",
            n.mac_address,
            n.down_ack_tmo_count
        );
        return Step::Destroy;
    }

    let seq = peer.next_sequence();
    n.expected_term_ack_sequence = seq;
    let frame = builder::neighbor_down_request(seq, &n.mac_address, n.status_code);
    services.send_message(&frame);
    let event = TimerEvent::NeighborTermAck { peer_id: peer.peer_id, mac: n.mac_address };
    services.wheel.start(
        &mut n.term_ack_tmr,
        u64::from(peer.timers.neighbor_down_ack_tmo),
        false,
        event,
    );
    Step::Advance
}

fn activity_check(services: &mut Services, peer: &mut Peer, n: &mut Neighbor) -> Step<NeighborState> {
    if n.activity_flag {
        n.activity_flag = false;
        return Step::Advance;
    }
    if n.activity_duration == 0 {
        return Step::Advance;
    }

    log::warn!(
        "[NEIGHBOR] {} silent for {}s, taking neighbor down",
        n.mac_address,
        n.activity_duration
    );
    n.status_code = STATUS_TIMED_OUT;
    start_termination(services, peer, n);
    Step::Override(NeighborState::Terminating)
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
    fn test_key_transitions_match_design() {
        let row = lookup(TABLE, S::Initializing, E::InitAck).unwrap();
        assert_eq!(row.next, S::Update);

        let row = lookup(TABLE, S::Update, E::Term).unwrap();
        assert_eq!(row.next, S::Terminating);

        // Retransmission rows stay in place; overrides do the escalation.
        let row = lookup(TABLE, S::Initializing, E::InitAckExpiry).unwrap();
        assert_eq!(row.next, S::Initializing);
        let row = lookup(TABLE, S::Terminating, E::TermAckExpiry).unwrap();
        assert_eq!(row.next, S::Terminating);
    }
}
