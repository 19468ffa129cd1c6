// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer session scenarios: clean lifecycle, heartbeat starvation,
//! update exchanges, and termination on protocol violations.

mod harness;

use dlep::config::DlepConfig;
use dlep::core::AddressOp;
use dlep::peer::PeerState;
use dlep::protocol::builder;
use dlep::protocol::constants::*;
use harness::TestRadio;

fn config() -> DlepConfig {
    DlepConfig::parse(
        "SIM_NAME test-radio\n\
         LOCAL_IPV4 10.0.0.2\n\
         ROUTER_IPV4 10.0.0.1\n\
         TYPE_DESCRIPTION test-radio\n",
    )
}

#[test]
fn test_clean_discovery_session_teardown() {
    let mut radio = TestRadio::new(config());
    radio.establish(2);

    // Ten seconds in-session with the router heartbeating every 2 s.
    // The radio heartbeats back at the adopted cadence.
    for _ in 0..5 {
        radio.advance(1_000);
        let seq = radio.next_router_seq();
        radio.node.on_session_packet(&builder::peer_heartbeat(seq));
        radio.advance(1_000);

        let peer = radio.node.peer().expect("peer alive");
        assert_eq!(peer.heartbeat_missed_count, 0, "heartbeat counter must stay 0");
    }
    let heartbeats = radio.sent_with_code(MSG_PEER_HEARTBEAT);
    assert_eq!(heartbeats.len(), 5, "one radio heartbeat per adopted 2 s interval");

    // Router tears the session down.
    let seq = radio.next_router_seq();
    radio.node.on_session_packet(&builder::peer_term_request(seq, STATUS_SUCCESS));

    let responses = radio.sent_with_code(MSG_PEER_TERM_RES);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].sequence, seq, "term-response echoes the request sequence");
    assert_eq!(responses[0].status_code, STATUS_SUCCESS);

    // Peer reached reset and was reaped; the session socket was closed.
    assert!(radio.node.peer().is_none());
    assert_eq!(radio.captured.lock().unwrap().closes, 1);

    // Zero retransmissions anywhere.
    let counters = radio.node.counters();
    assert_eq!(counters.term_ack_timeouts, 0);
    assert_eq!(counters.init_ack_timeouts, 0);
    assert_eq!(counters.heartbeats_missed, 0);
}

#[test]
fn test_heartbeat_starvation_self_terminates() {
    let mut radio = TestRadio::new(config());
    radio.establish(1);

    // Router goes silent. Window fires at 1, 2, 3 s; threshold is 3.
    radio.advance(2_900);
    assert_eq!(radio.peer_state(), Some(PeerState::InSession));
    assert_eq!(radio.node.peer().map(|p| p.heartbeat_missed_count), Some(2));

    radio.advance(100);
    assert_eq!(radio.peer_state(), Some(PeerState::Terminating));
    let peer = radio.node.peer().expect("terminating, not reaped yet");
    assert_eq!(peer.heartbeat_missed_count, 3);
    assert_eq!(radio.node.counters().heartbeats_missed, 3);

    let terms = radio.sent_with_code(MSG_PEER_TERM_REQ);
    assert_eq!(terms.len(), 1);
    assert_eq!(terms[0].status_code, STATUS_TIMED_OUT);

    // The router finally acks; peer reaches reset and is reaped.
    let ack_seq = terms[0].sequence;
    radio.node.on_session_packet(&builder::peer_term_response(ack_seq, STATUS_SUCCESS));
    assert!(radio.node.peer().is_none());
}

#[test]
fn test_term_retransmits_until_threshold_then_reset() {
    let mut radio = TestRadio::new(config());
    radio.establish(1);

    // Starve heartbeats into termination, then never ack the term.
    radio.advance(3_000);
    assert_eq!(radio.peer_state(), Some(PeerState::Terminating));

    // Default: 1000 ms ack timeout, threshold 3. Expiries at +1, +2, +3 s;
    // the first two retransmit, the third forces reset.
    radio.advance(2_000);
    let terms = radio.sent_with_code(MSG_PEER_TERM_REQ);
    assert_eq!(terms.len(), 3, "initial term-request plus two retransmissions");
    let mut seqs: Vec<u16> = terms.iter().map(|t| t.sequence).collect();
    let sorted = {
        let mut s = seqs.clone();
        s.sort_unstable();
        s
    };
    assert_eq!(seqs, sorted, "each retransmission takes a fresh, larger sequence");
    seqs.dedup();
    assert_eq!(seqs.len(), 3);

    radio.advance(1_000);
    assert!(radio.node.peer().is_none(), "threshold exceeded forces reset");
    assert_eq!(radio.node.counters().term_ack_timeouts, 3);
}

#[test]
fn test_router_update_request_gets_response() {
    let mut radio = TestRadio::new(config());
    radio.establish(2);

    let seq = radio.next_router_seq();
    let update = builder::peer_update_request(
        seq,
        Some((AddressOp::Add, std::net::Ipv4Addr::new(172, 16, 0, 1))),
        None,
    );
    radio.node.on_session_packet(&update);

    let responses = radio.sent_with_code(MSG_PEER_UPDATE_RES);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].sequence, seq);
    assert_eq!(responses[0].status_code, STATUS_SUCCESS);
    assert_eq!(radio.peer_state(), Some(PeerState::InSession));
}

#[test]
fn test_radio_update_request_correlates_response() {
    let mut radio = TestRadio::new(config());
    radio.establish(2);

    radio.node.on_command(dlep::AdminCommand::PeerAddress {
        ipv4: Some((AddressOp::Add, std::net::Ipv4Addr::new(10, 0, 0, 99))),
        ipv6: None,
    });

    let requests = radio.sent_with_code(MSG_PEER_UPDATE_REQ);
    assert_eq!(requests.len(), 1);
    assert!(requests[0].ipv4_present);
    assert_eq!(requests[0].ipv4_operation, AddressOp::Add);
    let seq = requests[0].sequence;

    // A mismatched sequence is counted, the in-flight slot stays armed.
    radio
        .node
        .on_session_packet(&builder::peer_update_response(seq.wrapping_add(7), STATUS_SUCCESS));
    assert_eq!(radio.node.counters().sequence_mismatch, 1);
    assert_eq!(
        radio.node.peer().map(|p| p.expected_peer_update_response_sequence),
        Some(seq)
    );

    radio.node.on_session_packet(&builder::peer_update_response(seq, STATUS_SUCCESS));
    assert_eq!(
        radio.node.peer().map(|p| p.expected_peer_update_response_sequence),
        Some(0)
    );
    assert_eq!(radio.peer_state(), Some(PeerState::InSession));
}

#[test]
fn test_unexpected_role_message_terminates_peer() {
    let mut radio = TestRadio::new(config());
    radio.establish(2);

    // A radio never receives a peer-init-response.
    let seq = radio.next_router_seq();
    let bogus =
        builder::peer_init_response(seq, "router", 2, STATUS_SUCCESS, 0, 0);
    radio.node.on_session_packet(&bogus);

    assert_eq!(radio.peer_state(), Some(PeerState::Terminating));
    assert_eq!(radio.node.counters().unexpected_message, 1);
    let terms = radio.sent_with_code(MSG_PEER_TERM_REQ);
    assert_eq!(terms.len(), 1);
    assert_eq!(terms[0].status_code, STATUS_UNEXPECTED_MESSAGE);
}

#[test]
fn test_unknown_message_code_terminates_peer() {
    let mut radio = TestRadio::new(config());
    radio.establish(2);

    let mut b = builder::PacketBuilder::message();
    b.begin_message(999, 12).end_message();
    radio.node.on_session_packet(&b.seal());

    assert_eq!(radio.peer_state(), Some(PeerState::Terminating));
    assert_eq!(radio.node.counters().unknown_message, 1);
    let terms = radio.sent_with_code(MSG_PEER_TERM_REQ);
    assert_eq!(terms[0].status_code, STATUS_UNKNOWN_MESSAGE);
}

#[test]
fn test_session_close_destroys_peer_and_neighbors() {
    let mut radio = TestRadio::new(config());
    radio.establish(2);

    radio.node.on_command(dlep::AdminCommand::NeighborUp {
        mac: "aa:bb:cc:dd:ee:01".parse().unwrap(),
        ipv4: None,
        ipv6: None,
    });
    assert_eq!(radio.node.peer().map(|p| p.neighbors.len()), Some(1));

    radio.node.on_session_closed();
    assert!(radio.node.peer().is_none(), "tcp close is terminal");
    // No timers may survive the cascade.
    assert_eq!(radio.node.services().wheel.armed(), 0);
}

#[test]
fn test_repeated_discovery_reoffers_until_session() {
    let mut radio = TestRadio::new(config());

    let seq = radio.next_router_seq();
    let discovery = builder::peer_discovery(seq, true, "core-router");
    let src = radio.router_udp();
    radio.node.on_signal_datagram(src, &discovery);
    assert_eq!(radio.captured.lock().unwrap().signals.len(), 1);

    // Offer timer (default 5 s) re-offers while still in discovery.
    radio.advance(10_000);
    let offers = radio.captured.lock().unwrap().signals.len();
    assert_eq!(offers, 3, "initial offer plus one per 5 s interval");
    assert_eq!(radio.peer_state(), Some(PeerState::Discovery));
}
