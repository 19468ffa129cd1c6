// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Neighbor scenarios: up-handshake retransmission, periodic metrics,
//! address updates, link characteristics, activity supervision and the
//! down-handshake.

mod harness;

use dlep::config::DlepConfig;
use dlep::core::{AddressOp, MacAddress};
use dlep::metrics::StaticMetrics;
use dlep::neighbor::NeighborState;
use dlep::protocol::builder;
use dlep::protocol::constants::*;
use dlep::protocol::LinkMetrics;
use dlep::AdminCommand;
use harness::TestRadio;

fn config(extra: &str) -> DlepConfig {
    let mut text = String::from(
        "SIM_NAME test-radio\n\
         LOCAL_IPV4 10.0.0.2\n\
         ROUTER_IPV4 10.0.0.1\n\
         TYPE_DESCRIPTION test-radio\n",
    );
    text.push_str(extra);
    DlepConfig::parse(&text)
}

fn mac() -> MacAddress {
    "aa:bb:cc:dd:ee:01".parse().unwrap()
}

fn fixed_metrics() -> LinkMetrics {
    LinkMetrics {
        rlq_tx: 100,
        rlq_rx: 100,
        resources_tx: 100,
        resources_rx: 100,
        latency_ms: 0,
        cdr_tx: 11_000_000,
        cdr_rx: 11_000_000,
        mdr_tx: 110_000_000,
        mdr_rx: 110_000_000,
        mtu: 1500,
    }
}

/// Radio with an in-session peer, heartbeats disabled so sequence
/// numbers stay predictable.
fn radio_in_session(extra: &str) -> TestRadio {
    let mut radio = TestRadio::new(config(extra));
    radio.node.set_metrics_source(Box::new(StaticMetrics(fixed_metrics())));
    radio.establish(0);
    radio
}

#[test]
fn test_neighbor_up_retransmits_with_fresh_sequences() {
    let mut radio = radio_in_session(
        "DLEP_NEIGHBOR_UP_ACK_TMO 500\n\
         DLEP_NEIGHBOR_UP_MISSED_ACK_THRESHOLD 3\n\
         DLEP_NEIGHBOR_UPDATE_INTERVAL_TMO 5000\n\
         DLEP_NEIGHBOR_ACTIVITY_TIMER 0\n",
    );

    radio.node.on_command(AdminCommand::NeighborUp { mac: mac(), ipv4: None, ipv6: None });
    let first = radio.sent_with_code(MSG_NEIGHBOR_UP_REQ);
    assert_eq!(first.len(), 1);
    let base_seq = first[0].sequence;

    // The router drops the request twice: two retransmissions, 500 ms
    // apart, each with the next sequence.
    radio.advance(400);
    assert_eq!(radio.sent_with_code(MSG_NEIGHBOR_UP_REQ).len(), 1, "not yet due");
    radio.advance(100);
    assert_eq!(radio.sent_with_code(MSG_NEIGHBOR_UP_REQ).len(), 2);
    radio.advance(500);

    let requests = radio.sent_with_code(MSG_NEIGHBOR_UP_REQ);
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].sequence, base_seq);
    assert_eq!(requests[1].sequence, base_seq.wrapping_add(1));
    assert_eq!(requests[2].sequence, base_seq.wrapping_add(2));
    assert_eq!(radio.node.counters().init_ack_timeouts, 2);

    // Ack against the third transmission.
    let ack = builder::neighbor_up_response(requests[2].sequence, &mac(), STATUS_SUCCESS);
    radio.node.on_session_packet(&ack);

    let peer = radio.node.peer().expect("peer alive");
    let neighbor = peer.neighbors.get(&mac()).expect("neighbor alive");
    assert_eq!(neighbor.state, NeighborState::Update);
    assert_eq!(neighbor.up_ack_tmo_count, 0, "counter cleared on ack");
    assert!(!radio.node.services().wheel.is_running(&neighbor.init_ack_tmr));
}

#[test]
fn test_neighbor_up_gives_up_at_threshold() {
    let mut radio = radio_in_session(
        "DLEP_NEIGHBOR_UP_ACK_TMO 500\n\
         DLEP_NEIGHBOR_UP_MISSED_ACK_THRESHOLD 3\n",
    );

    radio.node.on_command(AdminCommand::NeighborUp { mac: mac(), ipv4: None, ipv6: None });
    radio.advance(2_000);

    // Transmissions are bounded by the threshold.
    assert_eq!(radio.sent_with_code(MSG_NEIGHBOR_UP_REQ).len(), 3);
    assert_eq!(radio.node.peer().map(|p| p.neighbors.len()), Some(0), "neighbor dropped");
    assert_eq!(radio.node.services().wheel.armed(), 0);
}

#[test]
fn test_periodic_metrics_published_as_one_block() {
    let mut radio = radio_in_session(
        "DLEP_NEIGHBOR_UPDATE_INTERVAL_TMO 400\n\
         DLEP_NEIGHBOR_ACTIVITY_TIMER 0\n",
    );

    radio.node.on_command(AdminCommand::NeighborUp { mac: mac(), ipv4: None, ipv6: None });
    let up = radio.sent_with_code(MSG_NEIGHBOR_UP_REQ);
    let ack = builder::neighbor_up_response(up[0].sequence, &mac(), STATUS_SUCCESS);
    radio.node.on_session_packet(&ack);
    radio.clear_captured();

    radio.advance(1_200);
    let updates = radio.sent_with_code(MSG_NEIGHBOR_METRICS);
    assert_eq!(updates.len(), 3, "one update per 400 ms");
    for pad in &updates {
        assert_eq!(pad.mac_address, mac());
        // The whole metric block rides every update.
        assert!(pad.mdr_tx_present && pad.mdr_rx_present);
        assert!(pad.cdr_tx_present && pad.cdr_rx_present);
        assert!(pad.latency_present);
        assert!(pad.rlq_tx_present && pad.rlq_rx_present);
        assert!(pad.resources_tx_present && pad.resources_rx_present);
        assert!(pad.mtu_present);
        assert_eq!(pad.cdr_tx, 11_000_000);
        assert_eq!(pad.mdr_tx, 110_000_000);
    }
}

#[test]
fn test_unknown_neighbor_metrics_ack_is_dropped() {
    let mut radio = radio_in_session("");

    let stranger: MacAddress = "02:00:00:00:00:99".parse().unwrap();
    let seq = radio.next_router_seq();
    let ack = builder::neighbor_metrics(seq, &stranger, &fixed_metrics(), None);
    radio.node.on_session_packet(&ack);

    assert_eq!(radio.node.counters().unknown_neighbor_mac, 1);
    assert_eq!(radio.peer_state(), Some(dlep::peer::PeerState::InSession), "no state change");
    assert!(radio.sent_messages().is_empty(), "silently dropped, no reply");
}

#[test]
fn test_unknown_neighbor_down_request_gets_error_reply() {
    let mut radio = radio_in_session("");

    let stranger: MacAddress = "02:00:00:00:00:99".parse().unwrap();
    let seq = radio.next_router_seq();
    radio
        .node
        .on_session_packet(&builder::neighbor_down_request(seq, &stranger, STATUS_SUCCESS));

    assert_eq!(radio.node.counters().unknown_neighbor_mac, 1);
    let replies = radio.sent_with_code(MSG_NEIGHBOR_DOWN_RES);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].sequence, seq);
    assert_eq!(replies[0].status_code, STATUS_INVALID_DESTINATION);
}

#[test]
fn test_activity_supervision_takes_silent_neighbor_down() {
    let mut radio = radio_in_session(
        "DLEP_NEIGHBOR_ACTIVITY_TIMER 2\n\
         DLEP_NEIGHBOR_UPDATE_INTERVAL_TMO 400\n",
    );

    radio.node.on_command(AdminCommand::NeighborUp { mac: mac(), ipv4: None, ipv6: None });
    let up = radio.sent_with_code(MSG_NEIGHBOR_UP_REQ);
    let ack = builder::neighbor_up_response(up[0].sequence, &mac(), STATUS_SUCCESS);
    radio.node.on_session_packet(&ack);
    radio.clear_captured();

    // No router traffic for the neighbor for a full activity window.
    radio.advance(2_000);

    let peer = radio.node.peer().expect("peer alive");
    let neighbor = peer.neighbors.get(&mac()).expect("neighbor alive");
    assert_eq!(neighbor.state, NeighborState::Terminating);

    let downs = radio.sent_with_code(MSG_NEIGHBOR_DOWN_REQ);
    assert_eq!(downs.len(), 1);
    assert_eq!(downs[0].status_code, STATUS_TIMED_OUT);

    // Ack destroys the neighbor.
    let ack = builder::neighbor_down_response(downs[0].sequence, &mac(), STATUS_SUCCESS);
    radio.node.on_session_packet(&ack);
    assert_eq!(radio.node.peer().map(|p| p.neighbors.len()), Some(0));
}

#[test]
fn test_activity_supervision_spares_active_neighbor() {
    let mut radio = radio_in_session(
        "DLEP_NEIGHBOR_ACTIVITY_TIMER 2\n\
         DLEP_NEIGHBOR_UPDATE_INTERVAL_TMO 400\n",
    );

    radio.node.on_command(AdminCommand::NeighborUp { mac: mac(), ipv4: None, ipv6: None });
    let up = radio.sent_with_code(MSG_NEIGHBOR_UP_REQ);
    radio
        .node
        .on_session_packet(&builder::neighbor_up_response(up[0].sequence, &mac(), STATUS_SUCCESS));

    // Router acks metrics inside every activity window.
    for _ in 0..4 {
        radio.advance(1_000);
        let seq = radio.next_router_seq();
        radio
            .node
            .on_session_packet(&builder::neighbor_metrics(seq, &mac(), &fixed_metrics(), None));
    }

    let peer = radio.node.peer().expect("peer alive");
    let neighbor = peer.neighbors.get(&mac()).expect("neighbor alive");
    assert_eq!(neighbor.state, NeighborState::Update);
}

#[test]
fn test_address_update_round_trip() {
    let mut radio = radio_in_session("DLEP_NEIGHBOR_UPDATE_INTERVAL_TMO 5000\n");

    radio.node.on_command(AdminCommand::NeighborUp { mac: mac(), ipv4: None, ipv6: None });
    let up = radio.sent_with_code(MSG_NEIGHBOR_UP_REQ);
    radio
        .node
        .on_session_packet(&builder::neighbor_up_response(up[0].sequence, &mac(), STATUS_SUCCESS));
    radio.clear_captured();

    let addr = std::net::Ipv4Addr::new(192, 168, 7, 7);
    radio.node.on_command(AdminCommand::NeighborAddress {
        mac: mac(),
        ipv4: Some((AddressOp::Add, addr)),
        ipv6: None,
    });

    let requests = radio.sent_with_code(MSG_NEIGHBOR_ADDRESS_REQ);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].ipv4_operation, AddressOp::Add);
    assert_eq!(requests[0].ipv4_address, addr);

    radio.node.on_session_packet(&builder::neighbor_address_response(
        requests[0].sequence,
        &mac(),
        STATUS_SUCCESS,
    ));

    let peer = radio.node.peer().expect("peer alive");
    let neighbor = peer.neighbors.get(&mac()).expect("neighbor alive");
    assert_eq!(neighbor.ipv4_address, Some(addr), "address committed on ack");
    assert_eq!(neighbor.update_ipv4_operation, AddressOp::None, "staging cleared");
}

#[test]
fn test_link_char_request_echoes_granted_metrics() {
    let mut radio = radio_in_session("DLEP_NEIGHBOR_UPDATE_INTERVAL_TMO 5000\n");

    radio.node.on_command(AdminCommand::NeighborUp { mac: mac(), ipv4: None, ipv6: None });
    let up = radio.sent_with_code(MSG_NEIGHBOR_UP_REQ);
    radio
        .node
        .on_session_packet(&builder::neighbor_up_response(up[0].sequence, &mac(), STATUS_SUCCESS));
    radio.clear_captured();

    let seq = radio.next_router_seq();
    let request = builder::link_char_request(seq, &mac(), Some(5_000_000), Some(25));
    radio.node.on_session_packet(&request);

    let responses = radio.sent_with_code(MSG_LINK_CHAR_RES);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].sequence, seq);
    assert_eq!(responses[0].cdr_tx, 5_000_000, "granted rate echoed");
    assert_eq!(responses[0].latency, 25);

    let peer = radio.node.peer().expect("peer alive");
    let neighbor = peer.neighbors.get(&mac()).expect("neighbor alive");
    assert_eq!(neighbor.metrics.cdr_tx, 5_000_000);
    assert_eq!(neighbor.metrics.latency_ms, 25);
}

#[test]
fn test_router_initiated_down_destroys_after_reply() {
    let mut radio = radio_in_session("");

    radio.node.on_command(AdminCommand::NeighborUp { mac: mac(), ipv4: None, ipv6: None });
    let up = radio.sent_with_code(MSG_NEIGHBOR_UP_REQ);
    radio
        .node
        .on_session_packet(&builder::neighbor_up_response(up[0].sequence, &mac(), STATUS_SUCCESS));
    radio.clear_captured();

    let seq = radio.next_router_seq();
    radio
        .node
        .on_session_packet(&builder::neighbor_down_request(seq, &mac(), STATUS_SUCCESS));

    let replies = radio.sent_with_code(MSG_NEIGHBOR_DOWN_RES);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].sequence, seq);
    assert_eq!(radio.node.peer().map(|p| p.neighbors.len()), Some(0));
    assert_eq!(radio.node.services().wheel.armed(), 0, "no timer leaks");
}

#[test]
fn test_down_retransmits_then_drops_without_ack() {
    let mut radio = radio_in_session(
        "DLEP_NEIGHBOR_DOWN_ACK_TMO 500\n\
         DLEP_NEIGHBOR_DOWN_MISSED_ACK_THRESHOLD 2\n\
         DLEP_NEIGHBOR_UPDATE_INTERVAL_TMO 5000\n",
    );

    radio.node.on_command(AdminCommand::NeighborUp { mac: mac(), ipv4: None, ipv6: None });
    let up = radio.sent_with_code(MSG_NEIGHBOR_UP_REQ);
    radio
        .node
        .on_session_packet(&builder::neighbor_up_response(up[0].sequence, &mac(), STATUS_SUCCESS));
    radio.clear_captured();

    radio.node.on_command(AdminCommand::NeighborDown { mac: mac() });
    assert_eq!(radio.sent_with_code(MSG_NEIGHBOR_DOWN_REQ).len(), 1);

    // One retransmission at +500 ms, then the threshold drops it cold.
    radio.advance(500);
    assert_eq!(radio.sent_with_code(MSG_NEIGHBOR_DOWN_REQ).len(), 2);
    radio.advance(500);
    assert_eq!(radio.sent_with_code(MSG_NEIGHBOR_DOWN_REQ).len(), 2, "bounded by threshold");
    assert_eq!(radio.node.peer().map(|p| p.neighbors.len()), Some(0));
    assert_eq!(radio.node.counters().down_ack_timeouts, 2);
}
