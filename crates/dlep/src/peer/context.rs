// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer context: everything owned on behalf of one router association.
//!
//! The context copies its timer configuration out of [`DlepConfig`] at
//! creation so live config edits never perturb an active session. The
//! sequence meter and the id meters skip zero: zero marks "no sequence"
//! in the expected-ack slots.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::config::DlepConfig;
use crate::core::{AddressOp, MacAddress, Tmr};
use crate::neighbor::Neighbor;
use crate::protocol::constants::*;

/// Peer lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Discovery,
    Initialization,
    InSession,
    Terminating,
    Reset,
}

impl PeerState {
    pub fn name(self) -> &'static str {
        match self {
            PeerState::Discovery => "discovery",
            PeerState::Initialization => "initialization",
            PeerState::InSession => "in-session",
            PeerState::Terminating => "terminating",
            PeerState::Reset => "reset",
        }
    }
}

/// Timer configuration snapshot copied down from the config at peer init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimers {
    /// Seconds between peer offers while in discovery.
    pub peer_offer_interval: u32,
    /// Seconds between heartbeats (local side of the negotiation).
    pub peer_heartbeat_interval: u32,
    pub peer_heartbeat_missed_threshold: u32,
    /// Milliseconds to wait for a peer-term-response.
    pub peer_term_ack_tmo: u32,
    pub peer_term_missed_ack_threshold: u32,
    /// Milliseconds to wait for a neighbor-up-response.
    pub neighbor_up_ack_tmo: u32,
    pub neighbor_up_missed_ack_threshold: u32,
    /// Milliseconds between periodic neighbor metric updates. 0 disables.
    pub neighbor_update_interval_tmo: u32,
    /// Seconds of allowed neighbor silence. 0 disables supervision.
    pub neighbor_activity_timer: u32,
    /// Milliseconds to wait for a neighbor-down-response.
    pub neighbor_down_ack_tmo: u32,
    pub neighbor_down_missed_ack_threshold: u32,
}

impl SessionTimers {
    pub fn from_config(cfg: &DlepConfig) -> Self {
        SessionTimers {
            peer_offer_interval: cfg.peer_offer_interval,
            peer_heartbeat_interval: cfg.peer_heartbeat_interval,
            peer_heartbeat_missed_threshold: cfg.peer_heartbeat_missed_threshold,
            peer_term_ack_tmo: cfg.peer_term_ack_tmo,
            peer_term_missed_ack_threshold: cfg.peer_term_missed_ack_threshold,
            neighbor_up_ack_tmo: cfg.neighbor_up_ack_tmo,
            neighbor_up_missed_ack_threshold: cfg.neighbor_up_missed_ack_threshold,
            neighbor_update_interval_tmo: cfg.neighbor_update_interval_tmo,
            neighbor_activity_timer: cfg.neighbor_activity_timer,
            neighbor_down_ack_tmo: cfg.neighbor_down_ack_tmo,
            neighbor_down_missed_ack_threshold: cfg.neighbor_down_missed_ack_threshold,
        }
    }
}

/// One router association.
#[derive(Debug)]
pub struct Peer {
    /// Locally metered id, never 0.
    pub peer_id: u32,
    /// Ids the router declared about itself.
    pub router_id: u32,
    pub client_id: u32,
    /// The router's peer-type description from its init-request.
    pub peer_type_description: String,

    pub peer_ipv4: Option<Ipv4Addr>,
    pub peer_udp_port: u16,
    pub peer_tcp_port: u16,
    /// Where offers are sent; learned from the discovery source address.
    pub udp_endpoint: Option<SocketAddr>,

    sequence: u16,
    pub state: PeerState,
    /// Status of the last operation, reported in termination messages.
    pub status_code: u16,

    /// In-flight request correlation; 0 means nothing outstanding.
    pub expected_peer_offer_sequence: u16,
    pub expected_peer_term_ack_sequence: u16,
    pub expected_peer_update_response_sequence: u16,

    /// Heartbeat send cadence adopted from the router's init-request.
    pub heartbeat_send_interval: u32,
    /// Set on every received heartbeat, consumed by the receive window.
    pub heartbeat_received_flag: bool,
    pub heartbeat_missed_count: u32,
    pub peer_offer_timeout_count: u32,
    pub peer_term_ack_timeout_count: u32,

    pub timers: SessionTimers,

    /// Which signals / data items this association assumes support for.
    pub optional_signal: u32,
    pub optional_data_item: u32,

    /// Whether the router acks neighbor-metrics (arms the update-ack timer).
    pub update_acks_negotiated: bool,

    /// Staged peer-level layer-3 address change.
    pub update_ipv4_operation: AddressOp,
    pub update_ipv4_address: Ipv4Addr,
    pub update_ipv6_operation: AddressOp,
    pub update_ipv6_address: Ipv6Addr,

    pub peer_offer_tmr: Tmr,
    pub heartbeat_send_tmr: Tmr,
    pub heartbeat_window_tmr: Tmr,
    pub peer_term_ack_tmr: Tmr,

    /// Unique by MAC; destroyed with the peer.
    pub neighbors: HashMap<MacAddress, Neighbor>,
}

impl Peer {
    pub fn new(peer_id: u32, cfg: &DlepConfig) -> Self {
        Peer {
            peer_id,
            router_id: 0,
            client_id: 0,
            peer_type_description: "no peer description".to_string(),
            peer_ipv4: cfg.router_ipv4,
            peer_udp_port: cfg.router_udp_port,
            peer_tcp_port: cfg.router_tcp_port,
            udp_endpoint: cfg
                .router_ipv4
                .map(|addr| SocketAddr::new(addr.into(), cfg.router_udp_port)),
            sequence: 0,
            state: PeerState::Discovery,
            status_code: STATUS_SUCCESS,
            expected_peer_offer_sequence: 0,
            expected_peer_term_ack_sequence: 0,
            expected_peer_update_response_sequence: 0,
            heartbeat_send_interval: 0,
            heartbeat_received_flag: false,
            heartbeat_missed_count: 0,
            peer_offer_timeout_count: 0,
            peer_term_ack_timeout_count: 0,
            timers: SessionTimers::from_config(cfg),
            optional_signal: default_optional_signals(),
            optional_data_item: default_optional_data_items(),
            update_acks_negotiated: false,
            update_ipv4_operation: AddressOp::None,
            update_ipv4_address: Ipv4Addr::UNSPECIFIED,
            update_ipv6_operation: AddressOp::None,
            update_ipv6_address: Ipv6Addr::UNSPECIFIED,
            peer_offer_tmr: Tmr::unarmed(),
            heartbeat_send_tmr: Tmr::unarmed(),
            heartbeat_window_tmr: Tmr::unarmed(),
            peer_term_ack_tmr: Tmr::unarmed(),
            neighbors: HashMap::new(),
        }
    }

    /// Next outbound sequence number; strictly increasing mod 2^16, never 0.
    pub fn next_sequence(&mut self) -> u16 {
        self.sequence = self.sequence.wrapping_add(1);
        if self.sequence == 0 {
            self.sequence = 1;
        }
        self.sequence
    }

    /// Last sequence handed out (tests and trace output).
    pub fn current_sequence(&self) -> u16 {
        self.sequence
    }

    pub fn neighbor_by_mac(&mut self, mac: &MacAddress) -> Option<&mut Neighbor> {
        self.neighbors.get_mut(mac)
    }
}

/// Signal/message support assumed of a fresh association: everything in
/// the recognized set minus the update and link-characteristics exchanges,
/// which need an explicit opt-in from the router.
pub fn default_optional_signals() -> u32 {
    let mut mask = !(!0u32 << (MAX_MESSAGE_CODE - 1));
    mask &= !(1 << (MSG_PEER_UPDATE_RES - 1));
    mask &= !(1 << (MSG_PEER_UPDATE_REQ - 1));
    mask &= !(1 << (MSG_LINK_CHAR_RES - 1));
    mask &= !(1 << (MSG_LINK_CHAR_REQ - 1));
    mask
}

/// Data-item support assumed of a fresh association: the core metric and
/// address items, minus directional metrics, credits, subnets and vendor
/// extensions.
pub fn default_optional_data_items() -> u32 {
    let mut mask = !(!0u32 << (MAX_DATA_ITEM - 1));
    mask &= !(1 << (TLV_LINK_RESOURCES_METRIC_RX - 1));
    mask &= !(1 << (TLV_LINK_RESOURCES_METRIC_TX - 1));
    mask &= !(1 << (TLV_LINK_RLQ_METRIC_TX - 1));
    mask &= !(1 << (TLV_LINK_RLQ_METRIC_RX - 1));
    mask &= !(1 << (TLV_CREDIT_WINDOW_STATUS - 1));
    mask &= !(1 << (TLV_CREDIT_GRANT - 1));
    mask &= !(1 << (TLV_CREDIT_REQUEST - 1));
    mask &= !(1 << (TLV_VENDOR_EXTENSION - 1));
    mask &= !(1 << (TLV_IPV4_ATTACHED_SUBNET - 1));
    mask &= !(1 << (TLV_IPV6_ATTACHED_SUBNET - 1));
    mask
}
