// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Neighbor context: one wireless station visible to this radio.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::core::{AddressOp, MacAddress, Tmr};
use crate::protocol::constants::STATUS_SUCCESS;
use crate::protocol::{CreditWindow, LinkMetrics};

/// Neighbor lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    Initializing,
    Update,
    Terminating,
}

impl NeighborState {
    pub fn name(self) -> &'static str {
        match self {
            NeighborState::Initializing => "initializing",
            NeighborState::Update => "update",
            NeighborState::Terminating => "terminating",
        }
    }
}

/// One neighbor attached to a peer. The owning peer outlives it and
/// destroys it in its teardown path.
#[derive(Debug)]
pub struct Neighbor {
    pub mac_address: MacAddress,
    /// Locally metered id for the admin surface, never 0.
    pub local_id: u16,
    /// Caller-assigned id (config / admin).
    pub user_id: u32,

    pub state: NeighborState,
    pub status_code: u16,

    /// In-flight request correlation; 0 means nothing outstanding.
    pub expected_init_ack_sequence: u16,
    pub expected_update_ack_sequence: u16,
    pub expected_term_ack_sequence: u16,
    pub expected_address_response_sequence: u16,
    pub expected_link_char_response_sequence: u16,

    pub ipv4_address: Option<Ipv4Addr>,
    pub ipv6_address: Option<Ipv6Addr>,
    pub ipv6_subnet_prefix: u8,

    /// Staged address update, sent on the next address-request.
    pub update_ipv4_operation: AddressOp,
    pub update_ipv4_address: Ipv4Addr,
    pub update_ipv6_operation: AddressOp,
    pub update_ipv6_address: Ipv6Addr,

    /// Published as one block; never updated piecemeal.
    pub metrics: LinkMetrics,
    pub credits: CreditWindow,
    pub credit_supported: bool,

    pub up_ack_tmo_count: u32,
    pub update_ack_tmo_count: u32,
    pub down_ack_tmo_count: u32,

    /// Dead-man supervision: cleared on each activity-timer pass, set by
    /// any message received for this neighbor.
    pub activity_flag: bool,
    /// Seconds of allowed silence; 0 disables supervision.
    pub activity_duration: u32,

    pub init_ack_tmr: Tmr,
    pub update_ack_tmr: Tmr,
    pub activity_tmr: Tmr,
    pub update_interval_tmr: Tmr,
    pub term_ack_tmr: Tmr,
}

impl Neighbor {
    pub fn new(mac_address: MacAddress, local_id: u16, activity_duration: u32) -> Self {
        Neighbor {
            mac_address,
            local_id,
            user_id: 0,
            state: NeighborState::Initializing,
            status_code: STATUS_SUCCESS,
            expected_init_ack_sequence: 0,
            expected_update_ack_sequence: 0,
            expected_term_ack_sequence: 0,
            expected_address_response_sequence: 0,
            expected_link_char_response_sequence: 0,
            ipv4_address: None,
            ipv6_address: None,
            ipv6_subnet_prefix: 0,
            update_ipv4_operation: AddressOp::None,
            update_ipv4_address: Ipv4Addr::UNSPECIFIED,
            update_ipv6_operation: AddressOp::None,
            update_ipv6_address: Ipv6Addr::UNSPECIFIED,
            metrics: LinkMetrics::default(),
            credits: CreditWindow::default(),
            credit_supported: false,
            up_ack_tmo_count: 0,
            update_ack_tmo_count: 0,
            down_ack_tmo_count: 0,
            activity_flag: false,
            activity_duration,
            init_ack_tmr: Tmr::unarmed(),
            update_ack_tmr: Tmr::unarmed(),
            activity_tmr: Tmr::unarmed(),
            update_interval_tmr: Tmr::unarmed(),
            term_ack_tmr: Tmr::unarmed(),
        }
    }

    /// Pending staged address change of either family?
    pub fn has_staged_address_update(&self) -> bool {
        self.update_ipv4_operation != AddressOp::None
            || self.update_ipv6_operation != AddressOp::None
    }
}
