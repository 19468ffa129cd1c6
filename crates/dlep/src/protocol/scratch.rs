// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The scratch pad: every data item decoded from one inbound signal or
//! message, flattened into one field + present-flag per recognized type.
//!
//! A pad is born in the decoder, consumed by the dispatcher, scrubbed, and
//! dropped — it never outlives the loop iteration that received it.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::core::{AddressOp, MacAddress};
use crate::logging::DebugFlags;
use crate::protocol::constants::code_name;

/// Which frame class produced a pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadClass {
    /// Discovery-class frame from the UDP multicast path.
    Signal,
    /// Session-class frame from the TCP path.
    Message,
}

/// Decoded TLV snapshot for one inbound signal or message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchPad {
    pub class: PadClass,
    pub message_code: u16,

    pub sequence: u16,
    pub sequence_present: bool,

    pub version_major: u8,
    pub version_minor: u8,
    pub version_present: bool,

    pub peer_type: String,
    pub peer_type_present: bool,

    pub heartbeat_interval: u32,
    pub heartbeat_interval_present: bool,

    pub status_code: u16,
    pub status_present: bool,

    pub mac_address: MacAddress,
    pub mac_present: bool,

    pub ipv4_operation: AddressOp,
    pub ipv4_address: Ipv4Addr,
    pub ipv4_present: bool,

    pub ipv6_operation: AddressOp,
    pub ipv6_address: Ipv6Addr,
    pub ipv6_present: bool,

    pub ipv4_subnet_operation: AddressOp,
    pub ipv4_subnet: Ipv4Addr,
    pub ipv4_subnet_prefix: u8,
    pub ipv4_subnet_present: bool,

    pub ipv6_subnet_operation: AddressOp,
    pub ipv6_subnet: Ipv6Addr,
    pub ipv6_subnet_prefix: u8,
    pub ipv6_subnet_present: bool,

    pub mdr_tx: u64,
    pub mdr_tx_present: bool,
    pub mdr_rx: u64,
    pub mdr_rx_present: bool,
    pub cdr_tx: u64,
    pub cdr_tx_present: bool,
    pub cdr_rx: u64,
    pub cdr_rx_present: bool,

    pub latency: u64,
    pub latency_present: bool,

    pub resources_tx: u8,
    pub resources_tx_present: bool,
    pub resources_rx: u8,
    pub resources_rx_present: bool,
    pub rlq_tx: u8,
    pub rlq_tx_present: bool,
    pub rlq_rx: u8,
    pub rlq_rx_present: bool,

    pub mtu: u16,
    pub mtu_present: bool,

    pub credit_grant: u64,
    pub credit_grant_present: bool,
    pub credit_request: u64,
    pub credit_request_present: bool,
    pub credit_mrw: u64,
    pub credit_rrw: u64,
    pub credit_window_present: bool,
}

impl ScratchPad {
    pub fn new(class: PadClass) -> Self {
        ScratchPad {
            class,
            message_code: 0,
            sequence: 0,
            sequence_present: false,
            version_major: 0,
            version_minor: 0,
            version_present: false,
            peer_type: String::new(),
            peer_type_present: false,
            heartbeat_interval: 0,
            heartbeat_interval_present: false,
            status_code: 0,
            status_present: false,
            mac_address: MacAddress::zero(),
            mac_present: false,
            ipv4_operation: AddressOp::None,
            ipv4_address: Ipv4Addr::UNSPECIFIED,
            ipv4_present: false,
            ipv6_operation: AddressOp::None,
            ipv6_address: Ipv6Addr::UNSPECIFIED,
            ipv6_present: false,
            ipv4_subnet_operation: AddressOp::None,
            ipv4_subnet: Ipv4Addr::UNSPECIFIED,
            ipv4_subnet_prefix: 0,
            ipv4_subnet_present: false,
            ipv6_subnet_operation: AddressOp::None,
            ipv6_subnet: Ipv6Addr::UNSPECIFIED,
            ipv6_subnet_prefix: 0,
            ipv6_subnet_present: false,
            mdr_tx: 0,
            mdr_tx_present: false,
            mdr_rx: 0,
            mdr_rx_present: false,
            cdr_tx: 0,
            cdr_tx_present: false,
            cdr_rx: 0,
            cdr_rx_present: false,
            latency: 0,
            latency_present: false,
            resources_tx: 0,
            resources_tx_present: false,
            resources_rx: 0,
            resources_rx_present: false,
            rlq_tx: 0,
            rlq_tx_present: false,
            rlq_rx: 0,
            rlq_rx_present: false,
            mtu: 0,
            mtu_present: false,
            credit_grant: 0,
            credit_grant_present: false,
            credit_request: 0,
            credit_request_present: false,
            credit_mrw: 0,
            credit_rrw: 0,
            credit_window_present: false,
        }
    }

    /// Return the pad to its empty state so the next message starts clean.
    pub fn scrub(&mut self) {
        let class = self.class;
        *self = ScratchPad::new(class);
    }

    /// True when no data item flag is set.
    pub fn is_clean(&self) -> bool {
        let probe = ScratchPad::new(self.class);
        *self == probe
    }

    /// Trace the pad under the `SCRATCH` flag. One view serves both frame
    /// classes; the class tag keeps signal and message output apart.
    pub fn show(&self, flags: DebugFlags) {
        if !flags.is_set(DebugFlags::SCRATCH) {
            return;
        }
        let class = match self.class {
            PadClass::Signal => "signal",
            PadClass::Message => "message",
        };
        log::debug!(
            "[SCRATCH] {} pad: code={} ({}) seq={}",
            class,
            self.message_code,
            code_name(self.message_code, self.class == PadClass::Signal),
            if self.sequence_present { self.sequence as i32 } else { -1 },
        );
        if self.peer_type_present {
            log::debug!("[SCRATCH]   peer-type='{}'", self.peer_type);
        }
        if self.heartbeat_interval_present {
            log::debug!("[SCRATCH]   heartbeat-interval={}s", self.heartbeat_interval);
        }
        if self.status_present {
            log::debug!("[SCRATCH]   status={}", self.status_code);
        }
        if self.mac_present {
            log::debug!("[SCRATCH]   mac={}", self.mac_address);
        }
        if self.ipv4_present {
            log::debug!("[SCRATCH]   ipv4={} op={}", self.ipv4_address, self.ipv4_operation);
        }
        if self.ipv6_present {
            log::debug!("[SCRATCH]   ipv6={} op={}", self.ipv6_address, self.ipv6_operation);
        }
        if self.mdr_tx_present || self.cdr_tx_present {
            log::debug!(
                "[SCRATCH]   mdr tx/rx={}/{} cdr tx/rx={}/{} latency={}ms",
                self.mdr_tx,
                self.mdr_rx,
                self.cdr_tx,
                self.cdr_rx,
                self.latency
            );
        }
        if self.rlq_tx_present || self.resources_tx_present {
            log::debug!(
                "[SCRATCH]   rlq tx/rx={}/{} resources tx/rx={}/{}",
                self.rlq_tx,
                self.rlq_rx,
                self.resources_tx,
                self.resources_rx
            );
        }
    }
}
