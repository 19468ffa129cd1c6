// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Metric acquisition seam.
//!
//! A real deployment implements [`MetricsSource`] against the radio's
//! modem; the default [`RampMetrics`] fabricates a demo profile so the
//! agent can exercise routers without hardware. The source is polled from
//! the periodic neighbor-update timer, never from its own thread.

use crate::core::MacAddress;
use crate::protocol::LinkMetrics;

/// Supplies a fresh metric block for one neighbor.
pub trait MetricsSource: Send {
    fn sample(&mut self, mac: &MacAddress, current: &LinkMetrics) -> LinkMetrics;
}

/// Demo profile: CDR ramps 0 -> 99 Mb/s and back in 11 Mb/s steps while
/// MDR stays pinned at 110 Mb/s, quality and resources at 100.
pub struct RampMetrics {
    index: i32,
    direction: i32,
}

impl RampMetrics {
    pub fn new() -> Self {
        RampMetrics { index: 0, direction: 1 }
    }
}

impl Default for RampMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for RampMetrics {
    fn sample(&mut self, _mac: &MacAddress, current: &LinkMetrics) -> LinkMetrics {
        let cdr = self.index as u64 * 11_000_000;
        let metrics = LinkMetrics {
            rlq_tx: 100,
            rlq_rx: 100,
            resources_tx: 100,
            resources_rx: 100,
            latency_ms: 0,
            cdr_tx: cdr,
            cdr_rx: cdr,
            mdr_tx: 110_000_000,
            mdr_rx: 110_000_000,
            mtu: current.mtu,
        };

        if self.index >= 9 {
            self.direction = -1;
        } else if self.index == 0 {
            self.direction = 1;
        }
        self.index += self.direction;

        metrics
    }
}

/// Fixed block, for tests and for radios that push metrics externally.
pub struct StaticMetrics(pub LinkMetrics);

impl MetricsSource for StaticMetrics {
    fn sample(&mut self, _mac: &MacAddress, _current: &LinkMetrics) -> LinkMetrics {
        self.0
    }
}
