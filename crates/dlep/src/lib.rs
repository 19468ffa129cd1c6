// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # DLEP — radio-side Dynamic Link Exchange Protocol agent
//!
//! A radio-side DLEP implementation: it discovers its attached router
//! over UDP multicast, runs an RFC5444-style TLV session over TCP, and
//! exports per-neighbor radio link metrics (data rates, resources,
//! latency, link quality) in near-real-time so the router can route on
//! live link conditions.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Runtime (mio loop)                          |
//! |   UDP discovery | TCP session | admin waker | 100 ms tick          |
//! +--------------------------------------------------------------------+
//! |                             Node                                   |
//! |   decode -> scratch pad -> dispatch -> FSM event -> actions        |
//! +--------------------------------------------------------------------+
//! |        Peer FSM          |            Neighbor FSMs                |
//! |  discovery->in-session   |   initializing->update->terminating     |
//! |  ->terminating->reset    |   (one per discovered station)          |
//! +--------------------------------------------------------------------+
//! |   Wire codec (builder/decoder) | Timer wheel | Transports          |
//! +--------------------------------------------------------------------+
//! ```
//!
//! Everything protocol-visible runs in one logical thread: the loop
//! multiplexes socket readiness and timer ticks, and every FSM action is
//! a bounded-time encode + enqueue. The admin surface posts commands
//! through a queue instead of touching the peer table.
//!
//! ## Quick start
//!
//! ```no_run
//! use dlep::config::DlepConfig;
//! use dlep::engine::Runtime;
//!
//! fn main() -> dlep::error::Result<()> {
//!     let cfg = DlepConfig::load(std::path::Path::new("radio.conf"))?;
//!     let (runtime, handle) = Runtime::new(cfg)?;
//!     std::thread::spawn(move || runtime.run());
//!     // ... drive `handle` from the CLI ...
//!     # let _ = handle;
//!     Ok(())
//! }
//! ```

/// Admin command queue and state snapshots.
pub mod admin;
/// Startup configuration file parsing with clamped numerics.
pub mod config;
/// Leaf utilities: addresses, timing wheel, FSM tables.
pub mod core;
/// Message dispatch, the protocol core, and the event loop.
pub mod engine;
/// Error taxonomy.
pub mod error;
/// Debug-flag word and console logger.
pub mod logging;
/// Metric acquisition seam and the demo generator.
pub mod metrics;
/// Per-neighbor context and lifecycle FSM.
pub mod neighbor;
/// Router-peer context and lifecycle FSM.
pub mod peer;
/// RFC5444-style wire codec.
pub mod protocol;
/// UDP discovery and framed TCP session transports.
pub mod transport;

pub use crate::admin::{AdminCommand, Counters, StatusSnapshot};
pub use crate::config::DlepConfig;
pub use crate::core::{AddressOp, MacAddress};
pub use crate::engine::{FrameSink, Node, Runtime, RuntimeHandle};
pub use crate::error::{Error, Result};
pub use crate::logging::DebugFlags;
pub use crate::metrics::{MetricsSource, RampMetrics, StaticMetrics};
pub use crate::protocol::{CreditWindow, LinkMetrics};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
