// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event engine: message dispatch, the socket-free protocol core, and the
//! mio-driven runtime loop that hosts it.

pub mod demux;
pub mod node;
pub mod runtime;

pub use node::{FrameSink, Node, Services, TimerEvent};
pub use runtime::{Runtime, RuntimeHandle};
