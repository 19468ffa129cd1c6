// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network transports: UDP multicast for discovery signals, framed TCP
//! for the session. Sockets are owned by the runtime loop and closed
//! deterministically on peer destruction.

pub mod multicast;
pub mod tcp;
pub mod udp;

pub use tcp::{PacketFrameCodec, Session, SessionListener};
pub use udp::{DiscoverySocket, MAX_DATAGRAM};
