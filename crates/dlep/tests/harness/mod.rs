// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared scenario harness: a `Node` wired to a capture sink and a
//! manual clock, plus a scripted router on the far side.

// Each test binary uses its own subset of the harness.
#![allow(dead_code)]

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use dlep::config::DlepConfig;
use dlep::engine::{FrameSink, Node};
use dlep::logging::DebugFlags;
use dlep::peer::PeerState;
use dlep::protocol::builder;
use dlep::protocol::{decode_packet, ScratchPad};

/// Everything the radio tried to put on the wire.
#[derive(Default)]
pub struct Captured {
    pub signals: Vec<Vec<u8>>,
    pub messages: Vec<Vec<u8>>,
    pub closes: u32,
}

pub struct CaptureSink(pub Arc<Mutex<Captured>>);

impl FrameSink for CaptureSink {
    fn send_signal(&mut self, _dest: Option<SocketAddr>, frame: &[u8]) -> io::Result<()> {
        self.0.lock().unwrap().signals.push(frame.to_vec());
        Ok(())
    }

    fn send_message(&mut self, frame: &[u8]) -> io::Result<()> {
        self.0.lock().unwrap().messages.push(frame.to_vec());
        Ok(())
    }

    fn close_session(&mut self) {
        self.0.lock().unwrap().closes += 1;
    }
}

/// A radio `Node` under test plus the scripted router peer.
pub struct TestRadio {
    pub node: Node,
    pub captured: Arc<Mutex<Captured>>,
    pub now_ms: u64,
    router_seq: u16,
}

impl TestRadio {
    pub fn new(cfg: DlepConfig) -> Self {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let node = Node::new(cfg, Box::new(CaptureSink(Arc::clone(&captured))));
        TestRadio { node, captured, now_ms: 0, router_seq: 0 }
    }

    pub fn router_udp(&self) -> SocketAddr {
        SocketAddr::new(Ipv4Addr::new(10, 0, 0, 1).into(), 5000)
    }

    pub fn router_tcp(&self) -> SocketAddr {
        SocketAddr::new(Ipv4Addr::new(10, 0, 0, 1).into(), 5000)
    }

    pub fn next_router_seq(&mut self) -> u16 {
        self.router_seq += 1;
        self.router_seq
    }

    /// Advance the clock in loop-sized (100 ms) ticks.
    pub fn advance(&mut self, ms: u64) {
        let target = self.now_ms + ms;
        while self.now_ms < target {
            self.now_ms = (self.now_ms + 100).min(target);
            self.node.on_tick(self.now_ms);
        }
    }

    /// Run discovery + session open + init exchange; leaves the peer
    /// in-session with the capture buffers cleared.
    pub fn establish(&mut self, router_heartbeat_s: u32) {
        let seq = self.next_router_seq();
        let discovery = builder::peer_discovery(seq, true, "core-router");
        let src = self.router_udp();
        self.node.on_signal_datagram(src, &discovery);
        assert_eq!(self.peer_state(), Some(PeerState::Discovery));
        assert!(!self.captured.lock().unwrap().signals.is_empty(), "no offer sent");

        self.node.on_session_open(self.router_tcp());
        assert_eq!(self.peer_state(), Some(PeerState::Initialization));

        let seq = self.next_router_seq();
        let init = builder::peer_init_request(seq, "core-router", router_heartbeat_s);
        self.node.on_session_packet(&init);
        assert_eq!(self.peer_state(), Some(PeerState::InSession));

        self.clear_captured();
    }

    pub fn peer_state(&self) -> Option<PeerState> {
        self.node.peer().map(|p| p.state)
    }

    pub fn clear_captured(&mut self) {
        let mut captured = self.captured.lock().unwrap();
        captured.signals.clear();
        captured.messages.clear();
    }

    /// Every pad the radio emitted on the session, in order.
    pub fn sent_messages(&self) -> Vec<ScratchPad> {
        let captured = self.captured.lock().unwrap();
        captured
            .messages
            .iter()
            .flat_map(|frame| {
                decode_packet(frame, DebugFlags::default())
                    .expect("radio emitted an undecodable frame")
                    .pads
            })
            .collect()
    }

    /// Emitted pads with the given message code.
    pub fn sent_with_code(&self, code: u16) -> Vec<ScratchPad> {
        self.sent_messages()
            .into_iter()
            .filter(|pad| pad.message_code == code)
            .collect()
    }
}
