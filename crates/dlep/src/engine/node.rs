// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The socket-free protocol core.
//!
//! [`Node`] owns the peer slot, the timer wheel, the counters and the
//! frame sink; the runtime feeds it socket readiness, received bytes and
//! wall-clock ticks. Everything here runs in one logical thread, so no
//! state needs locking. Tests drive a `Node` directly with a capture sink
//! and a manual clock.

use std::io;
use std::net::SocketAddr;

use crate::admin::{AdminCommand, Counters, NeighborSnapshot, PeerSnapshot, StatusSnapshot};
use crate::config::DlepConfig;
use crate::core::{MacAddress, TimerWheel};
use crate::debug_flag;
use crate::engine::demux;
use crate::logging::DebugFlags;
use crate::metrics::{MetricsSource, RampMetrics};
use crate::neighbor::{fsm as neighbor_fsm, Neighbor, NeighborEvent};
use crate::peer::context::PeerState;
use crate::peer::{fsm as peer_fsm, Peer, PeerEvent};
use crate::protocol::builder;
use crate::protocol::constants::STATUS_SUCCESS;
use crate::protocol::{decode_packet, PadClass};

/// Timer expirations delivered by the wheel back into the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    PeerOffer { peer_id: u32 },
    PeerHeartbeatSend { peer_id: u32 },
    PeerHeartbeatWindow { peer_id: u32 },
    PeerTermAck { peer_id: u32 },
    NeighborInitAck { peer_id: u32, mac: MacAddress },
    NeighborUpdateAck { peer_id: u32, mac: MacAddress },
    NeighborUpdateInterval { peer_id: u32, mac: MacAddress },
    NeighborActivity { peer_id: u32, mac: MacAddress },
    NeighborTermAck { peer_id: u32, mac: MacAddress },
}

/// Where finished frames go. The runtime backs this with real sockets;
/// tests capture the frames instead.
pub trait FrameSink: Send {
    /// Send a signal-class frame toward the router's UDP endpoint.
    fn send_signal(&mut self, dest: Option<SocketAddr>, frame: &[u8]) -> io::Result<()>;
    /// Send a message-class frame down the session.
    fn send_message(&mut self, frame: &[u8]) -> io::Result<()>;
    /// Deterministically close the session socket.
    fn close_session(&mut self);
}

/// Shared machinery handed to every FSM action.
pub struct Services {
    pub wheel: TimerWheel<TimerEvent>,
    pub sink: Box<dyn FrameSink>,
    pub metrics: Box<dyn MetricsSource>,
    pub flags: DebugFlags,
    pub counters: Counters,
    /// Local configuration (the peer keeps its own session snapshot).
    pub cfg: DlepConfig,
}

impl Services {
    /// Count, trace and send one signal frame. Discovery send failures
    /// are not fatal; the offer timer retries.
    pub fn send_signal(&mut self, dest: Option<SocketAddr>, frame: &[u8]) {
        self.counters.signals_tx += 1;
        debug_flag!(self.flags, OUTGOING, "[UDP] tx signal, {} bytes to {:?}", frame.len(), dest);
        if let Err(err) = self.sink.send_signal(dest, frame) {
            self.counters.send_failures += 1;
            debug_flag!(self.flags, ERROR, "[UDP] signal send failed: {}", err);
        }
    }

    /// Count, trace and send one session frame. A failed session send
    /// surfaces as a transport close on the next loop pass.
    pub fn send_message(&mut self, frame: &[u8]) {
        self.counters.messages_tx += 1;
        debug_flag!(self.flags, OUTGOING, "[TCP] tx message, {} bytes", frame.len());
        if let Err(err) = self.sink.send_message(frame) {
            self.counters.send_failures += 1;
            debug_flag!(self.flags, ERROR, "[TCP] message send failed: {}", err);
        }
    }
}

/// The protocol core: one radio, at most one router association.
pub struct Node {
    services: Services,
    peer: Option<Peer>,
    peer_id_meter: u32,
    neighbor_id_meter: u16,
}

impl Node {
    pub fn new(cfg: DlepConfig, sink: Box<dyn FrameSink>) -> Self {
        let flags = DebugFlags::new(cfg.debug_flags);
        Node {
            services: Services {
                wheel: TimerWheel::new(),
                sink,
                metrics: Box::new(RampMetrics::new()),
                flags,
                counters: Counters::default(),
                cfg,
            },
            peer: None,
            peer_id_meter: 0,
            neighbor_id_meter: 0,
        }
    }

    /// Replace the demo metric generator.
    pub fn set_metrics_source(&mut self, source: Box<dyn MetricsSource>) {
        self.services.metrics = source;
    }

    pub fn peer(&self) -> Option<&Peer> {
        self.peer.as_ref()
    }

    pub fn counters(&self) -> &Counters {
        &self.services.counters
    }

    pub fn flags(&self) -> DebugFlags {
        self.services.flags
    }

    pub fn config(&self) -> &DlepConfig {
        &self.services.cfg
    }

    /// Read-only view of the shared machinery (tests assert against the
    /// wheel and counters through this).
    pub fn services(&self) -> &Services {
        &self.services
    }

    // ------------------------------------------------------------------
    // Loop entry points
    // ------------------------------------------------------------------

    /// Launch-time start: create the peer and, when the router endpoint
    /// is already configured, begin offering immediately.
    pub fn start(&mut self) {
        if self.peer.is_some() {
            return;
        }
        self.create_peer();
        if let Some(peer) = self.peer.as_mut() {
            if peer.udp_endpoint.is_some() {
                peer_fsm::engine(&mut self.services, peer, PeerEvent::OfferIntervalExpiry, None);
            }
        }
    }

    /// Advance the wheel and run every expiration due.
    pub fn on_tick(&mut self, now_ms: u64) {
        let fired = self.services.wheel.tick(now_ms);
        for event in fired {
            self.on_timer(event);
            self.reap();
        }
    }

    /// One datagram from the discovery socket.
    pub fn on_signal_datagram(&mut self, src: SocketAddr, bytes: &[u8]) {
        self.services.counters.signals_rx += 1;
        debug_flag!(
            self.services.flags,
            INCOMING,
            "[UDP] rx {} bytes from {}",
            bytes.len(),
            src
        );

        let packet = match decode_packet(bytes, self.services.flags) {
            Ok(packet) => packet,
            Err(err) => {
                self.services.counters.note_decode_error(&err);
                debug_flag!(self.services.flags, DECODER, "[CODEC] signal rejected: {}", err);
                return;
            }
        };
        if packet.class != PadClass::Signal {
            debug_flag!(
                self.services.flags,
                ERROR,
                "[UDP] message-class packet on the discovery path, dropped"
            );
            return;
        }

        if self.peer.is_none() {
            if !self.services.cfg.discovery_start {
                debug_flag!(self.services.flags, UDP, "[UDP] discovery ignored, not started");
                return;
            }
            self.create_peer();
        }

        for mut pad in packet.pads {
            if let Some(peer) = self.peer.as_mut() {
                // Offers go back to wherever the discovery came from.
                peer.udp_endpoint = Some(src);
                demux::dispatch(&mut self.services, peer, &pad);
            }
            pad.scrub();
            self.reap();
        }
    }

    /// The router opened the session.
    pub fn on_session_open(&mut self, remote: SocketAddr) {
        log::info!("[TCP] session open from {remote}");
        if self.peer.is_none() {
            // Statically configured router connecting without discovery.
            self.create_peer();
        }
        if let Some(peer) = self.peer.as_mut() {
            peer_fsm::engine(&mut self.services, peer, PeerEvent::SessionOpen, None);
        }
    }

    /// One framed packet from the session.
    pub fn on_session_packet(&mut self, bytes: &[u8]) {
        self.services.counters.messages_rx += 1;
        debug_flag!(self.services.flags, INCOMING, "[TCP] rx {} bytes", bytes.len());

        let packet = match decode_packet(bytes, self.services.flags) {
            Ok(packet) => packet,
            Err(err) => {
                // Local failure: drop the packet, keep the session.
                self.services.counters.note_decode_error(&err);
                debug_flag!(self.services.flags, DECODER, "[CODEC] message rejected: {}", err);
                return;
            }
        };
        if packet.class != PadClass::Message {
            debug_flag!(
                self.services.flags,
                ERROR,
                "[TCP] signal-class packet on the session path, dropped"
            );
            return;
        }

        for mut pad in packet.pads {
            let Some(peer) = self.peer.as_mut() else {
                debug_flag!(self.services.flags, ERROR, "[TCP] message without a peer, dropped");
                return;
            };
            demux::dispatch(&mut self.services, peer, &pad);
            pad.scrub();
            self.reap();
        }
    }

    /// Zero-byte read: the router closed the session.
    pub fn on_session_closed(&mut self) {
        if let Some(peer) = self.peer.as_mut() {
            log::info!("[TCP] session closed by peer");
            peer_fsm::engine(&mut self.services, peer, PeerEvent::SessionClosed, None);
            self.reap();
        }
    }

    /// One command from the admin queue.
    pub fn on_command(&mut self, command: AdminCommand) {
        match command {
            AdminCommand::Start => self.start(),
            AdminCommand::Stop => self.stop(),
            AdminCommand::NeighborUp { mac, ipv4, ipv6 } => self.neighbor_up(mac, ipv4, ipv6),
            AdminCommand::NeighborDown { mac } => {
                if let Some(peer) = self.peer.as_mut() {
                    if peer.neighbors.contains_key(&mac) {
                        neighbor_fsm::engine(
                            &mut self.services,
                            peer,
                            mac,
                            NeighborEvent::Term,
                            None,
                        );
                    } else {
                        log::warn!("[NEIGHBOR] down for unknown {mac}");
                    }
                }
            }
            AdminCommand::NeighborAddress { mac, ipv4, ipv6 } => {
                if let Some(peer) = self.peer.as_mut() {
                    let Some(n) = peer.neighbor_by_mac(&mac) else {
                        log::warn!("[NEIGHBOR] address update for unknown {mac}");
                        return;
                    };
                    if let Some((op, addr)) = ipv4 {
                        n.update_ipv4_operation = op;
                        n.update_ipv4_address = addr;
                    }
                    if let Some((op, addr)) = ipv6 {
                        n.update_ipv6_operation = op;
                        n.update_ipv6_address = addr;
                    }
                    neighbor_fsm::engine(
                        &mut self.services,
                        peer,
                        mac,
                        NeighborEvent::AddressRequest,
                        None,
                    );
                }
            }
            AdminCommand::PeerAddress { ipv4, ipv6 } => {
                if let Some(peer) = self.peer.as_mut() {
                    if let Some((op, addr)) = ipv4 {
                        peer.update_ipv4_operation = op;
                        peer.update_ipv4_address = addr;
                    }
                    if let Some((op, addr)) = ipv6 {
                        peer.update_ipv6_operation = op;
                        peer.update_ipv6_address = addr;
                    }
                    peer_fsm::engine(
                        &mut self.services,
                        peer,
                        PeerEvent::UpdateAddrRequest,
                        None,
                    );
                }
            }
            AdminCommand::SetDebugFlags(mask) => {
                self.services.flags = DebugFlags::new(mask);
            }
            AdminCommand::Show(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
        self.reap();
    }

    /// Consistent read of everything the `show` tree prints.
    pub fn snapshot(&self) -> StatusSnapshot {
        let peer = self.peer.as_ref().map(|peer| PeerSnapshot {
            peer_id: peer.peer_id,
            state: peer.state.name(),
            description: peer.peer_type_description.clone(),
            ipv4: peer.peer_ipv4,
            udp_port: peer.peer_udp_port,
            tcp_port: peer.peer_tcp_port,
            sequence: peer.current_sequence(),
            heartbeat_missed_count: peer.heartbeat_missed_count,
            status_code: peer.status_code,
            neighbors: peer
                .neighbors
                .values()
                .map(|n| NeighborSnapshot {
                    mac: n.mac_address,
                    local_id: n.local_id,
                    state: n.state.name(),
                    ipv4: n.ipv4_address,
                    ipv6: n.ipv6_address,
                    metrics: n.metrics,
                    up_ack_tmo_count: n.up_ack_tmo_count,
                    update_ack_tmo_count: n.update_ack_tmo_count,
                    down_ack_tmo_count: n.down_ack_tmo_count,
                    activity_flag: n.activity_flag,
                })
                .collect(),
        });
        StatusSnapshot {
            sim_name: self.services.cfg.sim_name.clone(),
            debug_flags: self.services.flags.0,
            peer,
            counters: self.services.counters.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn create_peer(&mut self) {
        self.peer_id_meter = self.peer_id_meter.wrapping_add(1);
        if self.peer_id_meter == 0 {
            self.peer_id_meter = 1;
        }
        let peer = Peer::new(self.peer_id_meter, &self.services.cfg);
        log::info!("[PEER] peer_id={} created in {}", peer.peer_id, peer.state.name());
        self.peer = Some(peer);
    }

    fn stop(&mut self) {
        let Some(state) = self.peer.as_ref().map(|p| p.state) else { return };
        match state {
            PeerState::Discovery | PeerState::Initialization | PeerState::Reset => {
                self.teardown_peer();
            }
            PeerState::InSession => {
                if let Some(peer) = self.peer.as_mut() {
                    peer.status_code = STATUS_SUCCESS;
                    peer_fsm::engine(&mut self.services, peer, PeerEvent::StartTermination, None);
                }
            }
            PeerState::Terminating => {}
        }
    }

    fn neighbor_up(
        &mut self,
        mac: MacAddress,
        ipv4: Option<std::net::Ipv4Addr>,
        ipv6: Option<std::net::Ipv6Addr>,
    ) {
        let Some(peer) = self.peer.as_mut() else {
            log::warn!("[NEIGHBOR] {mac} discovered without a peer, dropped");
            return;
        };
        if peer.state != PeerState::InSession {
            log::warn!("[NEIGHBOR] {mac} discovered in {}, dropped", peer.state.name());
            return;
        }
        if peer.neighbors.contains_key(&mac) {
            debug_flag!(self.services.flags, NEIGHBOR, "[NEIGHBOR] {} already known", mac);
            return;
        }

        self.neighbor_id_meter = self.neighbor_id_meter.wrapping_add(1);
        if self.neighbor_id_meter == 0 {
            self.neighbor_id_meter = 1;
        }

        let mut neighbor = Neighbor::new(
            mac,
            self.neighbor_id_meter,
            peer.timers.neighbor_activity_timer,
        );
        neighbor.ipv4_address = ipv4;
        neighbor.ipv6_address = ipv6;
        // First metric for a new MAC is what triggers the handshake.
        neighbor.metrics = self.services.metrics.sample(&mac, &neighbor.metrics);

        let seq = peer.next_sequence();
        neighbor.expected_init_ack_sequence = seq;
        let frame = builder::neighbor_up_request(
            seq,
            &builder::NeighborUp {
                mac,
                metrics: &neighbor.metrics,
                ipv4: neighbor.ipv4_address,
                ipv6: neighbor.ipv6_address,
                credits: neighbor.credit_supported.then_some(&neighbor.credits),
            },
        );
        self.services.send_message(&frame);

        let event = TimerEvent::NeighborInitAck { peer_id: peer.peer_id, mac };
        self.services.wheel.start(
            &mut neighbor.init_ack_tmr,
            u64::from(peer.timers.neighbor_up_ack_tmo),
            false,
            event,
        );

        debug_flag!(
            self.services.flags,
            NEIGHBOR,
            "[NEIGHBOR] {} local_id={} created, up-request seq={}",
            mac,
            neighbor.local_id,
            seq
        );
        peer.neighbors.insert(mac, neighbor);
    }

    fn on_timer(&mut self, event: TimerEvent) {
        let Some(peer) = self.peer.as_mut() else { return };
        let owner = match event {
            TimerEvent::PeerOffer { peer_id }
            | TimerEvent::PeerHeartbeatSend { peer_id }
            | TimerEvent::PeerHeartbeatWindow { peer_id }
            | TimerEvent::PeerTermAck { peer_id }
            | TimerEvent::NeighborInitAck { peer_id, .. }
            | TimerEvent::NeighborUpdateAck { peer_id, .. }
            | TimerEvent::NeighborUpdateInterval { peer_id, .. }
            | TimerEvent::NeighborActivity { peer_id, .. }
            | TimerEvent::NeighborTermAck { peer_id, .. } => peer_id,
        };
        if owner != peer.peer_id {
            // Expiration from a previous association.
            return;
        }

        match event {
            TimerEvent::PeerOffer { .. } => {
                peer_fsm::engine(&mut self.services, peer, PeerEvent::OfferIntervalExpiry, None);
            }
            TimerEvent::PeerHeartbeatSend { .. } => {
                peer_fsm::engine(&mut self.services, peer, PeerEvent::HeartbeatSendExpiry, None);
            }
            TimerEvent::PeerHeartbeatWindow { .. } => {
                peer_fsm::engine(
                    &mut self.services,
                    peer,
                    PeerEvent::HeartbeatWindowExpiry,
                    None,
                );
            }
            TimerEvent::PeerTermAck { .. } => {
                peer_fsm::engine(&mut self.services, peer, PeerEvent::TermAckExpiry, None);
            }
            TimerEvent::NeighborInitAck { mac, .. } => {
                neighbor_fsm::engine(
                    &mut self.services,
                    peer,
                    mac,
                    NeighborEvent::InitAckExpiry,
                    None,
                );
            }
            TimerEvent::NeighborUpdateAck { mac, .. } => {
                neighbor_fsm::engine(
                    &mut self.services,
                    peer,
                    mac,
                    NeighborEvent::UpdateAckExpiry,
                    None,
                );
            }
            TimerEvent::NeighborUpdateInterval { mac, .. } => {
                neighbor_fsm::engine(
                    &mut self.services,
                    peer,
                    mac,
                    NeighborEvent::UpdateInterval,
                    None,
                );
            }
            TimerEvent::NeighborActivity { mac, .. } => {
                neighbor_fsm::engine(
                    &mut self.services,
                    peer,
                    mac,
                    NeighborEvent::ActivityExpiry,
                    None,
                );
            }
            TimerEvent::NeighborTermAck { mac, .. } => {
                neighbor_fsm::engine(
                    &mut self.services,
                    peer,
                    mac,
                    NeighborEvent::TermAckExpiry,
                    None,
                );
            }
        }
    }

    /// Destroy the peer once it reaches the terminal state.
    fn reap(&mut self) {
        let reset = matches!(self.peer.as_ref().map(|p| p.state), Some(PeerState::Reset));
        if reset {
            self.teardown_peer();
        }
    }

    fn teardown_peer(&mut self) {
        let Some(mut peer) = self.peer.take() else { return };

        // The peer outlives its neighbors; the cascade runs here.
        for (_, mut neighbor) in peer.neighbors.drain() {
            neighbor_fsm::destroy(&mut self.services, &mut neighbor);
        }
        self.services.wheel.stop(&mut peer.peer_offer_tmr);
        self.services.wheel.stop(&mut peer.heartbeat_send_tmr);
        self.services.wheel.stop(&mut peer.heartbeat_window_tmr);
        self.services.wheel.stop(&mut peer.peer_term_ack_tmr);
        self.services.sink.close_session();

        log::info!(
            "[PEER] peer_id={} destroyed, status={}",
            peer.peer_id,
            peer.status_code
        );
    }
}
