// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The mio-driven event loop hosting a [`Node`].
//!
//! One poll multiplexes the discovery socket, the session listener, the
//! accepted session and the admin waker; the ~100 ms poll timeout drives
//! the timer wheel. Outbound frames are queued by the node's sink and
//! written here, so sockets have exactly one owner.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, Sender};
use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::Mutex;

use crate::admin::{AdminCommand, StatusSnapshot};
use crate::config::DlepConfig;
use crate::core::TICK_MS;
use crate::engine::node::{FrameSink, Node};
use crate::error::Result;
use crate::transport::{DiscoverySocket, Session, SessionListener, MAX_DATAGRAM};

const UDP_TOKEN: Token = Token(0);
const LISTENER_TOKEN: Token = Token(1);
const WAKER_TOKEN: Token = Token(2);
const SESSION_TOKEN: Token = Token(3);

const MAX_EVENTS: usize = 64;

/// Frames the node produced during one loop pass, drained to the sockets
/// at the pass boundary.
#[derive(Default)]
struct OutboundQueues {
    signals: Vec<(Option<SocketAddr>, Vec<u8>)>,
    messages: Vec<Vec<u8>>,
    close_session: bool,
}

struct QueueSink(Arc<Mutex<OutboundQueues>>);

impl FrameSink for QueueSink {
    fn send_signal(&mut self, dest: Option<SocketAddr>, frame: &[u8]) -> io::Result<()> {
        self.0.lock().signals.push((dest, frame.to_vec()));
        Ok(())
    }

    fn send_message(&mut self, frame: &[u8]) -> io::Result<()> {
        self.0.lock().messages.push(frame.to_vec());
        Ok(())
    }

    fn close_session(&mut self) {
        self.0.lock().close_session = true;
    }
}

/// Cross-thread handle: post commands, read state, stop the loop.
#[derive(Clone)]
pub struct RuntimeHandle {
    commands: Sender<AdminCommand>,
    waker: Arc<Waker>,
    running: Arc<AtomicBool>,
}

impl RuntimeHandle {
    pub fn send(&self, command: AdminCommand) {
        if self.commands.send(command).is_ok() {
            let _ = self.waker.wake();
        }
    }

    /// Synchronous state read through the command queue.
    pub fn show(&self, timeout: Duration) -> Option<StatusSnapshot> {
        let (tx, rx) = unbounded();
        self.send(AdminCommand::Show(tx));
        rx.recv_timeout(timeout).ok()
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
        let _ = self.waker.wake();
    }
}

/// The agent's event loop.
pub struct Runtime {
    poll: Poll,
    node: Node,
    udp: DiscoverySocket,
    listener: SessionListener,
    session: Option<Session>,
    queues: Arc<Mutex<OutboundQueues>>,
    commands: Receiver<AdminCommand>,
    running: Arc<AtomicBool>,
    started_at: Instant,
}

impl Runtime {
    pub fn new(cfg: DlepConfig) -> Result<(Runtime, RuntimeHandle)> {
        let poll = Poll::new()?;
        let mut udp = DiscoverySocket::bind(&cfg)?;
        let mut listener = SessionListener::bind(&cfg)?;
        poll.registry().register(udp.mio(), UDP_TOKEN, Interest::READABLE)?;
        poll.registry().register(listener.mio(), LISTENER_TOKEN, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);

        let queues = Arc::new(Mutex::new(OutboundQueues::default()));
        let node = Node::new(cfg, Box::new(QueueSink(Arc::clone(&queues))));

        let (tx, rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));

        let handle = RuntimeHandle {
            commands: tx,
            waker,
            running: Arc::clone(&running),
        };
        let runtime = Runtime {
            poll,
            node,
            udp,
            listener,
            session: None,
            queues,
            commands: rx,
            running,
            started_at: Instant::now(),
        };
        Ok((runtime, handle))
    }

    /// The hosted node, e.g. to install a metrics source before `run`.
    pub fn node_mut(&mut self) -> &mut Node {
        &mut self.node
    }

    /// Run until the handle shuts the loop down.
    pub fn run(mut self) -> Result<()> {
        if !self.node.config().manual_start {
            self.node.start();
            self.drain_outbound();
        }

        let mut events = Events::with_capacity(MAX_EVENTS);
        let mut buf = [0u8; MAX_DATAGRAM];

        while self.running.load(Ordering::Relaxed) {
            match self.poll.poll(&mut events, Some(Duration::from_millis(TICK_MS))) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            for event in events.iter() {
                match event.token() {
                    UDP_TOKEN => self.on_udp_readable(&mut buf),
                    LISTENER_TOKEN => self.on_accept_ready(),
                    SESSION_TOKEN => {
                        if event.is_readable() {
                            self.on_session_readable();
                        }
                        if event.is_writable() {
                            self.on_session_writable();
                        }
                    }
                    WAKER_TOKEN => {}
                    other => log::debug!("[LOOP] spurious token {:?}", other),
                }
            }

            // Commands may arrive with or without a wake.
            while let Ok(command) = self.commands.try_recv() {
                self.node.on_command(command);
            }

            let now_ms = self.started_at.elapsed().as_millis() as u64;
            self.node.on_tick(now_ms);
            self.drain_outbound();
        }

        log::info!("[LOOP] shutting down");
        Ok(())
    }

    fn on_udp_readable(&mut self, buf: &mut [u8]) {
        loop {
            match self.udp.recv_from(buf) {
                Ok((len, src)) => self.node.on_signal_datagram(src, &buf[..len]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("[UDP] recv failed: {e}");
                    break;
                }
            }
        }
    }

    fn on_accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok(mut session) => {
                    if self.session.is_some() {
                        // One router at a time; no session aggregation.
                        log::warn!(
                            "[TCP] rejecting second session from {}",
                            session.peer_addr()
                        );
                        continue;
                    }
                    let remote = session.peer_addr();
                    let registered = self.poll.registry().register(
                        session.mio(),
                        SESSION_TOKEN,
                        Interest::READABLE | Interest::WRITABLE,
                    );
                    if let Err(e) = registered {
                        log::warn!("[TCP] session register failed: {e}");
                        continue;
                    }
                    self.session = Some(session);
                    self.node.on_session_open(remote);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("[TCP] accept failed: {e}");
                    break;
                }
            }
        }
    }

    fn on_session_readable(&mut self) {
        let Some(session) = self.session.as_mut() else { return };
        match session.read_packets() {
            Ok(frames) => {
                for frame in frames {
                    self.node.on_session_packet(&frame);
                }
            }
            Err(err) => {
                log::info!("[TCP] session error: {err}");
                self.close_session_socket();
                self.node.on_session_closed();
            }
        }
    }

    fn on_session_writable(&mut self) {
        let Some(session) = self.session.as_mut() else { return };
        if let Err(err) = session.flush() {
            log::info!("[TCP] session flush error: {err}");
            self.close_session_socket();
            self.node.on_session_closed();
        }
    }

    fn close_session_socket(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = self.poll.registry().deregister(session.mio());
        }
    }

    /// Push node-produced frames to the wire.
    fn drain_outbound(&mut self) {
        let drained = {
            let mut queues = self.queues.lock();
            std::mem::take(&mut *queues)
        };

        for (dest, frame) in drained.signals {
            if let Err(e) = self.udp.send_signal(dest, &frame) {
                log::warn!("[UDP] signal send failed: {e}");
            }
        }

        if !drained.messages.is_empty() {
            match self.session.as_mut() {
                Some(session) => {
                    for frame in drained.messages {
                        session.queue(&frame);
                    }
                    if let Err(err) = session.flush() {
                        log::info!("[TCP] session flush error: {err}");
                        self.close_session_socket();
                        self.node.on_session_closed();
                    }
                }
                None => {
                    log::debug!(
                        "[TCP] dropping {} frames, no session",
                        drained.messages.len()
                    );
                }
            }
        }

        if drained.close_session {
            self.close_session_socket();
        }
    }
}
