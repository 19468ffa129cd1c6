// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery socket: signal-class frames over UDP multicast.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::DlepConfig;
use crate::error::TransportError;
use crate::transport::multicast::join_discovery_group;

/// Largest datagram the discovery path accepts.
pub const MAX_DATAGRAM: usize = 2048;

/// Non-blocking UDP socket bound to the radio's discovery port, joined
/// to the configured multicast group.
pub struct DiscoverySocket {
    socket: mio::net::UdpSocket,
    /// Fallback signal destination when no discovery source is known yet.
    default_dest: SocketAddr,
}

impl DiscoverySocket {
    pub fn bind(cfg: &DlepConfig) -> Result<Self, TransportError> {
        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, cfg.local_udp_port));

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .and_then(|s| {
                s.set_reuse_address(true)?;
                s.set_nonblocking(true)?;
                s.bind(&bind_addr.into())?;
                Ok(s)
            })
            .map_err(|source| TransportError::BindFailed {
                addr: bind_addr.to_string(),
                source,
            })?;

        let std_socket: std::net::UdpSocket = socket.into();
        join_discovery_group(&std_socket, cfg.multicast_ipv4).map_err(|source| {
            TransportError::BindFailed { addr: cfg.multicast_ipv4.to_string(), source }
        })?;

        let default_dest = match cfg.router_ipv4 {
            Some(addr) => SocketAddr::new(addr.into(), cfg.router_udp_port),
            None => SocketAddr::new(cfg.multicast_ipv4.into(), cfg.router_udp_port),
        };

        log::debug!(
            "[UDP] discovery socket bound to {} group {} default dest {}",
            bind_addr,
            cfg.multicast_ipv4,
            default_dest
        );
        Ok(DiscoverySocket {
            socket: mio::net::UdpSocket::from_std(std_socket),
            default_dest,
        })
    }

    pub fn mio(&mut self) -> &mut mio::net::UdpSocket {
        &mut self.socket
    }

    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf)
    }

    /// Send one signal frame; `None` falls back to the configured router
    /// endpoint (or the multicast group when no router is configured).
    pub fn send_signal(&self, dest: Option<SocketAddr>, frame: &[u8]) -> io::Result<()> {
        let target = dest.unwrap_or(self.default_dest);
        self.socket.send_to(frame, target).map(|_| ())
    }
}
