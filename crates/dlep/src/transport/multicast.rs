// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery multicast group management and interface discovery.
//!
//! The radio joins the well-known group on every non-loopback interface
//! so a router discovery is heard regardless of which NIC it arrives on.

use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Join `group` on all suitable interfaces, falling back to the
/// unspecified interface when none are found.
pub fn join_discovery_group(socket: &UdpSocket, group: Ipv4Addr) -> io::Result<()> {
    let interfaces = discovery_interfaces();

    if interfaces.is_empty() {
        log::debug!("[UDP] no multicast interfaces found, joining {} on UNSPECIFIED", group);
        socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
    } else {
        for iface in &interfaces {
            match socket.join_multicast_v4(&group, iface) {
                Ok(()) => log::debug!("[UDP] joined {} on {}", group, iface),
                // EADDRINUSE: already joined via another address on the
                // same physical NIC.
                Err(e) if e.raw_os_error() == Some(98) => {
                    log::debug!("[UDP] {} already joined on {}", group, iface);
                }
                Err(e) => {
                    log::debug!("[UDP] join {} on {} failed (non-fatal): {}", group, iface, e);
                }
            }
        }
    }

    socket.set_multicast_loop_v4(true)?;
    let _ = socket.set_multicast_ttl_v4(1);
    Ok(())
}

/// Non-loopback IPv4 interfaces for discovery.
///
/// `DLEP_MULTICAST_IF` forces a specific interface (testing, containers).
pub fn discovery_interfaces() -> Vec<Ipv4Addr> {
    if let Ok(var) = std::env::var("DLEP_MULTICAST_IF") {
        if let Ok(addr) = var.parse::<Ipv4Addr>() {
            log::debug!("[UDP] DLEP_MULTICAST_IF override: {}", addr);
            return vec![addr];
        }
    }

    let interfaces = match local_ip_address::list_afinet_netifas() {
        Ok(ifs) => ifs,
        Err(e) => {
            log::debug!("[UDP] interface enumeration failed: {}", e);
            return Vec::new();
        }
    };

    let mut addrs = Vec::new();
    for (_name, ip) in interfaces {
        if let IpAddr::V4(ipv4) = ip {
            if !ipv4.is_loopback() {
                addrs.push(ipv4);
            }
        }
    }
    addrs
}
