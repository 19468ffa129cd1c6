// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Startup configuration: key-value file, `#` comments, clamped numerics.
//!
//! Every numeric key has a `{min, max, default}` triple so malformed input
//! can never destabilize the core: out-of-range values are clamped with a
//! warning, unknown keys warn and are ignored, and only a missing file
//! aborts startup. The peer copies this snapshot at init time, so editing
//! the file never perturbs an active session.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;

use crate::error::ConfigError;
use crate::protocol::constants::{
    DISCOVERY_MCAST_V4, DISCOVERY_MCAST_V6, RADIO_DEFAULT_PORT, ROUTER_DEFAULT_PORT,
};

// ============================================================================
// Clamp ranges (seconds unless the name says _TMO, which is milliseconds)
// ============================================================================

pub const PEER_OFFER_INTERVAL_MIN: u32 = 1;
pub const PEER_OFFER_INTERVAL_MAX: u32 = 60;
pub const PEER_OFFER_INTERVAL_DEFAULT: u32 = 5;

pub const PEER_HEARTBEAT_INTERVAL_MIN: u32 = 1;
pub const PEER_HEARTBEAT_INTERVAL_MAX: u32 = 60;
pub const PEER_HEARTBEAT_INTERVAL_DEFAULT: u32 = 5;

pub const PEER_HEARTBEAT_MISSED_THRESHOLD_MIN: u32 = 2;
pub const PEER_HEARTBEAT_MISSED_THRESHOLD_MAX: u32 = 8;
pub const PEER_HEARTBEAT_MISSED_THRESHOLD_DEFAULT: u32 = 3;

pub const PEER_TERM_ACK_TMO_MIN: u32 = 100;
pub const PEER_TERM_ACK_TMO_MAX: u32 = 5_000;
pub const PEER_TERM_ACK_TMO_DEFAULT: u32 = 1_000;

pub const PEER_TERM_MISSED_ACK_THRESHOLD_MIN: u32 = 1;
pub const PEER_TERM_MISSED_ACK_THRESHOLD_MAX: u32 = 5;
pub const PEER_TERM_MISSED_ACK_THRESHOLD_DEFAULT: u32 = 3;

pub const NEIGHBOR_UP_ACK_TMO_MIN: u32 = 100;
pub const NEIGHBOR_UP_ACK_TMO_MAX: u32 = 40_000;
pub const NEIGHBOR_UP_ACK_TMO_DEFAULT: u32 = 1_000;

pub const NEIGHBOR_UP_MISSED_ACK_THRESHOLD_MIN: u32 = 1;
pub const NEIGHBOR_UP_MISSED_ACK_THRESHOLD_MAX: u32 = 5;
pub const NEIGHBOR_UP_MISSED_ACK_THRESHOLD_DEFAULT: u32 = 3;

pub const NEIGHBOR_UPDATE_INTERVAL_TMO_MIN: u32 = 100;
pub const NEIGHBOR_UPDATE_INTERVAL_TMO_MAX: u32 = 5_000;
pub const NEIGHBOR_UPDATE_INTERVAL_TMO_DEFAULT: u32 = 400;

// 0 disables server-side activity supervision. The written default (10 s)
// predates the tightened 5 s ceiling; file values are clamped to it.
pub const NEIGHBOR_ACTIVITY_TIMER_MIN: u32 = 0;
pub const NEIGHBOR_ACTIVITY_TIMER_MAX: u32 = 5;
pub const NEIGHBOR_ACTIVITY_TIMER_DEFAULT: u32 = 10;

pub const NEIGHBOR_DOWN_ACK_TMO_MIN: u32 = 100;
pub const NEIGHBOR_DOWN_ACK_TMO_MAX: u32 = 5_000;
pub const NEIGHBOR_DOWN_ACK_TMO_DEFAULT: u32 = 1_000;

pub const NEIGHBOR_DOWN_MISSED_ACK_THRESHOLD_MIN: u32 = 1;
pub const NEIGHBOR_DOWN_MISSED_ACK_THRESHOLD_MAX: u32 = 5;
pub const NEIGHBOR_DOWN_MISSED_ACK_THRESHOLD_DEFAULT: u32 = 3;

/// Parsed configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlepConfig {
    pub sim_name: String,
    pub debug_flags: u32,
    /// Wait for an explicit admin start instead of starting at launch.
    pub manual_start: bool,
    /// Create the peer on first attached-discovery from a router.
    pub discovery_start: bool,

    pub local_udp_port: u16,
    pub local_tcp_port: u16,
    pub local_ipv4: Ipv4Addr,
    pub local_ipv6: Ipv6Addr,

    pub router_udp_port: u16,
    pub router_tcp_port: u16,
    pub router_ipv4: Option<Ipv4Addr>,
    pub router_ipv6: Option<Ipv6Addr>,

    pub multicast_ipv4: Ipv4Addr,
    pub multicast_ipv6: Ipv6Addr,

    pub type_description: String,
    pub local_id: u32,

    pub peer_offer_interval: u32,
    pub peer_heartbeat_interval: u32,
    pub peer_heartbeat_missed_threshold: u32,
    pub peer_term_ack_tmo: u32,
    pub peer_term_missed_ack_threshold: u32,

    pub neighbor_up_ack_tmo: u32,
    pub neighbor_up_missed_ack_threshold: u32,
    pub neighbor_update_interval_tmo: u32,
    pub neighbor_activity_timer: u32,
    pub neighbor_down_ack_tmo: u32,
    pub neighbor_down_missed_ack_threshold: u32,
}

impl Default for DlepConfig {
    fn default() -> Self {
        DlepConfig {
            sim_name: String::new(),
            debug_flags: 0,
            manual_start: false,
            discovery_start: true,
            local_udp_port: RADIO_DEFAULT_PORT,
            local_tcp_port: RADIO_DEFAULT_PORT,
            local_ipv4: Ipv4Addr::UNSPECIFIED,
            local_ipv6: Ipv6Addr::UNSPECIFIED,
            router_udp_port: ROUTER_DEFAULT_PORT,
            router_tcp_port: ROUTER_DEFAULT_PORT,
            router_ipv4: None,
            router_ipv6: None,
            multicast_ipv4: DISCOVERY_MCAST_V4,
            multicast_ipv6: DISCOVERY_MCAST_V6,
            type_description: "no peer description".to_string(),
            local_id: 0,
            peer_offer_interval: PEER_OFFER_INTERVAL_DEFAULT,
            peer_heartbeat_interval: PEER_HEARTBEAT_INTERVAL_DEFAULT,
            peer_heartbeat_missed_threshold: PEER_HEARTBEAT_MISSED_THRESHOLD_DEFAULT,
            peer_term_ack_tmo: PEER_TERM_ACK_TMO_DEFAULT,
            peer_term_missed_ack_threshold: PEER_TERM_MISSED_ACK_THRESHOLD_DEFAULT,
            neighbor_up_ack_tmo: NEIGHBOR_UP_ACK_TMO_DEFAULT,
            neighbor_up_missed_ack_threshold: NEIGHBOR_UP_MISSED_ACK_THRESHOLD_DEFAULT,
            neighbor_update_interval_tmo: NEIGHBOR_UPDATE_INTERVAL_TMO_DEFAULT,
            neighbor_activity_timer: NEIGHBOR_ACTIVITY_TIMER_DEFAULT,
            neighbor_down_ack_tmo: NEIGHBOR_DOWN_ACK_TMO_DEFAULT,
            neighbor_down_missed_ack_threshold: NEIGHBOR_DOWN_MISSED_ACK_THRESHOLD_DEFAULT,
        }
    }
}

impl DlepConfig {
    /// Read and parse the config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::FileNotFound {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Parse config text. Never fails: bad lines warn and fall back to
    /// defaults, out-of-range numerics are clamped.
    pub fn parse(text: &str) -> Self {
        let mut cfg = DlepConfig::default();
        for (lineno, raw) in text.lines().enumerate() {
            let line = match raw.find('#') {
                Some(pos) => &raw[..pos],
                None => raw,
            };
            let mut parts = line.split_whitespace();
            let Some(key) = parts.next() else { continue };
            let value = parts.next().unwrap_or("");
            cfg.apply(key, value, lineno + 1);
        }
        cfg
    }

    fn apply(&mut self, key: &str, value: &str, lineno: usize) {
        match key {
            "SIM_NAME" => self.sim_name = value.to_string(),
            "DEBUG_FLAGS" => {
                let hex = value.trim_start_matches("0x").trim_start_matches("0X");
                match u32::from_str_radix(hex, 16) {
                    Ok(mask) => self.debug_flags = mask,
                    Err(_) => warn_bad(key, value, lineno),
                }
            }
            "MANUAL_START" => self.manual_start = parse_bool(value, lineno, key),
            "DISCOVERY_START" => self.discovery_start = parse_bool(value, lineno, key),
            "LOCAL_UDP_PORT" => parse_port(value, lineno, key, &mut self.local_udp_port),
            "LOCAL_TCP_PORT" => parse_port(value, lineno, key, &mut self.local_tcp_port),
            "LOCAL_IPV4" => match value.parse() {
                Ok(addr) => self.local_ipv4 = addr,
                Err(_) => warn_bad(key, value, lineno),
            },
            "LOCAL_IPV6" => match value.parse() {
                Ok(addr) => self.local_ipv6 = addr,
                Err(_) => warn_bad(key, value, lineno),
            },
            "ROUTER_UDP_PORT" => parse_port(value, lineno, key, &mut self.router_udp_port),
            "ROUTER_TCP_PORT" => parse_port(value, lineno, key, &mut self.router_tcp_port),
            "ROUTER_IPV4" => match value.parse() {
                Ok(addr) => self.router_ipv4 = Some(addr),
                Err(_) => warn_bad(key, value, lineno),
            },
            "ROUTER_IPV6" => match value.parse() {
                Ok(addr) => self.router_ipv6 = Some(addr),
                Err(_) => warn_bad(key, value, lineno),
            },
            "TYPE_DESCRIPTION" => self.type_description = value.to_string(),
            "LOCAL_ID" => match value.parse() {
                Ok(id) => self.local_id = id,
                Err(_) => warn_bad(key, value, lineno),
            },
            "DLEP_PEER_OFFER_INTERVAL" => {
                self.peer_offer_interval = clamp(
                    key,
                    value,
                    lineno,
                    PEER_OFFER_INTERVAL_MIN,
                    PEER_OFFER_INTERVAL_MAX,
                    PEER_OFFER_INTERVAL_DEFAULT,
                );
            }
            "DLEP_PEER_HEARTBEAT_INTERVAL" => {
                self.peer_heartbeat_interval = clamp(
                    key,
                    value,
                    lineno,
                    PEER_HEARTBEAT_INTERVAL_MIN,
                    PEER_HEARTBEAT_INTERVAL_MAX,
                    PEER_HEARTBEAT_INTERVAL_DEFAULT,
                );
            }
            "DLEP_PEER_HEARTBEAT_MISSED_THRESHOLD" => {
                self.peer_heartbeat_missed_threshold = clamp(
                    key,
                    value,
                    lineno,
                    PEER_HEARTBEAT_MISSED_THRESHOLD_MIN,
                    PEER_HEARTBEAT_MISSED_THRESHOLD_MAX,
                    PEER_HEARTBEAT_MISSED_THRESHOLD_DEFAULT,
                );
            }
            "DLEP_PEER_TERM_ACK_TMO" => {
                self.peer_term_ack_tmo = clamp(
                    key,
                    value,
                    lineno,
                    PEER_TERM_ACK_TMO_MIN,
                    PEER_TERM_ACK_TMO_MAX,
                    PEER_TERM_ACK_TMO_DEFAULT,
                );
            }
            "DLEP_PEER_TERM_MISSED_ACK_THRESHOLD" => {
                self.peer_term_missed_ack_threshold = clamp(
                    key,
                    value,
                    lineno,
                    PEER_TERM_MISSED_ACK_THRESHOLD_MIN,
                    PEER_TERM_MISSED_ACK_THRESHOLD_MAX,
                    PEER_TERM_MISSED_ACK_THRESHOLD_DEFAULT,
                );
            }
            "DLEP_NEIGHBOR_UP_ACK_TMO" => {
                self.neighbor_up_ack_tmo = clamp(
                    key,
                    value,
                    lineno,
                    NEIGHBOR_UP_ACK_TMO_MIN,
                    NEIGHBOR_UP_ACK_TMO_MAX,
                    NEIGHBOR_UP_ACK_TMO_DEFAULT,
                );
            }
            "DLEP_NEIGHBOR_UP_MISSED_ACK_THRESHOLD" => {
                self.neighbor_up_missed_ack_threshold = clamp(
                    key,
                    value,
                    lineno,
                    NEIGHBOR_UP_MISSED_ACK_THRESHOLD_MIN,
                    NEIGHBOR_UP_MISSED_ACK_THRESHOLD_MAX,
                    NEIGHBOR_UP_MISSED_ACK_THRESHOLD_DEFAULT,
                );
            }
            "DLEP_NEIGHBOR_UPDATE_INTERVAL_TMO" => {
                self.neighbor_update_interval_tmo = clamp(
                    key,
                    value,
                    lineno,
                    NEIGHBOR_UPDATE_INTERVAL_TMO_MIN,
                    NEIGHBOR_UPDATE_INTERVAL_TMO_MAX,
                    NEIGHBOR_UPDATE_INTERVAL_TMO_DEFAULT,
                );
            }
            "DLEP_NEIGHBOR_ACTIVITY_TIMER" => {
                self.neighbor_activity_timer = clamp(
                    key,
                    value,
                    lineno,
                    NEIGHBOR_ACTIVITY_TIMER_MIN,
                    NEIGHBOR_ACTIVITY_TIMER_MAX,
                    NEIGHBOR_ACTIVITY_TIMER_DEFAULT,
                );
            }
            "DLEP_NEIGHBOR_DOWN_ACK_TMO" => {
                self.neighbor_down_ack_tmo = clamp(
                    key,
                    value,
                    lineno,
                    NEIGHBOR_DOWN_ACK_TMO_MIN,
                    NEIGHBOR_DOWN_ACK_TMO_MAX,
                    NEIGHBOR_DOWN_ACK_TMO_DEFAULT,
                );
            }
            "DLEP_NEIGHBOR_DOWN_MISSED_ACK_THRESHOLD" => {
                self.neighbor_down_missed_ack_threshold = clamp(
                    key,
                    value,
                    lineno,
                    NEIGHBOR_DOWN_MISSED_ACK_THRESHOLD_MIN,
                    NEIGHBOR_DOWN_MISSED_ACK_THRESHOLD_MAX,
                    NEIGHBOR_DOWN_MISSED_ACK_THRESHOLD_DEFAULT,
                );
            }
            unknown => {
                log::warn!("[CONFIG] line {lineno}: unknown key '{unknown}', ignored");
            }
        }
    }
}

impl fmt::Display for DlepConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DLEP radio configuration")?;
        writeln!(f, "  sim name            {}", self.sim_name)?;
        writeln!(f, "  type description    {}", self.type_description)?;
        writeln!(f, "  local id            {}", self.local_id)?;
        writeln!(
            f,
            "  local udp/tcp       {}:{} / {}",
            self.local_ipv4, self.local_udp_port, self.local_tcp_port
        )?;
        match self.router_ipv4 {
            Some(addr) => writeln!(
                f,
                "  router udp/tcp      {}:{} / {}",
                addr, self.router_udp_port, self.router_tcp_port
            )?,
            None => writeln!(f, "  router              learned from discovery")?,
        }
        writeln!(f, "  multicast group     {}", self.multicast_ipv4)?;
        writeln!(
            f,
            "  offer/heartbeat     {}s / {}s (missed threshold {})",
            self.peer_offer_interval,
            self.peer_heartbeat_interval,
            self.peer_heartbeat_missed_threshold
        )?;
        writeln!(
            f,
            "  peer term           {}ms x{}",
            self.peer_term_ack_tmo, self.peer_term_missed_ack_threshold
        )?;
        writeln!(
            f,
            "  neighbor up/down    {}ms x{} / {}ms x{}",
            self.neighbor_up_ack_tmo,
            self.neighbor_up_missed_ack_threshold,
            self.neighbor_down_ack_tmo,
            self.neighbor_down_missed_ack_threshold
        )?;
        write!(
            f,
            "  neighbor update     {}ms, activity {}s",
            self.neighbor_update_interval_tmo, self.neighbor_activity_timer
        )
    }
}

fn warn_bad(key: &str, value: &str, lineno: usize) {
    log::warn!("[CONFIG] line {lineno}: bad value '{value}' for {key}, keeping default");
}

fn parse_bool(value: &str, lineno: usize, key: &str) -> bool {
    match value {
        "1" | "true" | "TRUE" => true,
        "0" | "false" | "FALSE" => false,
        other => {
            warn_bad(key, other, lineno);
            false
        }
    }
}

fn parse_port(value: &str, lineno: usize, key: &str, out: &mut u16) {
    match value.parse() {
        Ok(port) => *out = port,
        Err(_) => warn_bad(key, value, lineno),
    }
}

fn clamp(key: &str, value: &str, lineno: usize, min: u32, max: u32, default: u32) -> u32 {
    let Ok(parsed) = value.parse::<u32>() else {
        warn_bad(key, value, lineno);
        return default;
    };
    if parsed < min || parsed > max {
        let clamped = parsed.clamp(min, max);
        log::warn!(
            "[CONFIG] line {lineno}: {key}={parsed} outside [{min}, {max}], clamped to {clamped}"
        );
        clamped
    } else {
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = DlepConfig::default();
        assert_eq!(cfg.local_udp_port, 5001);
        assert_eq!(cfg.router_udp_port, 5000);
        assert_eq!(cfg.peer_heartbeat_interval, 5);
        assert_eq!(cfg.neighbor_update_interval_tmo, 400);
        assert_eq!(cfg.type_description, "no peer description");
        assert!(cfg.discovery_start);
        assert!(!cfg.manual_start);
    }

    #[test]
    fn test_parse_basic_file() {
        let cfg = DlepConfig::parse(
            "# radio sim config\n\
             SIM_NAME radio-1\n\
             DEBUG_FLAGS 0x1ff\n\
             LOCAL_UDP_PORT 6001\n\
             LOCAL_TCP_PORT 6001\n\
             LOCAL_IPV4 10.0.0.2\n\
             ROUTER_IPV4 10.0.0.1   # the attached router\n\
             ROUTER_UDP_PORT 6000\n\
             TYPE_DESCRIPTION wideband-uhf\n\
             DLEP_PEER_HEARTBEAT_INTERVAL 2\n",
        );
        assert_eq!(cfg.sim_name, "radio-1");
        assert_eq!(cfg.debug_flags, 0x1ff);
        assert_eq!(cfg.local_udp_port, 6001);
        assert_eq!(cfg.local_ipv4, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(cfg.router_ipv4, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(cfg.router_udp_port, 6000);
        assert_eq!(cfg.type_description, "wideband-uhf");
        assert_eq!(cfg.peer_heartbeat_interval, 2);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let cfg = DlepConfig::parse(
            "DLEP_PEER_HEARTBEAT_INTERVAL 600\n\
             DLEP_NEIGHBOR_UP_ACK_TMO 50\n\
             DLEP_NEIGHBOR_ACTIVITY_TIMER 10\n",
        );
        assert_eq!(cfg.peer_heartbeat_interval, PEER_HEARTBEAT_INTERVAL_MAX);
        assert_eq!(cfg.neighbor_up_ack_tmo, NEIGHBOR_UP_ACK_TMO_MIN);
        assert_eq!(cfg.neighbor_activity_timer, NEIGHBOR_ACTIVITY_TIMER_MAX);
    }

    #[test]
    fn test_unknown_and_bad_lines_keep_defaults() {
        let cfg = DlepConfig::parse(
            "NO_SUCH_KEY 12\n\
             LOCAL_UDP_PORT notaport\n\
             DLEP_PEER_TERM_ACK_TMO abc\n",
        );
        assert_eq!(cfg.local_udp_port, RADIO_DEFAULT_PORT);
        assert_eq!(cfg.peer_term_ack_tmo, PEER_TERM_ACK_TMO_DEFAULT);
    }

    #[test]
    fn test_load_missing_file() {
        let err = DlepConfig::load(Path::new("/no/such/dlep.conf")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_load_roundtrip_via_tempfile() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "SIM_NAME temp-radio").unwrap();
        writeln!(file, "MANUAL_START 1").unwrap();
        let cfg = DlepConfig::load(file.path()).unwrap();
        assert_eq!(cfg.sim_name, "temp-radio");
        assert!(cfg.manual_start);
    }
}
