// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session transport: message-class packets over TCP.
//!
//! TCP is a stream, so the packet-length field in the 4-byte packet
//! header frames it: peek the header, then read exactly one packet. A
//! zero-byte read means the router closed the session.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::DlepConfig;
use crate::error::TransportError;
use crate::protocol::constants::{MAX_PACKET_LEN, PACKET_HEADER_LEN};

/// Incremental framer over the DLEP packet header.
///
/// `decode` is built for non-blocking reads: call it whenever the stream
/// is readable; `Ok(None)` means a partial frame is buffered and more
/// bytes are needed.
#[derive(Debug)]
pub struct PacketFrameCodec {
    state: ReadState,
    buf: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
enum ReadState {
    Header { bytes_read: usize },
    Body { total: usize, bytes_read: usize },
}

impl Default for PacketFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketFrameCodec {
    pub fn new() -> Self {
        PacketFrameCodec {
            state: ReadState::Header { bytes_read: 0 },
            buf: vec![0u8; PACKET_HEADER_LEN],
        }
    }

    /// Reset after a connection is torn down.
    pub fn reset(&mut self) {
        self.state = ReadState::Header { bytes_read: 0 };
        self.buf.clear();
        self.buf.resize(PACKET_HEADER_LEN, 0);
    }

    /// Try to pull one whole packet (header included) off the reader.
    pub fn decode<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<Option<Vec<u8>>> {
        loop {
            match self.state {
                ReadState::Header { bytes_read } => {
                    match reader.read(&mut self.buf[bytes_read..PACKET_HEADER_LEN]) {
                        Ok(0) => {
                            return Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                if bytes_read == 0 {
                                    "peer closed the session"
                                } else {
                                    "peer closed mid-header"
                                },
                            ));
                        }
                        Ok(n) => {
                            let total = bytes_read + n;
                            if total < PACKET_HEADER_LEN {
                                self.state = ReadState::Header { bytes_read: total };
                                continue;
                            }
                            let payload =
                                u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
                            let total_len = PACKET_HEADER_LEN + payload;
                            if total_len > MAX_PACKET_LEN {
                                self.state = ReadState::Header { bytes_read: 0 };
                                return Err(io::Error::new(
                                    io::ErrorKind::InvalidData,
                                    "declared packet length exceeds maximum",
                                ));
                            }
                            if payload == 0 {
                                // Header-only packet; hand it up as-is.
                                let frame = self.take_frame(PACKET_HEADER_LEN);
                                return Ok(Some(frame));
                            }
                            self.buf.resize(total_len, 0);
                            self.state = ReadState::Body {
                                total: total_len,
                                bytes_read: PACKET_HEADER_LEN,
                            };
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    }
                }
                ReadState::Body { total, bytes_read } => {
                    match reader.read(&mut self.buf[bytes_read..total]) {
                        Ok(0) => {
                            return Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "peer closed mid-packet",
                            ));
                        }
                        Ok(n) => {
                            let read = bytes_read + n;
                            if read < total {
                                self.state = ReadState::Body { total, bytes_read: read };
                                continue;
                            }
                            let frame = self.take_frame(total);
                            return Ok(Some(frame));
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    fn take_frame(&mut self, len: usize) -> Vec<u8> {
        let mut frame = std::mem::take(&mut self.buf);
        frame.truncate(len);
        self.buf = vec![0u8; PACKET_HEADER_LEN];
        self.state = ReadState::Header { bytes_read: 0 };
        frame
    }
}

/// Listening socket for the router's session connect.
pub struct SessionListener {
    listener: mio::net::TcpListener,
}

impl SessionListener {
    pub fn bind(cfg: &DlepConfig) -> Result<Self, TransportError> {
        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, cfg.local_tcp_port));
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .and_then(|s| {
                s.set_reuse_address(true)?;
                s.set_nonblocking(true)?;
                s.bind(&bind_addr.into())?;
                s.listen(4)?;
                Ok(s)
            })
            .map_err(|source| TransportError::BindFailed {
                addr: bind_addr.to_string(),
                source,
            })?;

        log::debug!("[TCP] session listener on {}", bind_addr);
        Ok(SessionListener {
            listener: mio::net::TcpListener::from_std(socket.into()),
        })
    }

    pub fn mio(&mut self) -> &mut mio::net::TcpListener {
        &mut self.listener
    }

    pub fn accept(&self) -> io::Result<Session> {
        let (stream, peer_addr) = self.listener.accept()?;
        Ok(Session {
            stream,
            peer_addr,
            codec: PacketFrameCodec::new(),
            pending: Vec::new(),
        })
    }
}

/// One accepted router session with framing and a write queue.
pub struct Session {
    stream: mio::net::TcpStream,
    peer_addr: SocketAddr,
    codec: PacketFrameCodec,
    pending: Vec<u8>,
}

impl Session {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn mio(&mut self) -> &mut mio::net::TcpStream {
        &mut self.stream
    }

    /// Drain every complete packet currently readable.
    ///
    /// `Err(PeerClosed)` on an orderly close, other transport errors on
    /// failure; either way the caller tears the session down.
    pub fn read_packets(&mut self) -> Result<Vec<Vec<u8>>, TransportError> {
        let mut frames = Vec::new();
        loop {
            match self.codec.decode(&mut self.stream) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => return Ok(frames),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(TransportError::PeerClosed);
                }
                Err(e) => return Err(TransportError::RecvFailed(e)),
            }
        }
    }

    /// Queue one frame for transmission.
    pub fn queue(&mut self, frame: &[u8]) {
        self.pending.extend_from_slice(frame);
    }

    /// Push queued bytes out; true when the queue drained.
    pub fn flush(&mut self) -> Result<bool, TransportError> {
        while !self.pending.is_empty() {
            match self.stream.write(&self.pending) {
                Ok(0) => return Err(TransportError::PeerClosed),
                Ok(n) => {
                    self.pending.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::SendFailed(e)),
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that yields its script in fixed-size chunks, then blocks.
    struct ChunkReader {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl Read for ChunkReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.data.len() {
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "drained"));
            }
            let n = self.chunk.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn heartbeat_frame() -> Vec<u8> {
        crate::protocol::builder::peer_heartbeat(3)
    }

    #[test]
    fn test_whole_frame_in_one_read() {
        let frame = heartbeat_frame();
        let mut reader = ChunkReader { data: frame.clone(), pos: 0, chunk: 4096 };
        let mut codec = PacketFrameCodec::new();
        assert_eq!(codec.decode(&mut reader).unwrap(), Some(frame));
        assert_eq!(codec.decode(&mut reader).unwrap(), None);
    }

    #[test]
    fn test_frame_dribbled_byte_by_byte() {
        let frame = heartbeat_frame();
        let mut reader = ChunkReader { data: frame.clone(), pos: 0, chunk: 1 };
        let mut codec = PacketFrameCodec::new();
        assert_eq!(codec.decode(&mut reader).unwrap(), Some(frame));
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let a = heartbeat_frame();
        let b = crate::protocol::builder::peer_term_request(9, 0);
        let mut data = a.clone();
        data.extend_from_slice(&b);
        let mut reader = ChunkReader { data, pos: 0, chunk: 7 };
        let mut codec = PacketFrameCodec::new();
        assert_eq!(codec.decode(&mut reader).unwrap(), Some(a));
        assert_eq!(codec.decode(&mut reader).unwrap(), Some(b));
        assert_eq!(codec.decode(&mut reader).unwrap(), None);
    }

    #[test]
    fn test_zero_read_is_peer_closed() {
        struct Eof;
        impl Read for Eof {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Ok(0)
            }
        }
        let mut codec = PacketFrameCodec::new();
        let err = codec.decode(&mut Eof).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
