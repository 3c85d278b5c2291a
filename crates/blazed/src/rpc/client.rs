// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC client.
//!
//! Used by sibling daemons (the status GUI) to query the coordinator, and by
//! the integration tests to drive the server end-to-end. Requests carry an
//! auto-incrementing tag; replies are matched on it.

use super::{build_frame, Endpoint, Result, RpcError, RpcHeader, HEADER_LEN, MAX_PACKET_SIZE,
            RPC_VERSION};
use socket2::{Domain, SockAddr, Socket, Type};
use std::cell::Cell;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

/// Blocking client for the coordinator's RPC socket.
pub struct RpcClient {
    socket: UnixStream,
    next_tag: Cell<u8>,
}

impl RpcClient {
    /// Connect to the coordinator at the given socket path.
    pub fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let socket = Socket::new(Domain::UNIX, Type::SEQPACKET, None)?;
        socket.connect(&SockAddr::unix(path.as_ref())?)?;

        Ok(Self {
            socket: UnixStream::from(std::os::fd::OwnedFd::from(socket)),
            next_tag: Cell::new(0),
        })
    }

    /// Send a request without waiting for the reply; returns the tag the
    /// reply will carry.
    pub fn send_request(&self, endpoint: Endpoint, payload: &[u8]) -> Result<u8> {
        let tag = self.next_tag.get();
        self.next_tag.set(tag.wrapping_add(1));

        let frame = build_frame(endpoint as u8, tag, payload)?;
        let sent = (&self.socket).write(&frame)?;
        if sent != frame.len() {
            return Err(RpcError::Frame(format!(
                "short request write: {sent} of {} bytes",
                frame.len()
            )));
        }
        Ok(tag)
    }

    /// Receive one reply datagram, returning its header and payload.
    pub fn recv_reply(&self) -> Result<(RpcHeader, Vec<u8>)> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let n = (&self.socket).read(&mut buf)?;
        if n == 0 {
            return Err(RpcError::Disconnected);
        }

        let header = RpcHeader::decode(&buf[..n])?;
        if header.version != RPC_VERSION {
            return Err(RpcError::Frame(format!(
                "invalid reply version ${:04x}",
                header.version
            )));
        }
        let length = header.length as usize;
        if length < HEADER_LEN || length > n {
            return Err(RpcError::Frame(format!("invalid reply length {length}")));
        }

        Ok((header, buf[HEADER_LEN..length].to_vec()))
    }

    /// Blocking request round-trip; verifies the reply answers this request.
    pub fn request(&self, endpoint: Endpoint, payload: &[u8]) -> Result<Vec<u8>> {
        let tag = self.send_request(endpoint, payload)?;
        let (header, reply) = self.recv_reply()?;

        if header.tag != tag || header.endpoint != endpoint as u8 {
            return Err(RpcError::Frame(format!(
                "reply mismatch: endpoint ${:02x} tag {} (expected ${:02x}/{})",
                header.endpoint, header.tag, endpoint as u8, tag
            )));
        }
        Ok(reply)
    }

    /// Send a raw, pre-framed datagram. Test helper for malformed traffic.
    pub fn send_raw(&self, frame: &[u8]) -> Result<()> {
        (&self.socket).write_all(frame)?;
        Ok(())
    }
}
