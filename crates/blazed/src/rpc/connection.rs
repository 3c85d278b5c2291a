// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A single accepted RPC client.
//!
//! Connections are owned by the server's client list and garbage collected
//! after their dead flag is set; aborting a connection shuts the socket down
//! and stops watching it, but the object lingers until the next GC pass so
//! in-flight callbacks stay valid.

use super::{build_frame, Result, RpcError, RpcHeader, MAX_PACKET_SIZE};
use crate::runloop;
use mio::Token;
use std::cell::Cell;
use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::rc::Rc;

/// One connected RPC client.
pub struct ClientConnection {
    socket: UnixStream,
    handle: Rc<runloop::Handle>,
    /// Run loop registration, cleared on abort
    token: Cell<Option<Token>>,
    dead: Cell<bool>,
    /// Header of the most recently parsed request, echoed in replies
    last_request: Cell<Option<RpcHeader>>,
}

impl ClientConnection {
    pub fn new(socket: UnixStream, handle: Rc<runloop::Handle>) -> Self {
        Self {
            socket,
            handle,
            token: Cell::new(None),
            dead: Cell::new(false),
            last_request: Cell::new(None),
        }
    }

    pub fn fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    /// Record the run loop token once the fd is registered.
    pub fn set_token(&self, token: Token) {
        self.token.set(Some(token));
    }

    /// Whether this connection awaits garbage collection.
    pub fn is_dead(&self) -> bool {
        self.dead.get()
    }

    /// Mark the connection dead and stop all I/O on it.
    ///
    /// The next garbage collection pass reclaims the object.
    pub fn abort(&self) {
        self.dead.set(true);

        if let Some(token) = self.token.take() {
            if let Err(e) = self.handle.remove_fd(self.fd(), token) {
                log::debug!("client fd deregistration failed: {e}");
            }
        }
        let _ = self.socket.shutdown(Shutdown::Both);
    }

    /// Receive one datagram. `Ok(None)` when the socket has no more data;
    /// [`RpcError::Disconnected`] on EOF.
    pub fn recv_datagram(&self) -> Result<Option<Vec<u8>>> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        match (&self.socket).read(&mut buf) {
            Ok(0) => Err(RpcError::Disconnected),
            Ok(n) => Ok(Some(buf[..n].to_vec())),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remember the request a subsequent [`ClientConnection::reply`] answers.
    pub fn set_last_request(&self, header: RpcHeader) {
        self.last_request.set(Some(header));
    }

    /// Send `payload` framed as the reply to the most recent request: the
    /// header copies that request's endpoint and tag. One datagram per reply.
    pub fn reply(&self, payload: &[u8]) -> Result<()> {
        let Some(request) = self.last_request.get() else {
            return Err(RpcError::Frame("no request to reply to".into()));
        };

        let frame = build_frame(request.endpoint, request.tag, payload)?;
        let sent = (&self.socket).write(&frame)?;
        if sent != frame.len() {
            return Err(RpcError::Frame(format!(
                "short reply write: {sent} of {} bytes",
                frame.len()
            )));
        }
        Ok(())
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            let _ = self.handle.remove_fd(self.socket.as_raw_fd(), token);
        }
    }
}
