// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC server.
//!
//! Listens on a UNIX `SOCK_SEQPACKET` socket, admits up to [`MAX_CLIENTS`]
//! concurrent clients, and dispatches their frames to the endpoint handlers.
//! Dead connections are reclaimed by a periodic garbage collection sweep,
//! with bounded off-cycle sweeps when admission hits the client cap.

use super::connection::ClientConnection;
use super::{cbor, endpoints, Endpoint, Result, RpcError, RpcHeader, HEADER_LEN, RPC_VERSION};
use crate::config::RpcSection;
use crate::protocol::Handler;
use crate::radio::Radio;
use crate::runloop;
use mio::Token;
use socket2::{Domain, SockAddr, Socket, Type};
use std::cell::{Cell, RefCell};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

/// Most clients served concurrently.
pub const MAX_CLIENTS: usize = 100;

/// Listen backlog for the RPC socket.
const LISTEN_BACKLOG: i32 = 5;

/// Interval between scheduled client garbage collections.
const CLIENT_GC_INTERVAL: Duration = Duration::from_secs(15);

/// Most off-cycle garbage collections allowed between scheduled sweeps.
const CLIENT_GC_MAX_OFFCYCLE: u32 = 10;

/// Local RPC server.
pub struct RpcServer {
    listener: UnixListener,
    listener_token: Cell<Option<Token>>,
    socket_path: PathBuf,

    handle: Rc<runloop::Handle>,
    radio: Rc<Radio>,
    handler: Rc<Handler>,

    clients: RefCell<Vec<Rc<ClientConnection>>>,
    /// Off-cycle GCs run since the last scheduled sweep
    offcycle_gc: Cell<u32>,
    clients_rejected: Cell<u64>,
}

impl RpcServer {
    /// Bind the listening socket (replacing any stale socket file) and start
    /// accepting clients on the run loop.
    pub fn start(
        radio: Rc<Radio>,
        handler: Rc<Handler>,
        config: &RpcSection,
        handle: &Rc<runloop::Handle>,
    ) -> Result<Rc<Self>> {
        match std::fs::remove_file(&config.listen) {
            Ok(()) => log::debug!("removed stale rpc socket {}", config.listen.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let socket = Socket::new(Domain::UNIX, Type::SEQPACKET, None)?;
        socket.bind(&SockAddr::unix(&config.listen)?)?;
        socket.set_nonblocking(true)?;
        socket.listen(LISTEN_BACKLOG)?;
        log::debug!("local rpc socket: {}", config.listen.display());

        let server = Rc::new(Self {
            listener: UnixListener::from(std::os::fd::OwnedFd::from(socket)),
            listener_token: Cell::new(None),
            socket_path: config.listen.clone(),
            handle: Rc::clone(handle),
            radio,
            handler,
            clients: RefCell::new(Vec::new()),
            offcycle_gc: Cell::new(0),
            clients_rejected: Cell::new(0),
        });

        let weak = Rc::downgrade(&server);
        let token = handle.add_fd(
            server.listener.as_raw_fd(),
            Rc::new(move || {
                if let Some(server) = weak.upgrade() {
                    server.accept_clients();
                }
            }),
        )?;
        server.listener_token.set(Some(token));

        let weak = Rc::downgrade(&server);
        handle.add_timer(
            CLIENT_GC_INTERVAL,
            true,
            Rc::new(move || {
                if let Some(server) = weak.upgrade() {
                    server.offcycle_gc.set(0);
                    server.gc_clients();
                }
            }),
        );

        Ok(server)
    }

    /// Number of connections live (including not-yet-collected dead ones).
    pub fn client_count(&self) -> usize {
        self.clients.borrow().len()
    }

    /// Number of connections refused because the server was full.
    pub fn clients_rejected(&self) -> u64 {
        self.clients_rejected.get()
    }

    /// Accept every pending connection on the listener.
    pub(super) fn accept_clients(self: &Rc<Self>) {
        loop {
            match self.listener.accept() {
                Ok((socket, _)) => {
                    if let Err(e) = self.admit(socket) {
                        log::error!("failed to accept client: {e}");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::error!("accept failed: {e}");
                    break;
                }
            }
        }
    }

    fn admit(self: &Rc<Self>, socket: UnixStream) -> Result<()> {
        socket.set_nonblocking(true)?;

        if self.clients.borrow().len() >= MAX_CLIENTS {
            // under pressure, try to reclaim dead clients right away; bounded
            // so a connect flood cannot turn into a GC flood
            if self.offcycle_gc.get() < CLIENT_GC_MAX_OFFCYCLE {
                self.offcycle_gc.set(self.offcycle_gc.get() + 1);
                self.gc_clients();
            }

            if self.clients.borrow().len() >= MAX_CLIENTS {
                self.clients_rejected.set(self.clients_rejected.get() + 1);
                return Err(RpcError::AtCapacity);
            }
        }

        let conn = Rc::new(ClientConnection::new(socket, Rc::clone(&self.handle)));

        let weak_server = Rc::downgrade(self);
        let weak_conn = Rc::downgrade(&conn);
        let token = self.handle.add_fd(
            conn.fd(),
            Rc::new(move || {
                if let (Some(server), Some(conn)) = (weak_server.upgrade(), weak_conn.upgrade()) {
                    server.client_readable(&conn);
                }
            }),
        )?;
        conn.set_token(token);

        self.clients.borrow_mut().push(conn);
        log::debug!("accepted rpc client ({} total)", self.client_count());
        Ok(())
    }

    /// Drain and process everything the client has sent.
    pub(super) fn client_readable(self: &Rc<Self>, conn: &Rc<ClientConnection>) {
        loop {
            match conn.recv_datagram() {
                Ok(Some(frame)) => {
                    if let Err(e) = self.process_frame(conn, &frame) {
                        log::error!("rpc client request failed: {e}");
                        conn.abort();
                        break;
                    }
                }
                Ok(None) => break,
                Err(RpcError::Disconnected) => {
                    log::debug!("rpc client closed connection");
                    conn.abort();
                    break;
                }
                Err(e) => {
                    log::error!("rpc client read failed: {e}");
                    conn.abort();
                    break;
                }
            }
        }
    }

    /// Validate and dispatch one request frame.
    ///
    /// Any error propagated from here closes the connection without a reply.
    fn process_frame(self: &Rc<Self>, conn: &Rc<ClientConnection>, frame: &[u8]) -> Result<()> {
        let header = RpcHeader::decode(frame)?;

        if header.version != RPC_VERSION {
            return Err(RpcError::Frame(format!(
                "invalid rpc version ${:04x}",
                header.version
            )));
        }
        let length = header.length as usize;
        if length < HEADER_LEN || length > frame.len() {
            return Err(RpcError::Frame(format!(
                "invalid frame length {length} (have {})",
                frame.len()
            )));
        }

        let payload = &frame[HEADER_LEN..length];
        if !payload.is_empty() {
            cbor::validate_single_item(payload)?;
        }

        conn.set_last_request(header);

        match Endpoint::from_raw(header.endpoint) {
            Some(Endpoint::Config) => endpoints::config::handle(self, conn, payload),
            Some(Endpoint::Status) => endpoints::status::handle(self, conn, payload),
            None => Err(RpcError::UnknownEndpoint(header.endpoint)),
        }
    }

    /// Reclaim all connections whose dead flag is set.
    fn gc_clients(&self) {
        let mut clients = self.clients.borrow_mut();
        let before = clients.len();
        clients.retain(|conn| !conn.is_dead());

        let collected = before - clients.len();
        if collected > 0 {
            log::debug!(
                "garbage collected {collected} client(s); {} total",
                clients.len()
            );
        }
    }

    pub(super) fn radio(&self) -> &Rc<Radio> {
        &self.radio
    }

    #[allow(dead_code)]
    pub(super) fn protocol_handler(&self) -> &Rc<Handler> {
        &self.handler
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        if let Some(token) = self.listener_token.take() {
            let _ = self.handle.remove_fd(self.listener.as_raw_fd(), token);
        }
        log::debug!(
            "rpc server shut down ({} clients dropped), socket {}",
            self.clients.borrow().len(),
            self.socket_path.display()
        );
    }
}
