// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime configuration lookups.
//!
//! Tunables that can change while the daemon runs (radio channel, transmit
//! power, beacon settings) live in the confd key/value daemon rather than the
//! static config file. This module provides typed reads over confd's local
//! socket; the [`RuntimeConfig`] trait lets tests substitute a fixed map.
//!
//! Confd speaks the same 6-byte header + CBOR framing as the coordinator's
//! own RPC socket: a query is `{"get": key}` and the reply is
//! `{"found": bool, "value": <int|float|bytes|null>}`.

use crate::rpc::{self, RpcHeader, HEADER_LEN, MAX_PACKET_SIZE, RPC_VERSION};
use minicbor::data::Type;
use socket2::{Domain, SockAddr, Socket, Type as SockType};
use std::cell::{Cell, RefCell};
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use thiserror::Error;

/// Confd query endpoint id.
const ENDPOINT_QUERY: u8 = 0x01;

/// Runtime configuration errors.
#[derive(Debug, Error)]
pub enum ConfdError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed confd reply: {0}")]
    Protocol(String),

    #[error("CBOR error: {0}")]
    Cbor(String),

    #[error("key `{0}` not found")]
    NotFound(String),

    #[error("key `{0}` has unexpected type")]
    TypeMismatch(String),
}

/// Result type for runtime config reads.
pub type Result<T> = std::result::Result<T, ConfdError>;

impl From<minicbor::decode::Error> for ConfdError {
    fn from(e: minicbor::decode::Error) -> Self {
        Self::Cbor(e.to_string())
    }
}

/// A value stored under a confd key.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Key exists but holds no value
    Null,
    Int(i64),
    Real(f64),
    Blob(Vec<u8>),
}

/// Typed lookups by string key path.
///
/// A nonexistent key and a null value both read as `None` for the scalar
/// getters; any other failure is an error. Blob reads of a null value copy
/// zero bytes, but a missing blob key is an error.
pub trait RuntimeConfig {
    fn get_int(&self, key: &str) -> Result<Option<i64>>;
    fn get_real(&self, key: &str) -> Result<Option<f64>>;

    /// Copy a blob value into `out`, returning the number of bytes copied
    /// (at most `out.len()`).
    fn get_blob(&self, key: &str, out: &mut [u8]) -> Result<usize>;
}

/// Client for the confd daemon.
pub struct Confd {
    socket: RefCell<UnixStream>,
    next_tag: Cell<u8>,
}

impl Confd {
    /// Connect to confd at the given socket path.
    pub fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let socket = Socket::new(Domain::UNIX, SockType::SEQPACKET, None)?;
        socket.connect(&SockAddr::unix(path.as_ref())?)?;
        log::debug!("connected to confd at {}", path.as_ref().display());

        Ok(Self {
            socket: RefCell::new(UnixStream::from(std::os::fd::OwnedFd::from(socket))),
            next_tag: Cell::new(0),
        })
    }

    /// Perform one query round-trip.
    fn query(&self, key: &str) -> Result<Option<Value>> {
        let tag = self.next_tag.get();
        self.next_tag.set(tag.wrapping_add(1));

        let mut payload = Vec::new();
        minicbor::Encoder::new(&mut payload)
            .map(1)
            .and_then(|e| e.str("get"))
            .and_then(|e| e.str(key))
            .map_err(|e| ConfdError::Cbor(e.to_string()))?;

        let frame = rpc::build_frame(ENDPOINT_QUERY, tag, &payload)
            .map_err(|e| ConfdError::Protocol(e.to_string()))?;

        let mut socket = self.socket.borrow_mut();
        socket.write_all(&frame)?;

        let mut buf = [0u8; MAX_PACKET_SIZE];
        let n = socket.read(&mut buf)?;
        if n == 0 {
            return Err(ConfdError::Io(io::ErrorKind::UnexpectedEof.into()));
        }

        let header = RpcHeader::decode(&buf[..n])
            .map_err(|e| ConfdError::Protocol(e.to_string()))?;
        if header.version != RPC_VERSION {
            return Err(ConfdError::Protocol(format!(
                "unsupported version ${:04x}",
                header.version
            )));
        }
        if header.tag != tag {
            return Err(ConfdError::Protocol(format!(
                "tag mismatch: sent {tag}, got {}",
                header.tag
            )));
        }
        if (header.length as usize) < HEADER_LEN || header.length as usize > n {
            return Err(ConfdError::Protocol(format!(
                "invalid reply length {}",
                header.length
            )));
        }

        decode_reply(&buf[HEADER_LEN..header.length as usize])
    }
}

/// Decode a `{"found": bool, "value": …}` reply map.
fn decode_reply(payload: &[u8]) -> Result<Option<Value>> {
    let mut d = minicbor::Decoder::new(payload);
    let Some(len) = d.map()? else {
        return Err(ConfdError::Protocol("indefinite reply map".into()));
    };

    let mut found = false;
    let mut value = None;

    for _ in 0..len {
        match d.str()? {
            "found" => found = d.bool()?,
            "value" => {
                value = Some(match d.datatype()? {
                    Type::Null => {
                        d.null()?;
                        Value::Null
                    }
                    Type::U8 | Type::U16 | Type::U32 | Type::U64 | Type::I8 | Type::I16
                    | Type::I32 | Type::I64 | Type::Int => Value::Int(d.i64()?),
                    Type::F32 => Value::Real(f64::from(d.f32()?)),
                    Type::F64 => Value::Real(d.f64()?),
                    Type::Bytes => Value::Blob(d.bytes()?.to_vec()),
                    other => {
                        return Err(ConfdError::Protocol(format!(
                            "unsupported value type {other}"
                        )))
                    }
                });
            }
            _ => d.skip()?,
        }
    }

    if !found {
        return Ok(None);
    }
    value
        .map(Some)
        .ok_or_else(|| ConfdError::Protocol("reply missing `value`".into()))
}

impl RuntimeConfig for Confd {
    fn get_int(&self, key: &str) -> Result<Option<i64>> {
        match self.query(key)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Int(v)) => Ok(Some(v)),
            Some(_) => Err(ConfdError::TypeMismatch(key.into())),
        }
    }

    fn get_real(&self, key: &str) -> Result<Option<f64>> {
        match self.query(key)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Real(v)) => Ok(Some(v)),
            Some(_) => Err(ConfdError::TypeMismatch(key.into())),
        }
    }

    fn get_blob(&self, key: &str, out: &mut [u8]) -> Result<usize> {
        match self.query(key)? {
            None => Err(ConfdError::NotFound(key.into())),
            Some(Value::Null) => Ok(0),
            Some(Value::Blob(bytes)) => {
                let n = bytes.len().min(out.len());
                out[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Some(_) => Err(ConfdError::TypeMismatch(key.into())),
        }
    }
}

/// Fixed key/value map backing tests and bench setups.
#[derive(Default)]
pub struct StaticConfig {
    entries: std::collections::HashMap<String, Value>,
}

impl StaticConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: Value) -> &mut Self {
        self.entries.insert(key.to_string(), value);
        self
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.set(key, value);
        self
    }
}

impl RuntimeConfig for StaticConfig {
    fn get_int(&self, key: &str) -> Result<Option<i64>> {
        match self.entries.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Int(v)) => Ok(Some(*v)),
            Some(_) => Err(ConfdError::TypeMismatch(key.into())),
        }
    }

    fn get_real(&self, key: &str) -> Result<Option<f64>> {
        match self.entries.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Real(v)) => Ok(Some(*v)),
            Some(_) => Err(ConfdError::TypeMismatch(key.into())),
        }
    }

    fn get_blob(&self, key: &str, out: &mut [u8]) -> Result<usize> {
        match self.entries.get(key) {
            None => Err(ConfdError::NotFound(key.into())),
            Some(Value::Null) => Ok(0),
            Some(Value::Blob(bytes)) => {
                let n = bytes.len().min(out.len());
                out[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Some(_) => Err(ConfdError::TypeMismatch(key.into())),
        }
    }
}
