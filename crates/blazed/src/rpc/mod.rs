// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local RPC interface.
//!
//! The coordinator listens on a UNIX `SOCK_SEQPACKET` socket. Every datagram
//! starts with the 6-byte [`RpcHeader`]; anything after it, up to the header's
//! `length`, is a single CBOR item. Replies reuse the endpoint and tag of the
//! request they answer. Malformed traffic closes the connection without a
//! reply.

pub mod cbor;
pub mod client;
pub mod connection;
pub mod endpoints;
pub mod server;

#[cfg(test)]
mod tests;

use thiserror::Error;

/// Current RPC protocol version.
pub const RPC_VERSION: u16 = 0x0100;

/// Size of the frame header, in bytes.
pub const HEADER_LEN: usize = 6;

/// Largest frame accepted or produced, including the header.
pub const MAX_PACKET_SIZE: usize = 4096;

/// RPC errors.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Frame(String),

    #[error("CBOR error: {0}")]
    Cbor(String),

    #[error("unknown endpoint ${0:02x}")]
    UnknownEndpoint(u8),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("maximum number of clients reached")]
    AtCapacity,

    #[error("peer disconnected")]
    Disconnected,
}

/// Result type for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;

impl From<minicbor::decode::Error> for RpcError {
    fn from(e: minicbor::decode::Error) -> Self {
        Self::Cbor(e.to_string())
    }
}

/// Request endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Endpoint {
    /// Read the running configuration
    Config = 0x01,
    /// Read component status
    Status = 0x02,
}

impl Endpoint {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::Config),
            0x02 => Some(Self::Status),
            _ => None,
        }
    }
}

/// Frame header prepended to every RPC datagram.
///
/// `length` is the total frame size including this header; `tag` is an opaque
/// correlation value the caller picks and the reply echoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcHeader {
    pub version: u16,
    pub length: u16,
    pub endpoint: u8,
    pub tag: u8,
}

impl RpcHeader {
    /// Build a header for a frame carrying `payload_len` payload bytes.
    pub fn for_payload(endpoint: u8, tag: u8, payload_len: usize) -> Result<Self> {
        let length = HEADER_LEN + payload_len;
        if length > u16::MAX as usize {
            return Err(RpcError::Frame(format!("frame too large: {length}")));
        }
        Ok(Self {
            version: RPC_VERSION,
            length: length as u16,
            endpoint,
            tag,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..2].copy_from_slice(&self.version.to_le_bytes());
        out[2..4].copy_from_slice(&self.length.to_le_bytes());
        out[4] = self.endpoint;
        out[5] = self.tag;
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(RpcError::Frame(format!("short frame: {} bytes", buf.len())));
        }
        Ok(Self {
            version: u16::from_le_bytes([buf[0], buf[1]]),
            length: u16::from_le_bytes([buf[2], buf[3]]),
            endpoint: buf[4],
            tag: buf[5],
        })
    }
}

/// Assemble a full frame from a header-describing triple and payload bytes.
pub fn build_frame(endpoint: u8, tag: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let header = RpcHeader::for_payload(endpoint, tag, payload.len())?;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(payload);
    Ok(frame)
}
