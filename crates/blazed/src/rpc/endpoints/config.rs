// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Configuration endpoint.
//!
//! Read-only for now; changeable settings live in confd, which clients can
//! update directly.

use crate::rpc::connection::ClientConnection;
use crate::rpc::server::RpcServer;
use crate::rpc::{cbor, Result, RpcError};
use crate::version;
use std::rc::Rc;

/// Handle a config request: a CBOR map whose `get` key names the item.
pub fn handle(server: &Rc<RpcServer>, conn: &Rc<ClientConnection>, payload: &[u8]) -> Result<()> {
    let Some(key) = cbor::map_get_text(payload, "get")? else {
        return Err(RpcError::InvalidRequest(
            "invalid config request (missing `get` key)".into(),
        ));
    };

    match key.to_ascii_lowercase().as_str() {
        "radio" => radio_config(server, conn),
        "version" => version_info(server, conn),
        other => Err(RpcError::InvalidRequest(format!(
            "unknown config key `{other}`"
        ))),
    }
}

/// Reply with the running radio configuration.
fn radio_config(server: &Rc<RpcServer>, conn: &Rc<ClientConnection>) -> Result<()> {
    let radio = server.radio();

    let mut payload = Vec::new();
    let mut e = minicbor::Encoder::new(&mut payload);
    e.map(4)
        .and_then(|e| e.str("txPower"))
        .and_then(|e| e.f32(radio.tx_power_dbm() as f32))
        .and_then(|e| e.str("channel"))
        .and_then(|e| e.u32(u32::from(radio.channel())))
        .and_then(|e| e.str("shortAddress"))
        .and_then(|e| e.u16(radio.short_address()))
        .and_then(|e| e.str("sn"))
        .and_then(|e| e.str(&radio.serial()))
        .map_err(|e| RpcError::Cbor(e.to_string()))?;

    conn.reply(&payload)
}

/// Reply with daemon and radio firmware version information.
fn version_info(server: &Rc<RpcServer>, conn: &Rc<ClientConnection>) -> Result<()> {
    let mut payload = Vec::new();
    let mut e = minicbor::Encoder::new(&mut payload);
    e.map(3)
        .and_then(|e| e.str("version"))
        .and_then(|e| e.str(version::VERSION))
        .and_then(|e| e.str("build"))
        .and_then(|e| e.str(version::BUILD_REV))
        .and_then(|e| e.str("radioVersion"))
        .and_then(|e| e.str(&server.radio().firmware_build()))
        .map_err(|e| RpcError::Cbor(e.to_string()))?;

    conn.reply(&payload)
}
