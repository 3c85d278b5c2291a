// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Status endpoint.

use crate::rpc::connection::ClientConnection;
use crate::rpc::server::RpcServer;
use crate::rpc::{cbor, Result, RpcError};
use std::rc::Rc;

/// Handle a status request: a CBOR map whose `get` key names the item.
///
/// - `radio.counters`: accumulated rx/tx performance counters
pub fn handle(server: &Rc<RpcServer>, conn: &Rc<ClientConnection>, payload: &[u8]) -> Result<()> {
    let Some(key) = cbor::map_get_text(payload, "get")? else {
        return Err(RpcError::InvalidRequest(
            "invalid status request (missing `get` key)".into(),
        ));
    };

    match key.to_ascii_lowercase().as_str() {
        "radio.counters" => radio_counters(server, conn),
        other => Err(RpcError::InvalidRequest(format!(
            "unknown status key `{other}`"
        ))),
    }
}

/// Reply with the radio's receive and transmit counters.
fn radio_counters(server: &Rc<RpcServer>, conn: &Rc<ClientConnection>) -> Result<()> {
    let rx = server.radio().rx_counters();
    let tx = server.radio().tx_counters();

    let mut payload = Vec::new();
    let mut e = minicbor::Encoder::new(&mut payload);
    e.map(3)
        .and_then(|e| e.str("tx"))
        .and_then(|e| e.map(4))
        .and_then(|e| e.str("good"))
        .and_then(|e| e.u64(tx.good_frames))
        .and_then(|e| e.str("ccaFails"))
        .and_then(|e| e.u64(tx.cca_fails))
        .and_then(|e| e.str("fifoUnderruns"))
        .and_then(|e| e.u64(tx.fifo_drops))
        .and_then(|e| e.str("queueDiscards"))
        .and_then(|e| e.u64(tx.queue_discards + tx.alloc_discards + tx.buffer_discards))
        .and_then(|e| e.str("rx"))
        .and_then(|e| e.map(4))
        .and_then(|e| e.str("good"))
        .and_then(|e| e.u64(rx.good_frames))
        .and_then(|e| e.str("errors"))
        .and_then(|e| e.u64(rx.frame_errors))
        .and_then(|e| e.str("fifoOverflows"))
        .and_then(|e| e.u64(rx.fifo_overflows))
        .and_then(|e| e.str("queueDiscards"))
        .and_then(|e| e.u64(rx.queue_discards + rx.alloc_discards + rx.buffer_discards))
        // counter read timestamping is not implemented yet
        .and_then(|e| e.str("readAt"))
        .and_then(|e| e.u64(u64::MAX))
        .map_err(|e| RpcError::Cbor(e.to_string()))?;

    conn.reply(&payload)
}
