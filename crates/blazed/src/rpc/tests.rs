// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end RPC tests: a real SEQPACKET socket pair, the server driven by
//! the run loop, the client blocking on replies.

use super::client::RpcClient;
use super::server::{RpcServer, MAX_CLIENTS};
use super::{build_frame, Endpoint, RpcError, HEADER_LEN};
use crate::confd::{StaticConfig, Value};
use crate::config::Config;
use crate::protocol::Handler;
use crate::radio::{Radio, PROTOCOL_VERSION};
use crate::runloop::RunLoop;
use crate::transport::commands::{CommandId, CountersReport, InfoResponse};
use crate::transport::harness::TestHarnessTransport;
use minicbor::data::Type;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

struct Fixture {
    server: Rc<RpcServer>,
    radio: Rc<Radio>,
    transport: Rc<RefCell<TestHarnessTransport>>,
    run_loop: RunLoop,
    socket_path: PathBuf,
    _tmp: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let socket_path = tmp.path().join("rpc.sock");

    let config_toml = format!(
        r#"
        [radio.transport]
        type = "spidev"
        file = "/dev/spidev0.0"
        freq = 4000000
        mode = 0
        irq = "gpiochip0:27"

        [network.addresses]
        mine = 0x1234

        [rpc]
        listen = "{}"
        "#,
        socket_path.display()
    );
    let config: Config = toml::from_str(&config_toml).unwrap();

    let runtime = Rc::new(
        StaticConfig::new()
            .with("radio.phy.channel", Value::Int(11))
            .with("radio.phy.txPower", Value::Real(10.0))
            .with("radio.beacon.interval", Value::Int(5000))
            .with("radio.beacon.id", Value::Blob((0x00..0x10).collect())),
    );

    let mut transport = TestHarnessTransport::new();
    let mut info = vec![0u8; InfoResponse::SIZE];
    info[0] = 1;
    info[1] = PROTOCOL_VERSION;
    info[14..20].copy_from_slice(b"ABC123");
    info[38] = 200;
    transport.push_response(CommandId::GetInfo, info);
    let transport = Rc::new(RefCell::new(transport));

    let run_loop = RunLoop::new().unwrap();
    let handle = run_loop.handle();

    let radio = Radio::attach(transport.clone(), &config, runtime.clone(), &handle).unwrap();
    let handler = Handler::new(radio.clone(), runtime).unwrap();
    let server = RpcServer::start(radio.clone(), handler, &config.rpc, &handle).unwrap();

    Fixture {
        server,
        radio,
        transport,
        run_loop,
        socket_path,
        _tmp: tmp,
    }
}

/// Give the run loop a few passes to accept clients and serve requests.
fn pump(fx: &mut Fixture) {
    for _ in 0..6 {
        fx.run_loop
            .run_once(Some(Duration::from_millis(10)))
            .unwrap();
    }
}

fn encode_get(key: &str) -> Vec<u8> {
    let mut out = Vec::new();
    let mut e = minicbor::Encoder::new(&mut out);
    e.map(1).unwrap().str("get").unwrap().str(key).unwrap();
    out
}

/// Flatten a one-level CBOR map into key -> printable value.
fn decode_flat_map(payload: &[u8]) -> HashMap<String, String> {
    let mut d = minicbor::Decoder::new(payload);
    let mut out = HashMap::new();
    let len = d.map().unwrap().unwrap();
    for _ in 0..len {
        let key = d.str().unwrap().to_string();
        let value = match d.datatype().unwrap() {
            Type::String => d.str().unwrap().to_string(),
            Type::F32 => d.f32().unwrap().to_string(),
            Type::U8 | Type::U16 | Type::U32 | Type::U64 => d.u64().unwrap().to_string(),
            other => panic!("unexpected value type {other}"),
        };
        out.insert(key, value);
    }
    out
}

#[test]
fn version_request_round_trips() {
    let mut fx = fixture();
    let client = RpcClient::connect(&fx.socket_path).unwrap();

    let tag = client
        .send_request(Endpoint::Config, &encode_get("version"))
        .unwrap();
    pump(&mut fx);

    let (header, payload) = client.recv_reply().unwrap();
    assert_eq!(header.endpoint, Endpoint::Config as u8);
    assert_eq!(header.tag, tag);
    assert_eq!(header.length as usize, HEADER_LEN + payload.len());

    let map = decode_flat_map(&payload);
    assert_eq!(map["version"], env!("CARGO_PKG_VERSION"));
    assert!(map.contains_key("build"));
    assert!(map.contains_key("radioVersion"));
}

#[test]
fn radio_config_request_reports_cached_state() {
    let mut fx = fixture();
    let client = RpcClient::connect(&fx.socket_path).unwrap();

    client
        .send_request(Endpoint::Config, &encode_get("radio"))
        .unwrap();
    pump(&mut fx);

    let (_, payload) = client.recv_reply().unwrap();
    let map = decode_flat_map(&payload);
    assert_eq!(map["txPower"], "10");
    assert_eq!(map["channel"], "11");
    assert_eq!(map["shortAddress"], (0x1234u64).to_string());
    assert_eq!(map["sn"], "ABC123");
}

#[test]
fn counters_request_sums_queue_discards() {
    let mut fx = fixture();

    // prime the accumulators through a counter read
    let report = CountersReport {
        tx_good_frames: 5,
        tx_cca_fails: 2,
        rx_good_frames: 9,
        rx_frame_errors: 1,
        ..Default::default()
    };
    let mut report = report;
    report.tx_queue.buffer_discards = 1;
    report.tx_queue.alloc_fails = 2;
    report.tx_queue.queue_discards = 3;
    fx.transport
        .borrow_mut()
        .push_response(CommandId::GetCounters, report.encode().to_vec());
    fx.radio.counter_reader_fired().unwrap();

    let client = RpcClient::connect(&fx.socket_path).unwrap();
    client
        .send_request(Endpoint::Status, &encode_get("radio.counters"))
        .unwrap();
    pump(&mut fx);

    let (_, payload) = client.recv_reply().unwrap();

    let mut d = minicbor::Decoder::new(&payload);
    let len = d.map().unwrap().unwrap();
    assert_eq!(len, 3);

    let mut tx: HashMap<String, u64> = HashMap::new();
    let mut rx: HashMap<String, u64> = HashMap::new();
    let mut read_at = None;
    for _ in 0..len {
        match d.str().unwrap() {
            "tx" => {
                let n = d.map().unwrap().unwrap();
                for _ in 0..n {
                    let k = d.str().unwrap().to_string();
                    tx.insert(k, d.u64().unwrap());
                }
            }
            "rx" => {
                let n = d.map().unwrap().unwrap();
                for _ in 0..n {
                    let k = d.str().unwrap().to_string();
                    rx.insert(k, d.u64().unwrap());
                }
            }
            "readAt" => read_at = Some(d.u64().unwrap()),
            other => panic!("unexpected key {other}"),
        }
    }

    assert_eq!(tx["good"], 5);
    assert_eq!(tx["ccaFails"], 2);
    assert_eq!(tx["queueDiscards"], 6); // 1 + 2 + 3
    assert_eq!(rx["good"], 9);
    assert_eq!(rx["errors"], 1);
    assert_eq!(read_at, Some(u64::MAX));
}

#[test]
fn replies_preserve_request_order_and_tags() {
    let mut fx = fixture();
    let client = RpcClient::connect(&fx.socket_path).unwrap();

    let tag1 = client
        .send_request(Endpoint::Config, &encode_get("version"))
        .unwrap();
    let tag2 = client
        .send_request(Endpoint::Config, &encode_get("radio"))
        .unwrap();
    assert_ne!(tag1, tag2);
    pump(&mut fx);

    let (first, _) = client.recv_reply().unwrap();
    let (second, _) = client.recv_reply().unwrap();
    assert_eq!(first.tag, tag1);
    assert_eq!(second.tag, tag2);
}

#[test]
fn bad_version_closes_connection_without_reply() {
    let mut fx = fixture();
    let client = RpcClient::connect(&fx.socket_path).unwrap();

    let mut frame = build_frame(Endpoint::Config as u8, 0, &encode_get("version")).unwrap();
    frame[0..2].copy_from_slice(&0x0200u16.to_le_bytes());
    client.send_raw(&frame).unwrap();
    pump(&mut fx);

    assert!(matches!(client.recv_reply(), Err(RpcError::Disconnected)));
}

#[test]
fn unknown_endpoint_closes_connection() {
    let mut fx = fixture();
    let client = RpcClient::connect(&fx.socket_path).unwrap();

    client.send_raw(&build_frame(0x7f, 0, &[]).unwrap()).unwrap();
    pump(&mut fx);

    assert!(matches!(client.recv_reply(), Err(RpcError::Disconnected)));
}

#[test]
fn undersized_length_field_closes_connection() {
    let mut fx = fixture();
    let client = RpcClient::connect(&fx.socket_path).unwrap();

    let mut frame = build_frame(Endpoint::Config as u8, 0, &[]).unwrap();
    frame[2..4].copy_from_slice(&3u16.to_le_bytes());
    client.send_raw(&frame).unwrap();
    pump(&mut fx);

    assert!(matches!(client.recv_reply(), Err(RpcError::Disconnected)));
}

#[test]
fn unknown_config_key_closes_connection() {
    let mut fx = fixture();
    let client = RpcClient::connect(&fx.socket_path).unwrap();

    client
        .send_request(Endpoint::Config, &encode_get("nonsense"))
        .unwrap();
    pump(&mut fx);

    assert!(matches!(client.recv_reply(), Err(RpcError::Disconnected)));
}

#[test]
fn garbage_payload_closes_connection() {
    let mut fx = fixture();
    let client = RpcClient::connect(&fx.socket_path).unwrap();

    client
        .send_raw(&build_frame(Endpoint::Config as u8, 0, &[0xff, 0xfe, 0x01]).unwrap())
        .unwrap();
    pump(&mut fx);

    assert!(matches!(client.recv_reply(), Err(RpcError::Disconnected)));
}

#[test]
fn over_capacity_accept_rejects_after_offcycle_gc() {
    let mut fx = fixture();

    let mut clients = Vec::new();
    for _ in 0..MAX_CLIENTS {
        clients.push(RpcClient::connect(&fx.socket_path).unwrap());
        // accept within the listen backlog
        fx.run_loop
            .run_once(Some(Duration::from_millis(1)))
            .unwrap();
    }
    pump(&mut fx);
    assert_eq!(fx.server.client_count(), MAX_CLIENTS);

    // the 101st is turned away: all existing clients are live, so the
    // off-cycle GC reclaims nothing
    let rejected = RpcClient::connect(&fx.socket_path).unwrap();
    pump(&mut fx);
    assert_eq!(fx.server.client_count(), MAX_CLIENTS);
    assert_eq!(fx.server.clients_rejected(), 1);
    assert!(matches!(rejected.recv_reply(), Err(RpcError::Disconnected)));

    // once a client goes away, admission succeeds again via off-cycle GC
    drop(clients.pop());
    pump(&mut fx); // server notices the EOF, marks the slot dead
    let replacement = RpcClient::connect(&fx.socket_path).unwrap();
    pump(&mut fx);
    assert_eq!(fx.server.client_count(), MAX_CLIENTS);
    assert_eq!(fx.server.clients_rejected(), 1);

    let tag = replacement
        .send_request(Endpoint::Config, &encode_get("version"))
        .unwrap();
    pump(&mut fx);
    let (header, _) = replacement.recv_reply().unwrap();
    assert_eq!(header.tag, tag);
}
