// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::*;
use crate::confd::{StaticConfig, Value};
use crate::runloop::RunLoop;
use crate::transport::harness::TestHarnessTransport;
use std::cell::RefCell;
use std::rc::Rc;

fn test_config(poll_interval_ms: u64) -> Config {
    let toml = format!(
        r#"
        [radio.transport]
        type = "spidev"
        file = "/dev/spidev0.0"
        freq = 4000000
        mode = 0
        irq = "gpiochip0:27"

        [radio.general]
        poll_interval_ms = {poll_interval_ms}

        [network.addresses]
        mine = 0x1234

        [rpc]
        listen = "/tmp/blazed-test.sock"
        "#
    );
    toml::from_str(&toml).unwrap()
}

fn runtime() -> Rc<StaticConfig> {
    Rc::new(
        StaticConfig::new()
            .with(CONF_PHY_CHANNEL, Value::Int(11))
            .with(CONF_PHY_TX_POWER, Value::Real(10.0)),
    )
}

fn info_response(protocol_version: u8, max_tx_power: u8) -> Vec<u8> {
    let mut buf = vec![0u8; InfoResponse::SIZE];
    buf[0] = 1; // status
    buf[1] = protocol_version;
    buf[2] = 1; // major
    buf[3] = 0; // minor
    buf[4..10].copy_from_slice(b"abc123");
    buf[14..20].copy_from_slice(b"ABC123");
    buf[30..38].copy_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]);
    buf[38] = max_tx_power;
    buf
}

struct Fixture {
    radio: Rc<Radio>,
    transport: Rc<RefCell<TestHarnessTransport>>,
    // timers registered during attach stay valid while this lives
    _run_loop: RunLoop,
}

fn attach_radio() -> Fixture {
    let mut transport = TestHarnessTransport::new();
    transport.push_response(CommandId::GetInfo, info_response(PROTOCOL_VERSION, 200));

    let transport = Rc::new(RefCell::new(transport));
    let run_loop = RunLoop::new().unwrap();

    let radio = Radio::attach(
        transport.clone(),
        &test_config(0),
        runtime(),
        &run_loop.handle(),
    )
    .unwrap();

    Fixture {
        radio,
        transport,
        _run_loop: run_loop,
    }
}

/// Byte the harness scripts into `IrqStatus` to signal `txQueueEmpty`.
fn irq_tx_queue_empty() -> Vec<u8> {
    vec![IrqFlags {
        tx_queue_empty: true,
        ..Default::default()
    }
    .to_byte()]
}

fn irq_rx_not_empty() -> Vec<u8> {
    vec![IrqFlags {
        rx_queue_not_empty: true,
        ..Default::default()
    }
    .to_byte()]
}

#[test]
fn startup_reads_identity_and_uploads_config() {
    let fx = attach_radio();

    assert_eq!(fx.transport.borrow().resets, 1);
    assert_eq!(fx.radio.serial(), "ABC123");
    assert_eq!(fx.radio.firmware_build(), "abc123");
    assert_eq!(
        fx.radio.eui64(),
        [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]
    );
    assert_eq!(fx.radio.channel(), 11);
    assert_eq!(fx.radio.tx_power_dbm(), 10.0);
    assert_eq!(fx.radio.short_address(), 0x1234);
    assert!(!fx.radio.config_dirty());

    // channel 11, 10.0 dBm as 100 deci-dBm, address 0x1234, little-endian
    let transport = fx.transport.borrow();
    let config_writes: Vec<_> = transport
        .writes
        .iter()
        .filter(|w| w.command == CommandId::RadioConfig)
        .collect();
    assert_eq!(config_writes.len(), 1);
    assert_eq!(config_writes[0].payload, vec![11, 0, 100, 0, 0x34, 0x12]);

    // interrupts enabled for rx-not-empty and tx-queue-empty
    let irq_writes: Vec<_> = transport
        .writes
        .iter()
        .filter(|w| w.command == CommandId::IrqConfig)
        .collect();
    assert_eq!(irq_writes.len(), 1);
    assert_eq!(irq_writes[0].payload, vec![0b0000_1010]);
}

#[test]
fn protocol_version_mismatch_is_fatal() {
    let mut transport = TestHarnessTransport::new();
    transport.push_response(CommandId::GetInfo, info_response(0x02, 200));

    let transport = Rc::new(RefCell::new(transport));
    let run_loop = RunLoop::new().unwrap();

    let result = Radio::attach(
        transport,
        &test_config(0),
        runtime(),
        &run_loop.handle(),
    );
    assert!(matches!(result, Err(RadioError::ProtocolVersion(0x02))));
}

#[test]
fn setters_dirty_config_and_upload_clears() {
    let fx = attach_radio();

    fx.radio.set_channel(15);
    assert!(fx.radio.config_dirty());

    fx.radio.upload_config().unwrap();
    assert!(!fx.radio.config_dirty());
    assert_eq!(fx.radio.channel(), 15);
}

#[test]
fn tx_power_clamped_to_hardware_maximum() {
    let fx = attach_radio();

    fx.radio.set_tx_power_decidbm(500); // hw max is 200
    assert_eq!(fx.radio.tx_power_dbm(), 20.0);
}

#[test]
fn empty_queues_submit_directly() {
    let fx = attach_radio();
    fx.transport.borrow_mut().writes.clear();

    fx.radio.queue_tx(PacketPriority::Normal, &[0x05, 1, 2, 3, 4, 5]);

    let transmitted = fx.transport.borrow().transmitted();
    assert_eq!(transmitted, vec![vec![0x01, 0x05, 1, 2, 3, 4, 5]]);

    // nothing left behind for a later drain
    fx.transport.borrow_mut().writes.clear();
    fx.transport
        .borrow_mut()
        .push_response(CommandId::IrqStatus, irq_tx_queue_empty());
    fx.radio.irq_handler().unwrap();
    assert!(fx.transport.borrow().transmitted().is_empty());
}

#[test]
fn drain_submits_by_descending_priority() {
    let fx = attach_radio();

    // radio rejects everything: all three packets end up queued
    fx.transport.borrow_mut().fail_next_transmits(1);
    fx.radio.queue_tx(PacketPriority::Background, b"p1");
    fx.radio.queue_tx(PacketPriority::Normal, b"p2");
    fx.radio.queue_tx(PacketPriority::NetworkControl, b"p3");
    fx.transport.borrow_mut().writes.clear();

    fx.transport
        .borrow_mut()
        .push_response(CommandId::IrqStatus, irq_tx_queue_empty());
    fx.radio.irq_handler().unwrap();

    let transmitted = fx.transport.borrow().transmitted();
    assert_eq!(
        transmitted,
        vec![
            [&[0x03u8][..], b"p3"].concat(),
            [&[0x01u8][..], b"p2"].concat(),
            [&[0x00u8][..], b"p1"].concat(),
        ]
    );
}

#[test]
fn drain_aborts_on_failure_and_retries_later() {
    let fx = attach_radio();

    fx.transport.borrow_mut().fail_next_transmits(1);
    fx.radio.queue_tx(PacketPriority::Background, b"p1");
    fx.radio.queue_tx(PacketPriority::Normal, b"p2");
    fx.radio.queue_tx(PacketPriority::NetworkControl, b"p3");
    fx.transport.borrow_mut().writes.clear();

    // p3 accepted, p2 rejected: p1 must not be attempted
    fx.transport
        .borrow_mut()
        .script_transmit_results(&[true, false]);
    fx.transport
        .borrow_mut()
        .push_response(CommandId::IrqStatus, irq_tx_queue_empty());
    fx.radio.irq_handler().unwrap();

    let transmitted = fx.transport.borrow().transmitted();
    assert_eq!(transmitted.len(), 2);
    assert_eq!(transmitted[0], [&[0x03u8][..], b"p3"].concat());
    assert_eq!(transmitted[1], [&[0x01u8][..], b"p2"].concat());

    // next drain finds p2 still at its queue head, then p1
    fx.transport.borrow_mut().writes.clear();
    fx.transport
        .borrow_mut()
        .push_response(CommandId::IrqStatus, irq_tx_queue_empty());
    fx.radio.irq_handler().unwrap();

    let transmitted = fx.transport.borrow().transmitted();
    assert_eq!(
        transmitted,
        vec![
            [&[0x01u8][..], b"p2"].concat(),
            [&[0x00u8][..], b"p1"].concat(),
        ]
    );
}

#[test]
fn same_priority_delivers_in_enqueue_order() {
    let fx = attach_radio();

    fx.transport.borrow_mut().fail_next_transmits(1);
    fx.radio.queue_tx(PacketPriority::Normal, b"first");
    fx.radio.queue_tx(PacketPriority::Normal, b"second");
    fx.transport.borrow_mut().writes.clear();

    // one drain per txQueueEmpty interrupt moves one packet per queue
    for _ in 0..2 {
        fx.transport
            .borrow_mut()
            .push_response(CommandId::IrqStatus, irq_tx_queue_empty());
        fx.radio.irq_handler().unwrap();
    }

    let transmitted = fx.transport.borrow().transmitted();
    assert_eq!(
        transmitted,
        vec![
            [&[0x01u8][..], b"first"].concat(),
            [&[0x01u8][..], b"second"].concat(),
        ]
    );
}

#[test]
fn rx_interrupt_drains_receive_queue() {
    let fx = attach_radio();

    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    fx.radio
        .set_packet_sink(Box::new(move |packet| sink.borrow_mut().push(packet)));

    {
        let mut transport = fx.transport.borrow_mut();
        transport.push_response(CommandId::IrqStatus, irq_rx_not_empty());
        // two packets pending, then queue empty
        transport.push_response(
            CommandId::GetPacketQueueStatus,
            PacketQueueStatus {
                rx_packet_pending: true,
                tx_packet_pending: false,
                rx_packet_size: 3,
            }
            .to_bytes()
            .to_vec(),
        );
        transport.push_response(CommandId::ReadPacket, vec![0xd8, 200, 0xaa, 0xbb, 0xcc]);
        transport.push_response(
            CommandId::GetPacketQueueStatus,
            PacketQueueStatus {
                rx_packet_pending: true,
                tx_packet_pending: false,
                rx_packet_size: 1,
            }
            .to_bytes()
            .to_vec(),
        );
        transport.push_response(CommandId::ReadPacket, vec![0xec, 10, 0x42]);
        transport.push_response(
            CommandId::GetPacketQueueStatus,
            PacketQueueStatus::default().to_bytes().to_vec(),
        );
    }

    fx.radio.irq_handler().unwrap();

    let received = received.borrow();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].rssi, -40);
    assert_eq!(received[0].lqi, 200);
    assert_eq!(received[0].payload, vec![0xaa, 0xbb, 0xcc]);
    assert_eq!(received[1].rssi, -20);
    assert_eq!(received[1].payload, vec![0x42]);
}

#[test]
fn watchdog_declares_lost_irq_and_services() {
    let fx = attach_radio();

    // no interrupts seen yet: watchdog stays quiet
    fx.radio.irq_watchdog_fired().unwrap();
    assert_eq!(fx.radio.lost_irqs(), 0);

    // one real (empty) interrupt, then silence past the threshold
    fx.transport
        .borrow_mut()
        .push_response(CommandId::IrqStatus, vec![0]);
    fx.radio.irq_handler().unwrap();
    fx.radio
        .last_irq
        .set(Instant::now() - Duration::from_millis(300));

    {
        let mut transport = fx.transport.borrow_mut();
        transport.push_response(CommandId::IrqStatus, irq_rx_not_empty());
        transport.push_response(
            CommandId::GetPacketQueueStatus,
            PacketQueueStatus {
                rx_packet_pending: true,
                tx_packet_pending: false,
                rx_packet_size: 2,
            }
            .to_bytes()
            .to_vec(),
        );
        transport.push_response(CommandId::ReadPacket, vec![0xf0, 50, 0x01, 0x02]);
        transport.push_response(
            CommandId::GetPacketQueueStatus,
            PacketQueueStatus::default().to_bytes().to_vec(),
        );
    }

    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    fx.radio
        .set_packet_sink(Box::new(move |packet| sink.borrow_mut().push(packet)));

    fx.radio.irq_watchdog_fired().unwrap();
    assert_eq!(fx.radio.lost_irqs(), 1);
    assert_eq!(received.borrow().len(), 1);

    // freshly serviced: a watchdog tick right after does nothing
    fx.radio.irq_watchdog_fired().unwrap();
    assert_eq!(fx.radio.lost_irqs(), 1);
}

#[test]
fn counters_accumulate_monotonically() {
    let fx = attach_radio();

    let report = CountersReport {
        tx_good_frames: 5,
        tx_cca_fails: 1,
        rx_good_frames: 7,
        rx_frame_errors: 2,
        ..Default::default()
    };

    fx.transport
        .borrow_mut()
        .push_response(CommandId::GetCounters, report.encode().to_vec());
    fx.radio.counter_reader_fired().unwrap();

    assert_eq!(fx.radio.tx_counters().good_frames, 5);
    assert_eq!(fx.radio.rx_counters().good_frames, 7);

    // device counters reset on read; locals keep growing
    fx.transport
        .borrow_mut()
        .push_response(CommandId::GetCounters, report.encode().to_vec());
    fx.radio.counter_reader_fired().unwrap();

    let tx = fx.radio.tx_counters();
    let rx = fx.radio.rx_counters();
    assert_eq!(tx.good_frames, 10);
    assert_eq!(tx.cca_fails, 2);
    assert_eq!(rx.good_frames, 14);
    assert_eq!(rx.frame_errors, 4);
}

#[test]
fn remote_counter_reset_issues_one_read_and_zeroes() {
    let fx = attach_radio();

    let report = CountersReport {
        tx_good_frames: 5,
        ..Default::default()
    };
    fx.transport
        .borrow_mut()
        .push_response(CommandId::GetCounters, report.encode().to_vec());
    fx.radio.counter_reader_fired().unwrap();
    assert_eq!(fx.radio.tx_counters().good_frames, 5);

    let reads_before = fx.transport.borrow().reads_of(CommandId::GetCounters);
    fx.radio.reset_counters(true).unwrap();

    assert_eq!(
        fx.transport.borrow().reads_of(CommandId::GetCounters),
        reads_before + 1
    );
    assert_eq!(fx.radio.tx_counters(), TxCounters::default());
    assert_eq!(fx.radio.rx_counters(), RxCounters::default());
}

#[test]
fn local_counter_reset_skips_the_radio() {
    let fx = attach_radio();

    let reads_before = fx.transport.borrow().reads_of(CommandId::GetCounters);
    fx.radio.reset_counters(false).unwrap();
    assert_eq!(
        fx.transport.borrow().reads_of(CommandId::GetCounters),
        reads_before
    );
}

#[test]
fn beacon_interval_bounds_enforced() {
    let fx = attach_radio();

    let too_small =
        fx.radio
            .set_beacon_config(true, Duration::from_millis(500), &[], true);
    assert!(matches!(too_small, Err(RadioError::InvalidArgument(_))));

    let too_large =
        fx.radio
            .set_beacon_config(true, Duration::from_millis(70_000), &[], true);
    assert!(matches!(too_large, Err(RadioError::InvalidArgument(_))));
}

#[test]
fn beacon_config_encodes_flags_and_interval() {
    let fx = attach_radio();
    fx.transport.borrow_mut().writes.clear();

    fx.radio
        .set_beacon_config(true, Duration::from_millis(5000), &[0xaa], true)
        .unwrap();

    let transport = fx.transport.borrow();
    let write = transport
        .writes
        .iter()
        .find(|w| w.command == CommandId::BeaconConfig)
        .unwrap();
    assert_eq!(write.payload, vec![0x03, 0x88, 0x13, 0xaa]);
}

#[test]
fn payload_only_beacon_update_sent_as_is() {
    let fx = attach_radio();
    fx.transport.borrow_mut().writes.clear();

    // update_config clear: enabled/interval fields stay zero on the wire
    fx.radio
        .set_beacon_config(true, Duration::from_millis(5000), &[0xbb], false)
        .unwrap();

    let transport = fx.transport.borrow();
    let write = transport
        .writes
        .iter()
        .find(|w| w.command == CommandId::BeaconConfig)
        .unwrap();
    assert_eq!(write.payload, vec![0x00, 0x00, 0x00, 0xbb]);
}

#[test]
fn failed_command_surfaces_by_name() {
    let fx = attach_radio();

    fx.radio.set_channel(26);
    fx.transport
        .borrow_mut()
        .push_response(CommandId::GetStatus, vec![0]);
    let result = fx.radio.upload_config();
    assert!(matches!(
        result,
        Err(RadioError::CommandFailed("RadioConfig"))
    ));
    // failed upload leaves the config dirty
    assert!(fx.radio.config_dirty());
}

#[test]
fn interrupt_acknowledge_writes_flag_byte() {
    let fx = attach_radio();
    fx.transport.borrow_mut().writes.clear();

    fx.radio
        .acknowledge_interrupts(IrqFlags {
            rx_queue_not_empty: true,
            ..Default::default()
        })
        .unwrap();

    let transport = fx.transport.borrow();
    let write = transport
        .writes
        .iter()
        .find(|w| w.command == CommandId::IrqStatus)
        .unwrap();
    assert_eq!(write.payload, vec![0b0000_0010]);
}
