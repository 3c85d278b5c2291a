// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Layer-2 protocol handling.
//!
//! The [`Handler`] is the composition root for everything above the raw radio
//! engine: it receives inbound frames, and owns the [`beacon::Beaconator`]
//! that keeps the radio's autonomous beacon configuration current. Upper
//! layer logic plugs in here.

pub mod beacon;

use crate::confd::{ConfdError, RuntimeConfig};
use crate::radio::{Radio, RadioError, ReceivedPacket};
use blazenet_proto::{mac, phy};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use thiserror::Error;

/// Protocol layer errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("radio error: {0}")]
    Radio(#[from] RadioError),

    #[error("runtime config error: {0}")]
    Confd(#[from] ConfdError),

    #[error("invalid beacon interval: {0} ms (min {min} ms)", min = crate::radio::MIN_BEACON_INTERVAL.as_millis())]
    BeaconInterval(i64),

    #[error("failed to read network id: got {0} bytes")]
    NetworkId(usize),

    #[error("beacon frame too large: {0} bytes")]
    FrameTooLarge(usize),
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Low level BlazeNet protocol handler.
pub struct Handler {
    radio: Rc<Radio>,
    beaconator: RefCell<Option<beacon::Beaconator>>,
    /// Frames surfaced from the radio since startup
    rx_frames: Cell<u64>,
}

impl Handler {
    /// Set up protocol handling on an initialized radio.
    ///
    /// Installs the inbound packet sink and brings up the beacon manager,
    /// which immediately pushes frame and interval to the radio.
    pub fn new(radio: Rc<Radio>, runtime: Rc<dyn RuntimeConfig>) -> Result<Rc<Self>> {
        let handler = Rc::new(Self {
            radio: Rc::clone(&radio),
            beaconator: RefCell::new(None),
            rx_frames: Cell::new(0),
        });

        let weak = Rc::downgrade(&handler);
        radio.set_packet_sink(Box::new(move |packet| {
            if let Some(handler) = weak.upgrade() {
                handler.handle_packet(packet);
            }
        }));

        let beaconator = beacon::Beaconator::new(radio, runtime)?;
        handler.beaconator.borrow_mut().replace(beaconator);

        Ok(handler)
    }

    /// Re-read the protocol configuration (currently the beacon settings),
    /// optionally pushing the result to the radio.
    pub fn reload_config(&self, upload: bool) -> Result<()> {
        if let Some(beaconator) = self.beaconator.borrow_mut().as_mut() {
            beaconator.reload_config(upload)?;
        }
        Ok(())
    }

    /// Number of frames received since startup.
    pub fn rx_frames(&self) -> u64 {
        self.rx_frames.get()
    }

    pub fn radio(&self) -> &Rc<Radio> {
        &self.radio
    }

    fn handle_packet(&self, packet: ReceivedPacket) {
        self.rx_frames.set(self.rx_frames.get() + 1);

        if packet.payload.len() < phy::HEADER_LEN + mac::HEADER_LEN {
            log::warn!("runt frame received: {} bytes", packet.payload.len());
            return;
        }

        // TODO: dispatch by MAC endpoint once upper-layer handlers exist
        if let Some(header) = mac::Header::parse(&packet.payload[phy::HEADER_LEN..]) {
            log::debug!(
                "rx frame: {} bytes, ${:04x} -> ${:04x}, rssi {} dB, lqi {}",
                packet.payload.len(),
                header.source,
                header.destination,
                packet.rssi,
                packet.lqi
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confd::{StaticConfig, Value};
    use crate::radio::{PacketPriority, PROTOCOL_VERSION};
    use crate::runloop::RunLoop;
    use crate::transport::commands::{CommandId, InfoResponse};
    use crate::transport::harness::TestHarnessTransport;
    use crate::config::Config;

    fn test_config() -> Config {
        toml::from_str(
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
            listen = "/tmp/blazed-test.sock"
            "#,
        )
        .unwrap()
    }

    fn runtime() -> Rc<StaticConfig> {
        Rc::new(
            StaticConfig::new()
                .with("radio.phy.channel", Value::Int(11))
                .with("radio.phy.txPower", Value::Real(10.0))
                .with("radio.beacon.interval", Value::Int(5000))
                .with("radio.beacon.id", Value::Blob((0x00..0x10).collect())),
        )
    }

    fn attach() -> (
        Rc<Handler>,
        Rc<Radio>,
        Rc<RefCell<TestHarnessTransport>>,
        RunLoop,
    ) {
        let mut transport = TestHarnessTransport::new();
        let mut info = vec![0u8; InfoResponse::SIZE];
        info[0] = 1;
        info[1] = PROTOCOL_VERSION;
        info[38] = 200;
        transport.push_response(CommandId::GetInfo, info);

        let transport = Rc::new(RefCell::new(transport));
        let run_loop = RunLoop::new().unwrap();
        let radio = Radio::attach(
            transport.clone(),
            &test_config(),
            runtime(),
            &run_loop.handle(),
        )
        .unwrap();
        let handler = Handler::new(radio.clone(), runtime()).unwrap();
        (handler, radio, transport, run_loop)
    }

    #[test]
    fn construction_uploads_beacon() {
        let (_handler, _radio, transport, _rl) = attach();

        let transport = transport.borrow();
        let beacon_writes: Vec<_> = transport
            .writes
            .iter()
            .filter(|w| w.command == CommandId::BeaconConfig)
            .collect();
        assert_eq!(beacon_writes.len(), 1);
        // update-config and enabled bits, 5000 ms interval
        assert_eq!(beacon_writes[0].payload[0], 0x03);
        assert_eq!(&beacon_writes[0].payload[1..3], &5000u16.to_le_bytes());
    }

    #[test]
    fn drop_disables_beaconing() {
        let (handler, _radio, transport, _rl) = attach();
        transport.borrow_mut().writes.clear();

        drop(handler);

        let transport = transport.borrow();
        let beacon_writes: Vec<_> = transport
            .writes
            .iter()
            .filter(|w| w.command == CommandId::BeaconConfig)
            .collect();
        assert_eq!(beacon_writes.len(), 1);
        // update-config set, enabled clear
        assert_eq!(beacon_writes[0].payload[0], 0x01);
    }

    #[test]
    fn received_frames_are_counted() {
        let (handler, radio, transport, _rl) = attach();

        // a frame sits in the radio's receive queue
        {
            let mut t = transport.borrow_mut();
            t.push_response(
                CommandId::IrqStatus,
                vec![0b0000_0010], // rxQueueNotEmpty
            );
            t.push_response(CommandId::GetPacketQueueStatus, vec![0x01, 8]);
            let mut frame = vec![0xd8, 100]; // rssi, lqi
            frame.extend_from_slice(&[7, 0x01, 0, 0x01, 0x00, 0xff, 0xff, 0x00]);
            t.push_response(CommandId::ReadPacket, frame);
            t.push_response(CommandId::GetPacketQueueStatus, vec![0x00, 0]);
        }

        radio.irq_handler().unwrap();
        assert_eq!(handler.rx_frames(), 1);
    }

    #[test]
    fn reload_pushes_new_interval() {
        let (handler, _radio, transport, _rl) = attach();
        transport.borrow_mut().writes.clear();

        handler.reload_config(true).unwrap();

        let transport = transport.borrow();
        assert!(transport
            .writes
            .iter()
            .any(|w| w.command == CommandId::BeaconConfig));
    }

    #[test]
    fn handler_survives_tx_traffic() {
        let (_handler, radio, transport, _rl) = attach();
        transport.borrow_mut().writes.clear();

        radio.queue_tx(PacketPriority::NetworkControl, &[0x02, 0xab, 0xcd]);
        assert_eq!(transport.borrow().transmitted().len(), 1);
    }
}
