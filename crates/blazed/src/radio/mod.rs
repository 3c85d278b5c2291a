// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Radio engine.
//!
//! Owns all state tied to the radio coprocessor: cached configuration, the
//! four priority transmit queues, accumulated performance counters, and the
//! interrupt servicing machinery (edge handler, watchdog for lost edges, and
//! an optional poll fallback for hosts without working edge interrupts).
//!
//! The transport `RefCell` doubles as the transport lock: it is held across
//! every command sequence that must not interleave, in particular the
//! command + `GetStatus` verification pair. A double borrow panics, which is
//! exactly the reentrancy guard we want in a single-threaded loop.

#[cfg(test)]
mod tests;

use crate::confd::{ConfdError, RuntimeConfig};
use crate::config::Config;
use crate::runloop;
use crate::transport::commands::{
    BeaconConfigRequest, CodecError, CommandId, CountersReport, InfoResponse, IrqFlags,
    PacketQueueStatus, RadioConfigRequest, ReadPacketHeader, StatusRegister,
    TransmitPacketRequest,
};
use crate::transport::{Transport, TransportError};
use std::cell::{Cell, OnceCell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Radio protocol version this daemon speaks.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Minimum beacon interval.
pub const MIN_BEACON_INTERVAL: Duration = Duration::from_millis(1_000);

/// Confd key for the radio PHY channel.
const CONF_PHY_CHANNEL: &str = "radio.phy.channel";
/// Confd key for the radio transmit power (float dBm).
const CONF_PHY_TX_POWER: &str = "radio.phy.txPower";

/// Performance counter read interval.
const COUNTER_READ_INTERVAL: Duration = Duration::from_secs(30);

/// How long we tolerate silence on the interrupt line while interrupts are
/// pending before declaring an edge lost.
const IRQ_WATCHDOG_THRESHOLD: Duration = Duration::from_millis(250);

/// Whether watchdog triggerings are logged.
const IRQ_WATCHDOG_LOGGING: bool = true;

/// Radio engine errors.
#[derive(Debug, Error)]
pub enum RadioError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("runtime config error: {0}")]
    Confd(#[from] ConfdError),

    /// The radio's status register reported the last command failed.
    #[error("radio command failed: {0}")]
    CommandFailed(&'static str),

    #[error("incompatible radio protocol version ${0:02x}")]
    ProtocolVersion(u8),

    #[error("failed to get radio info: status {0}")]
    InfoFailed(u8),

    #[error("missing runtime config key `{0}`")]
    MissingConfig(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for radio operations.
pub type Result<T> = std::result::Result<T, RadioError>;

/// Packet priority levels.
///
/// Both the radio's internal queues and our own transmit queues are divided
/// by priority; numerically higher values drain first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum PacketPriority {
    /// Lowest priority; no delivery guarantee
    Background = 0,
    /// Standard traffic
    Normal = 1,
    /// Packets that should go out immediately, e.g. device control
    RealTime = 2,
    /// Network control traffic; must never stall
    NetworkControl = 3,
}

impl PacketPriority {
    /// Number of priority levels.
    pub const NUM_LEVELS: usize = 4;

    fn index(self) -> usize {
        self as usize
    }
}

/// Transmit performance counters, accumulated from the radio's 32-bit
/// counters into 64 bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxCounters {
    /// Packets discarded due to insufficient buffer space
    pub buffer_discards: u64,
    /// Packets discarded due to allocation failures
    pub alloc_discards: u64,
    /// Packets discarded due to insufficient queue space
    pub queue_discards: u64,
    /// Drops due to FIFO underruns
    pub fifo_drops: u64,
    /// Packets discarded because the radio could not get a clear channel
    pub cca_fails: u64,
    /// Successfully transmitted frames
    pub good_frames: u64,
}

impl TxCounters {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Receive performance counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxCounters {
    /// Packets discarded due to insufficient buffer space
    pub buffer_discards: u64,
    /// Packets discarded due to allocation failures
    pub alloc_discards: u64,
    /// Packets discarded due to insufficient queue space
    pub queue_discards: u64,
    /// FIFO overruns
    pub fifo_overflows: u64,
    /// Packets discarded due to framing errors
    pub frame_errors: u64,
    /// Successfully received frames
    pub good_frames: u64,
}

impl RxCounters {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A packet awaiting transmission.
struct TxPacket {
    priority: PacketPriority,
    /// Raw frame data, all headers applied, PHY length byte first
    payload: Vec<u8>,
}

/// A frame received from the radio, surfaced to the protocol handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPacket {
    /// Signal strength, in dB
    pub rssi: i8,
    /// Link quality, 0 (worst) to 255 (best)
    pub lqi: u8,
    /// Frame contents, including the PHY length byte
    pub payload: Vec<u8>,
}

/// Receiver for inbound frames.
///
/// Invoked with the transport lock held; the sink must not issue radio
/// commands of its own.
pub type PacketSink = Box<dyn Fn(ReceivedPacket)>;

/// Identity read from the radio at attach time.
struct Identity {
    eui64: [u8; 8],
    serial: String,
    fw_build: String,
}

/// Stateful owner of the radio coprocessor.
pub struct Radio {
    transport: Rc<RefCell<dyn Transport>>,
    runtime: Rc<dyn RuntimeConfig>,

    /// Transmit queues, one per priority level
    tx_queues: RefCell<[VecDeque<TxPacket>; PacketPriority::NUM_LEVELS]>,

    identity: OnceCell<Identity>,

    /// Short address from the static config file
    configured_address: u16,

    channel: Cell<u16>,
    /// Current transmit power, ⅒ dBm
    tx_power: Cell<u16>,
    /// Maximum transmit power the hardware supports, ⅒ dBm
    max_tx_power: Cell<u16>,
    short_address: Cell<u16>,
    config_dirty: Cell<bool>,

    irq_count: Cell<u64>,
    last_irq: Cell<Instant>,
    lost_irqs: Cell<u64>,

    tx_counters: RefCell<TxCounters>,
    rx_counters: RefCell<RxCounters>,

    packet_sink: RefCell<Option<PacketSink>>,
}

impl Radio {
    /// Bring up the radio on `transport`.
    ///
    /// Resets the coprocessor, wires up interrupt servicing (edge handler,
    /// watchdog, optional poll fallback), verifies the protocol version via
    /// `GetInfo`, enables the interrupts we care about, starts the counter
    /// reader, and uploads the initial configuration.
    pub fn attach(
        transport: Rc<RefCell<dyn Transport>>,
        config: &Config,
        runtime: Rc<dyn RuntimeConfig>,
        handle: &Rc<runloop::Handle>,
    ) -> Result<Rc<Self>> {
        transport.borrow_mut().reset()?;

        let radio = Rc::new(Self {
            transport: Rc::clone(&transport),
            runtime,
            tx_queues: RefCell::new(Default::default()),
            identity: OnceCell::new(),
            configured_address: config.network.addresses.mine,
            channel: Cell::new(0xffff),
            tx_power: Cell::new(0),
            max_tx_power: Cell::new(u16::MAX),
            short_address: Cell::new(0),
            config_dirty: Cell::new(true),
            irq_count: Cell::new(0),
            last_irq: Cell::new(Instant::now()),
            lost_irqs: Cell::new(0),
            tx_counters: RefCell::new(TxCounters::default()),
            rx_counters: RefCell::new(RxCounters::default()),
            packet_sink: RefCell::new(None),
        });

        {
            let weak = Rc::downgrade(&radio);
            transport.borrow_mut().on_irq(Rc::new(move || {
                if let Some(radio) = weak.upgrade() {
                    if let Err(e) = radio.irq_handler() {
                        log::error!("radio irq handler failed: {e}");
                    }
                }
            }));
        }
        radio.start_watchdog(
            handle,
            Duration::from_millis(config.radio.general.irq_watchdog_interval_ms),
        );

        let poll_ms = config.radio.general.poll_interval_ms;
        if poll_ms > 0 {
            radio.start_polling(handle, Duration::from_millis(poll_ms));
        }

        radio.init_device()?;
        radio.start_counter_reader(handle);
        radio.reload_config(true)?;

        Ok(radio)
    }

    /// Query device identity and configure interrupts.
    fn init_device(&self) -> Result<()> {
        let mut t = self.transport.borrow_mut();

        let mut buf = [0u8; InfoResponse::SIZE];
        t.send_read(CommandId::GetInfo, &mut buf)?;
        let info = InfoResponse::decode(&buf)?;

        if info.status != 1 {
            return Err(RadioError::InfoFailed(info.status));
        }
        if info.fw_protocol_version != PROTOCOL_VERSION {
            return Err(RadioError::ProtocolVersion(info.fw_protocol_version));
        }

        let eui = info.eui64;
        log::info!(
            "radio s/n: {}, EUI64: {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            info.serial_string(),
            eui[0], eui[1], eui[2], eui[3], eui[4], eui[5], eui[6], eui[7],
        );

        let _ = self.identity.set(Identity {
            eui64: info.eui64,
            serial: info.serial_string(),
            fw_build: info.fw_build_string(),
        });

        self.max_tx_power.set(u16::from(info.max_tx_power));
        self.tx_power.set(u16::from(info.max_tx_power));

        // only the events we service generate physical interrupts
        let irq_config = IrqFlags {
            rx_queue_not_empty: true,
            tx_queue_empty: true,
            ..Default::default()
        };
        t.send_write(CommandId::IrqConfig, &[irq_config.to_byte()])?;
        Self::ensure_cmd_success(&mut *t, "IrqConfig")
    }

    /// Re-read channel, transmit power and short address from the runtime
    /// configuration, optionally uploading the result to the radio.
    pub fn reload_config(&self, upload: bool) -> Result<()> {
        let channel = self
            .runtime
            .get_int(CONF_PHY_CHANNEL)?
            .ok_or(RadioError::MissingConfig(CONF_PHY_CHANNEL))?;
        self.set_channel(channel as u16);

        // stored as float dBm, the radio wants ⅒ dBm
        let tx_power = self
            .runtime
            .get_real(CONF_PHY_TX_POWER)?
            .ok_or(RadioError::MissingConfig(CONF_PHY_TX_POWER))?;
        let deci_dbm = (tx_power * 10.).max(0.) as u16;
        self.set_tx_power_decidbm(deci_dbm);

        log::debug!(
            "read radio config: channel={channel}, tx power={} dBm",
            f64::from(deci_dbm) / 10.
        );

        self.short_address.set(self.configured_address);
        log::debug!("coordinator address: ${:04x}", self.configured_address);

        if upload {
            self.upload_config()?;
        }
        Ok(())
    }

    /// Upload the cached configuration to the radio and clear the dirty flag.
    pub fn upload_config(&self) -> Result<()> {
        let request = RadioConfigRequest {
            channel: self.channel.get(),
            tx_power: self.tx_power.get(),
            my_address: self.short_address.get(),
        };

        let mut t = self.transport.borrow_mut();
        t.send_write(CommandId::RadioConfig, &request.encode())?;
        Self::ensure_cmd_success(&mut *t, "RadioConfig")?;

        self.config_dirty.set(false);
        Ok(())
    }

    /// Update the cached channel. Takes effect on the next
    /// [`Radio::upload_config`].
    pub fn set_channel(&self, channel: u16) {
        self.channel.set(channel);
        self.config_dirty.set(true);
    }

    /// Update the cached transmit power, in ⅒ dBm. Values above the hardware
    /// maximum are clamped. Takes effect on the next [`Radio::upload_config`].
    pub fn set_tx_power_decidbm(&self, power: u16) {
        let max = self.max_tx_power.get();
        if power > max {
            log::warn!("requested tx power {power} exceeds hardware max {max}, clamping");
        }
        self.tx_power.set(power.min(max));
        self.config_dirty.set(true);
    }

    /// Submit a packet for transmission.
    ///
    /// When all queues are empty the packet is written straight to the radio;
    /// on submission failure, or when anything is already queued, it joins the
    /// queue for its priority and goes out on a later `txQueueEmpty`
    /// interrupt. Holding the queue lock across the direct attempt keeps it
    /// from reordering ahead of a concurrently queued packet.
    pub fn queue_tx(&self, priority: PacketPriority, payload: &[u8]) {
        let mut queues = self.tx_queues.borrow_mut();

        if queues.iter().all(VecDeque::is_empty) {
            let mut t = self.transport.borrow_mut();
            match Self::submit_packet(&mut *t, priority, payload) {
                Ok(()) => return,
                Err(e) => log::warn!("direct packet submission failed, queuing: {e}"),
            }
        }

        queues[priority.index()].push_back(TxPacket {
            priority,
            payload: payload.to_vec(),
        });
    }

    /// Hand one packet to the radio and verify it was accepted.
    fn submit_packet(
        t: &mut dyn Transport,
        priority: PacketPriority,
        payload: &[u8],
    ) -> Result<()> {
        let request = TransmitPacketRequest {
            priority: priority as u8,
        };
        t.send_write(
            CommandId::TransmitPacket,
            &request.encode_with_payload(payload),
        )?;
        Self::ensure_cmd_success(t, "TransmitPacket")
    }

    /// Feed queued packets to the radio, highest priority first.
    ///
    /// Each non-empty queue contributes its head packet, which is only popped
    /// once the radio accepted it. The first failure aborts the drain so the
    /// packet stays put for the next attempt. Returns whether anything was
    /// sent.
    fn drain_tx(&self, t: &mut dyn Transport) -> bool {
        let mut sent = false;
        let mut queues = self.tx_queues.borrow_mut();

        for queue in queues.iter_mut().rev() {
            let Some(packet) = queue.front() else {
                continue;
            };

            match Self::submit_packet(t, packet.priority, &packet.payload) {
                Ok(()) => {
                    queue.pop_front();
                    sent = true;
                }
                Err(e) => {
                    log::warn!("failed to transmit packet during tx queue drain: {e}");
                    return sent;
                }
            }
        }

        sent
    }

    /// Update the autonomous beacon configuration and/or frame.
    ///
    /// With `update_config` clear and an empty payload the radio treats the
    /// command as a no-op; it is still sent as-is.
    pub fn set_beacon_config(
        &self,
        enabled: bool,
        interval: Duration,
        payload: &[u8],
        update_config: bool,
    ) -> Result<()> {
        let ms = interval.as_millis();
        if ms < MIN_BEACON_INTERVAL.as_millis() {
            return Err(RadioError::InvalidArgument(format!(
                "beacon interval too small: {ms} ms (min {} ms)",
                MIN_BEACON_INTERVAL.as_millis()
            )));
        }
        if ms > u128::from(u16::MAX) {
            return Err(RadioError::InvalidArgument(format!(
                "beacon interval too large: {ms} ms (max {} ms)",
                u16::MAX
            )));
        }

        let mut request = BeaconConfigRequest {
            update_config,
            ..Default::default()
        };
        if update_config {
            request.enabled = enabled;
            request.interval = ms as u16;
        }

        let mut t = self.transport.borrow_mut();
        t.send_write(CommandId::BeaconConfig, &request.encode_with_payload(payload))?;
        Self::ensure_cmd_success(&mut *t, "BeaconConfig")
    }

    /// Zero the local counter accumulators; with `remote` set, also clear the
    /// device counters by reading them out once first.
    pub fn reset_counters(&self, remote: bool) -> Result<()> {
        if remote {
            let mut t = self.transport.borrow_mut();
            self.query_counters(&mut *t)?;
        }

        self.rx_counters.borrow_mut().reset();
        self.tx_counters.borrow_mut().reset();
        Ok(())
    }

    /// Explicitly acknowledge (clear) pending interrupt sources.
    pub fn acknowledge_interrupts(&self, flags: IrqFlags) -> Result<()> {
        let mut t = self.transport.borrow_mut();
        t.send_write(CommandId::IrqStatus, &[flags.to_byte()])?;
        Self::ensure_cmd_success(&mut *t, "Write IrqStatus")
    }

    /// Install the receiver for inbound frames.
    pub fn set_packet_sink(&self, sink: PacketSink) {
        self.packet_sink.borrow_mut().replace(sink);
    }

    // ===== accessors =====

    pub fn channel(&self) -> u16 {
        self.channel.get()
    }

    /// Current transmit power, in dBm.
    pub fn tx_power_dbm(&self) -> f64 {
        f64::from(self.tx_power.get()) / 10.
    }

    pub fn short_address(&self) -> u16 {
        self.short_address.get()
    }

    pub fn eui64(&self) -> [u8; 8] {
        self.identity.get().map(|i| i.eui64).unwrap_or_default()
    }

    pub fn serial(&self) -> String {
        self.identity
            .get()
            .map(|i| i.serial.clone())
            .unwrap_or_default()
    }

    pub fn firmware_build(&self) -> String {
        self.identity
            .get()
            .map(|i| i.fw_build.clone())
            .unwrap_or_default()
    }

    pub fn rx_counters(&self) -> RxCounters {
        *self.rx_counters.borrow()
    }

    pub fn tx_counters(&self) -> TxCounters {
        *self.tx_counters.borrow()
    }

    /// Interrupts declared lost because no edge arrived in time.
    pub fn lost_irqs(&self) -> u64 {
        self.lost_irqs.get()
    }

    /// Whether a setter ran since the last successful upload.
    pub fn config_dirty(&self) -> bool {
        self.config_dirty.get()
    }

    // ===== interrupt servicing =====

    /// Entry point for a physical interrupt edge.
    pub fn irq_handler(&self) -> Result<()> {
        self.irq_count.set(self.irq_count.get() + 1);

        let mut t = self.transport.borrow_mut();
        let irq = Self::pending_interrupts(&mut *t)?;
        self.service_interrupts(&mut *t, irq)
    }

    /// Act on a pending-interrupt set; shared by the edge handler, the
    /// watchdog and the poll fallback.
    fn service_interrupts(&self, t: &mut dyn Transport, irq: IrqFlags) -> Result<()> {
        if irq.rx_queue_not_empty {
            // drain the receive queue completely
            while self.read_one_packet(t)? {}
        }
        if irq.tx_queue_empty {
            self.drain_tx(t);
        }

        self.last_irq.set(Instant::now());
        Ok(())
    }

    /// Read one packet out of the radio's receive queue, surfacing it to the
    /// packet sink. Returns false once no packet was pending.
    fn read_one_packet(&self, t: &mut dyn Transport) -> Result<bool> {
        let mut buf = [0u8; PacketQueueStatus::SIZE];
        t.send_read(CommandId::GetPacketQueueStatus, &mut buf)?;
        let status = PacketQueueStatus::decode(&buf)?;

        if !status.rx_packet_pending {
            return Ok(false);
        }

        let mut frame = vec![0u8; ReadPacketHeader::SIZE + status.rx_packet_size as usize];
        t.send_read(CommandId::ReadPacket, &mut frame)?;
        Self::ensure_cmd_success(t, "ReadPacket")?;

        let header = ReadPacketHeader::decode(&frame)?;
        let payload = frame.split_off(ReadPacketHeader::SIZE);
        log::trace!(
            "rx packet: {} bytes, rssi {} dB, lqi {}",
            payload.len(),
            header.rssi,
            header.lqi
        );

        if let Some(sink) = self.packet_sink.borrow().as_ref() {
            sink(ReceivedPacket {
                rssi: header.rssi,
                lqi: header.lqi,
                payload,
            });
        }

        Ok(true)
    }

    /// Check whether an interrupt edge was missed, and service any pending
    /// sources if so.
    fn irq_watchdog_fired(&self) -> Result<()> {
        // nothing to guard until the first interrupt arrives
        if self.irq_count.get() == 0 {
            return Ok(());
        }
        if self.last_irq.get().elapsed() <= IRQ_WATCHDOG_THRESHOLD {
            return Ok(());
        }

        let mut t = self.transport.borrow_mut();
        let irq = Self::pending_interrupts(&mut *t)?;

        if irq.any() {
            self.lost_irqs.set(self.lost_irqs.get() + 1);
            if IRQ_WATCHDOG_LOGGING {
                log::warn!("lost irq: {:#010b}", irq.to_byte());
            }
        }

        self.service_interrupts(&mut *t, irq)
    }

    /// Poll fallback: behaves like a manufactured interrupt.
    fn poll_timer_fired(&self) -> Result<()> {
        let mut t = self.transport.borrow_mut();
        let irq = Self::pending_interrupts(&mut *t)?;
        self.service_interrupts(&mut *t, irq)
    }

    /// Read the device counters and fold them into the 64-bit accumulators.
    /// The device clears its counters on read.
    fn query_counters(&self, t: &mut dyn Transport) -> Result<()> {
        let mut buf = [0u8; CountersReport::SIZE];
        t.send_read(CommandId::GetCounters, &mut buf)?;
        Self::ensure_cmd_success(t, "GetCounters")?;

        let report = CountersReport::decode(&buf)?;
        log::trace!(
            "tx: pending={}, alloc={} bytes; rx: pending={}, alloc={} bytes",
            report.tx_queue.packets_pending,
            report.tx_queue.buffer_size,
            report.rx_queue.packets_pending,
            report.rx_queue.buffer_size,
        );

        let mut tx = self.tx_counters.borrow_mut();
        tx.buffer_discards += u64::from(report.tx_queue.buffer_discards);
        tx.alloc_discards += u64::from(report.tx_queue.alloc_fails);
        tx.queue_discards += u64::from(report.tx_queue.queue_discards);
        tx.fifo_drops += u64::from(report.tx_fifo_drops);
        tx.cca_fails += u64::from(report.tx_cca_fails);
        tx.good_frames += u64::from(report.tx_good_frames);

        let mut rx = self.rx_counters.borrow_mut();
        rx.buffer_discards += u64::from(report.rx_queue.buffer_discards);
        rx.alloc_discards += u64::from(report.rx_queue.alloc_fails);
        rx.queue_discards += u64::from(report.rx_queue.queue_discards);
        rx.fifo_overflows += u64::from(report.rx_fifo_overflows);
        rx.frame_errors += u64::from(report.rx_frame_errors);
        rx.good_frames += u64::from(report.rx_good_frames);

        Ok(())
    }

    pub(crate) fn counter_reader_fired(&self) -> Result<()> {
        {
            let mut t = self.transport.borrow_mut();
            self.query_counters(&mut *t)?;
        }

        let rx = self.rx_counters.borrow();
        let tx = self.tx_counters.borrow();
        log::trace!(
            "rx: fifo={},frame={} ok={}; queue buf={},alloc={},queue={}",
            rx.fifo_overflows, rx.frame_errors, rx.good_frames,
            rx.buffer_discards, rx.alloc_discards, rx.queue_discards,
        );
        log::trace!(
            "tx: fifo={},csma={} ok={}; queue buf={},alloc={},queue={}",
            tx.fifo_drops, tx.cca_fails, tx.good_frames,
            tx.buffer_discards, tx.alloc_discards, tx.queue_discards,
        );
        Ok(())
    }

    // ===== command helpers =====

    /// Read the pending-interrupt register; reading also clears it.
    fn pending_interrupts(t: &mut dyn Transport) -> Result<IrqFlags> {
        let mut buf = [0u8; IrqFlags::SIZE];
        t.send_read(CommandId::IrqStatus, &mut buf)?;
        Self::ensure_cmd_success(t, "Read IrqStatus")?;
        Ok(IrqFlags::from_byte(buf[0]))
    }

    fn query_status(t: &mut dyn Transport) -> Result<StatusRegister> {
        let mut buf = [0u8; StatusRegister::SIZE];
        t.send_read(CommandId::GetStatus, &mut buf)?;
        Ok(StatusRegister::from_byte(buf[0]))
    }

    /// Verify the last command succeeded via the status register.
    fn ensure_cmd_success(t: &mut dyn Transport, command: &'static str) -> Result<()> {
        let status = Self::query_status(t)?;
        if !status.cmd_success {
            return Err(RadioError::CommandFailed(command));
        }
        Ok(())
    }

    // ===== timers =====

    fn start_watchdog(self: &Rc<Self>, handle: &Rc<runloop::Handle>, interval: Duration) {
        log::trace!("irq watchdog interval: {} ms", interval.as_millis());
        let weak = Rc::downgrade(self);
        handle.add_timer(
            interval,
            true,
            Rc::new(move || {
                if let Some(radio) = weak.upgrade() {
                    if let Err(e) = radio.irq_watchdog_fired() {
                        log::error!("irq watchdog servicing failed: {e}");
                    }
                }
            }),
        );
    }

    fn start_polling(self: &Rc<Self>, handle: &Rc<runloop::Handle>, interval: Duration) {
        log::debug!("radio poll interval: {} ms", interval.as_millis());
        let weak = Rc::downgrade(self);
        handle.add_timer(
            interval,
            true,
            Rc::new(move || {
                if let Some(radio) = weak.upgrade() {
                    if let Err(e) = radio.poll_timer_fired() {
                        log::error!("radio poll servicing failed: {e}");
                    }
                }
            }),
        );
    }

    fn start_counter_reader(self: &Rc<Self>, handle: &Rc<runloop::Handle>) {
        let weak = Rc::downgrade(self);
        handle.add_timer(
            COUNTER_READ_INTERVAL,
            true,
            Rc::new(move || {
                if let Some(radio) = weak.upgrade() {
                    if let Err(e) = radio.counter_reader_fired() {
                        log::error!("counter read failed: {e}");
                    }
                }
            }),
        );
    }
}
