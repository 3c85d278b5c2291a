// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Radio command identifiers and record layouts.
//!
//! The host addresses the radio with 7-bit command ids; the high bit of the
//! wire command byte selects read (set) or write (clear). Every record below
//! is packed, multibyte fields little-endian, bitfields packed into single
//! bytes in declaration order. This module is pure serialisation and performs
//! no I/O.

use thiserror::Error;

/// Set on the wire command byte for read commands.
pub const READ_FLAG: u8 = 0x80;

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("record truncated at {cmd}: need {need} bytes, got {got}")]
    Truncated {
        cmd: &'static str,
        need: usize,
        got: usize,
    },
}

/// Result type for decode operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Command identifiers.
///
/// Ids are 7 bits; the high bit is reserved for the read/write selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandId {
    /// Does nothing; any payload is ignored
    NoOp = 0x00,
    /// Read the controller information descriptor
    GetInfo = 0x01,
    /// Configure the radio PHY (channel, power, address)
    RadioConfig = 0x02,
    /// Read the status register
    GetStatus = 0x03,
    /// Select which events assert the interrupt line
    IrqConfig = 0x04,
    /// Read the packet queue status
    GetPacketQueueStatus = 0x05,
    /// Read the oldest packet out of the receive queue
    ReadPacket = 0x06,
    /// Queue a packet for transmission
    TransmitPacket = 0x07,
    /// Configure autonomous beacon transmission
    BeaconConfig = 0x08,
    /// Read (and thereby clear) the performance counters
    GetCounters = 0x09,
    /// Read or acknowledge pending interrupts
    IrqStatus = 0x0a,
}

impl CommandId {
    /// The raw 7-bit command id.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Human-readable command name, for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::NoOp => "NoOp",
            Self::GetInfo => "GetInfo",
            Self::RadioConfig => "RadioConfig",
            Self::GetStatus => "GetStatus",
            Self::IrqConfig => "IrqConfig",
            Self::GetPacketQueueStatus => "GetPacketQueueStatus",
            Self::ReadPacket => "ReadPacket",
            Self::TransmitPacket => "TransmitPacket",
            Self::BeaconConfig => "BeaconConfig",
            Self::GetCounters => "GetCounters",
            Self::IrqStatus => "IrqStatus",
        }
    }
}

fn need(cmd: &'static str, buf: &[u8], size: usize) -> Result<()> {
    if buf.len() < size {
        return Err(CodecError::Truncated {
            cmd,
            need: size,
            got: buf.len(),
        });
    }
    Ok(())
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn str_from_padded(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

// ===== GetInfo =====

/// `GetInfo` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoResponse {
    /// 1 = success
    pub status: u8,
    /// Protocol version spoken by the firmware
    pub fw_protocol_version: u8,
    /// Major software version
    pub fw_major: u8,
    /// Minor software version
    pub fw_minor: u8,
    /// Build revision (NUL-padded ASCII)
    pub fw_build: [u8; 8],
    /// Hardware revision
    pub hw_rev: u8,
    /// Hardware feature bits (see [`hw_features`])
    pub hw_features: u8,
    /// Serial number (NUL-padded ASCII)
    pub serial: [u8; 16],
    /// EUI-64 radio address
    pub eui64: [u8; 8],
    /// Maximum transmit power, in ⅒ dBm
    pub max_tx_power: u8,
}

/// Hardware feature bits reported in [`InfoResponse::hw_features`].
pub mod hw_features {
    /// Controller has dedicated private storage
    pub const PRIVATE_STORAGE: u8 = 1 << 0;
}

impl InfoResponse {
    pub const SIZE: usize = 39;

    pub fn decode(buf: &[u8]) -> Result<Self> {
        need("GetInfo", buf, Self::SIZE)?;

        let mut fw_build = [0u8; 8];
        fw_build.copy_from_slice(&buf[4..12]);
        let mut serial = [0u8; 16];
        serial.copy_from_slice(&buf[14..30]);
        let mut eui64 = [0u8; 8];
        eui64.copy_from_slice(&buf[30..38]);

        Ok(Self {
            status: buf[0],
            fw_protocol_version: buf[1],
            fw_major: buf[2],
            fw_minor: buf[3],
            fw_build,
            hw_rev: buf[12],
            hw_features: buf[13],
            serial,
            eui64,
            max_tx_power: buf[38],
        })
    }

    /// Serial number with trailing padding stripped.
    pub fn serial_string(&self) -> String {
        str_from_padded(&self.serial)
    }

    /// Firmware build revision with trailing padding stripped.
    pub fn fw_build_string(&self) -> String {
        str_from_padded(&self.fw_build)
    }
}

// ===== GetStatus =====

/// `GetStatus` response: one byte of event flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusRegister {
    /// Previous command executed successfully
    pub cmd_success: bool,
    /// Radio is tuned and active
    pub radio_active: bool,
    /// At least one packet waits in the receive queue
    pub rx_queue_not_empty: bool,
    /// Receive queue is full
    pub rx_queue_full: bool,
    /// Receive queue overflowed; packets were discarded
    pub rx_queue_overflow: bool,
    /// Transmit queue is empty
    pub tx_queue_empty: bool,
    /// Transmit queue is full
    pub tx_queue_full: bool,
    /// Transmit queue overflowed; packets were discarded
    pub tx_queue_overflow: bool,
}

impl StatusRegister {
    pub const SIZE: usize = 1;

    pub fn from_byte(b: u8) -> Self {
        Self {
            cmd_success: b & (1 << 0) != 0,
            radio_active: b & (1 << 1) != 0,
            rx_queue_not_empty: b & (1 << 2) != 0,
            rx_queue_full: b & (1 << 3) != 0,
            rx_queue_overflow: b & (1 << 4) != 0,
            tx_queue_empty: b & (1 << 5) != 0,
            tx_queue_full: b & (1 << 6) != 0,
            tx_queue_overflow: b & (1 << 7) != 0,
        }
    }

    pub fn to_byte(self) -> u8 {
        u8::from(self.cmd_success)
            | u8::from(self.radio_active) << 1
            | u8::from(self.rx_queue_not_empty) << 2
            | u8::from(self.rx_queue_full) << 3
            | u8::from(self.rx_queue_overflow) << 4
            | u8::from(self.tx_queue_empty) << 5
            | u8::from(self.tx_queue_full) << 6
            | u8::from(self.tx_queue_overflow) << 7
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        need("GetStatus", buf, Self::SIZE)?;
        Ok(Self::from_byte(buf[0]))
    }
}

// ===== IrqConfig / IrqStatus =====

/// Interrupt flag set, shared by the enable register (`IrqConfig`) and the
/// pending register (`IrqStatus`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrqFlags {
    /// A radio command failed
    pub command_error: bool,
    /// A packet waits in the receive queue
    pub rx_queue_not_empty: bool,
    /// A packet was transmitted
    pub tx_packet: bool,
    /// The last pending packet was transmitted
    pub tx_queue_empty: bool,
}

impl IrqFlags {
    pub const SIZE: usize = 1;

    pub fn from_byte(b: u8) -> Self {
        Self {
            command_error: b & (1 << 0) != 0,
            rx_queue_not_empty: b & (1 << 1) != 0,
            tx_packet: b & (1 << 2) != 0,
            tx_queue_empty: b & (1 << 3) != 0,
        }
    }

    pub fn to_byte(self) -> u8 {
        u8::from(self.command_error)
            | u8::from(self.rx_queue_not_empty) << 1
            | u8::from(self.tx_packet) << 2
            | u8::from(self.tx_queue_empty) << 3
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        need("IrqStatus", buf, Self::SIZE)?;
        Ok(Self::from_byte(buf[0]))
    }

    /// Whether any interrupt source is set.
    pub fn any(self) -> bool {
        self.to_byte() != 0
    }
}

// ===== GetPacketQueueStatus =====

/// `GetPacketQueueStatus` response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketQueueStatus {
    /// At least one receive packet is pending
    pub rx_packet_pending: bool,
    /// A transmit packet is pending
    pub tx_packet_pending: bool,
    /// Size of the next packet in the receive queue, in bytes
    pub rx_packet_size: u8,
}

impl PacketQueueStatus {
    pub const SIZE: usize = 2;

    pub fn decode(buf: &[u8]) -> Result<Self> {
        need("GetPacketQueueStatus", buf, Self::SIZE)?;
        Ok(Self {
            rx_packet_pending: buf[0] & (1 << 0) != 0,
            tx_packet_pending: buf[0] & (1 << 1) != 0,
            rx_packet_size: buf[1],
        })
    }

    pub fn to_bytes(self) -> [u8; 2] {
        let flags =
            u8::from(self.rx_packet_pending) | u8::from(self.tx_packet_pending) << 1;
        [flags, self.rx_packet_size]
    }
}

// ===== ReadPacket =====

/// Fixed prefix of a `ReadPacket` response; the packet payload follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPacketHeader {
    /// Received signal strength, in dB
    pub rssi: i8,
    /// Link quality, 0 (worst) to 255 (best)
    pub lqi: u8,
}

impl ReadPacketHeader {
    pub const SIZE: usize = 2;

    pub fn decode(buf: &[u8]) -> Result<Self> {
        need("ReadPacket", buf, Self::SIZE)?;
        Ok(Self {
            rssi: buf[0] as i8,
            lqi: buf[1],
        })
    }
}

// ===== GetCounters =====

/// Per-queue counters within a [`CountersReport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounters {
    /// Packets currently pending
    pub packets_pending: u32,
    /// Bytes currently allocated
    pub buffer_size: u32,
    /// Discards due to the buffer size limit
    pub buffer_discards: u32,
    /// Discards due to allocation failures
    pub alloc_fails: u32,
    /// Discards because the queue was full
    pub queue_discards: u32,
}

/// `GetCounters` response. Reading this record clears the device counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountersReport {
    /// Device tick timestamp at read time
    pub ticks: u32,

    pub tx_queue: QueueCounters,
    /// Transmit radio: FIFO drops, CCA failures, good frames
    pub tx_fifo_drops: u32,
    pub tx_cca_fails: u32,
    pub tx_good_frames: u32,

    pub rx_queue: QueueCounters,
    /// Receive radio: FIFO overflows, frame errors, good frames
    pub rx_fifo_overflows: u32,
    pub rx_frame_errors: u32,
    pub rx_good_frames: u32,
}

impl CountersReport {
    pub const SIZE: usize = 68;

    pub fn decode(buf: &[u8]) -> Result<Self> {
        need("GetCounters", buf, Self::SIZE)?;

        let queue = |at: usize| QueueCounters {
            packets_pending: read_u32(buf, at),
            buffer_size: read_u32(buf, at + 4),
            buffer_discards: read_u32(buf, at + 8),
            alloc_fails: read_u32(buf, at + 12),
            queue_discards: read_u32(buf, at + 16),
        };

        Ok(Self {
            ticks: read_u32(buf, 0),
            tx_queue: queue(4),
            tx_fifo_drops: read_u32(buf, 24),
            tx_cca_fails: read_u32(buf, 28),
            tx_good_frames: read_u32(buf, 32),
            rx_queue: queue(36),
            rx_fifo_overflows: read_u32(buf, 56),
            rx_frame_errors: read_u32(buf, 60),
            rx_good_frames: read_u32(buf, 64),
        })
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut put = |at: usize, v: u32| out[at..at + 4].copy_from_slice(&v.to_le_bytes());

        put(0, self.ticks);
        for (base, q) in [(4, self.tx_queue), (36, self.rx_queue)] {
            put(base, q.packets_pending);
            put(base + 4, q.buffer_size);
            put(base + 8, q.buffer_discards);
            put(base + 12, q.alloc_fails);
            put(base + 16, q.queue_discards);
        }
        put(24, self.tx_fifo_drops);
        put(28, self.tx_cca_fails);
        put(32, self.tx_good_frames);
        put(56, self.rx_fifo_overflows);
        put(60, self.rx_frame_errors);
        put(64, self.rx_good_frames);
        out
    }
}

// ===== RadioConfig =====

/// `RadioConfig` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioConfigRequest {
    /// Channel number to tune
    pub channel: u16,
    /// Maximum transmit power, in ⅒ dBm
    pub tx_power: u16,
    /// Short address of the coordinator
    pub my_address: u16,
}

impl RadioConfigRequest {
    pub const SIZE: usize = 6;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.channel.to_le_bytes());
        out[2..4].copy_from_slice(&self.tx_power.to_le_bytes());
        out[4..6].copy_from_slice(&self.my_address.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        need("RadioConfig", buf, Self::SIZE)?;
        Ok(Self {
            channel: read_u16(buf, 0),
            tx_power: read_u16(buf, 2),
            my_address: read_u16(buf, 4),
        })
    }
}

// ===== TransmitPacket =====

/// `TransmitPacket` request header; the packet bytes follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitPacketRequest {
    /// Queue priority, 0 (lowest) to 3 (highest)
    pub priority: u8,
}

impl TransmitPacketRequest {
    pub const SIZE: usize = 1;

    /// Build the full command payload: header byte plus packet data.
    pub fn encode_with_payload(&self, packet: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE + packet.len());
        out.push(self.priority & 0x03);
        out.extend_from_slice(packet);
        out
    }
}

// ===== BeaconConfig =====

/// `BeaconConfig` request header; the beacon frame payload follows it.
///
/// When `update_config` is clear only the payload is replaced and the radio
/// ignores `enabled`/`interval`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeaconConfigRequest {
    /// Apply `enabled` and `interval`
    pub update_config: bool,
    /// Autonomous beaconing enabled
    pub enabled: bool,
    /// Beacon interval, in ms
    pub interval: u16,
}

impl BeaconConfigRequest {
    pub const SIZE: usize = 3;

    pub fn encode_with_payload(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE + payload.len());
        out.push(u8::from(self.update_config) | u8::from(self.enabled) << 1);
        out.extend_from_slice(&self.interval.to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        need("BeaconConfig", buf, Self::SIZE)?;
        Ok(Self {
            update_config: buf[0] & (1 << 0) != 0,
            enabled: buf[0] & (1 << 1) != 0,
            interval: read_u16(buf, 1),
        })
    }
}
