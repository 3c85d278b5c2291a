// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SPI radio transport.
//!
//! Talks to the radio over a `spidev` character device. The interrupt line is
//! a GPIO requested for edge events through the chardev v2 uAPI; its event fd
//! is watched by the run loop. An optional reset line is requested as an
//! active-low open-drain output with pull-up.

use super::commands::{CommandId, READ_FLAG};
use super::{IrqHandler, IrqHandlers, Transport, TransportError};
use crate::config::TransportConfig;
use crate::runloop;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::rc::Rc;
use std::time::Duration;

/// Delay between the command header and the response phase of a read, µs.
///
/// Gives the radio time to prepare the response data. Part of the SPI
/// transaction so chip select stays asserted across it.
const READ_CMD_DELAY_US: u16 = 30;

/// Delay between the command header and the payload phase of a write, µs.
const WRITE_CMD_DELAY_US: u16 = 30;

/// How long the reset line is held asserted.
const RESET_ASSERT_TIME: Duration = Duration::from_millis(20);

/// How long the radio needs to boot after reset before accepting commands.
const RESET_WAIT_TIME: Duration = Duration::from_millis(750);

// spidev uAPI (linux/spi/spidev.h)
const SPI_IOC_MAGIC: u8 = b'k';

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    pad: u16,
}

nix::ioctl_write_ptr!(spi_wr_mode, SPI_IOC_MAGIC, 1, u8);
nix::ioctl_write_ptr!(spi_wr_bits_per_word, SPI_IOC_MAGIC, 3, u8);
nix::ioctl_write_ptr!(spi_wr_max_speed_hz, SPI_IOC_MAGIC, 4, u32);
nix::ioctl_write_buf!(spi_message, SPI_IOC_MAGIC, 0, SpiIocTransfer);

// GPIO chardev v2 uAPI (linux/gpio.h)
const GPIO_IOC_MAGIC: u8 = 0xb4;

const GPIO_V2_LINES_MAX: usize = 64;
const GPIO_V2_LINE_NUM_ATTRS_MAX: usize = 10;

const GPIO_V2_LINE_FLAG_ACTIVE_LOW: u64 = 1 << 1;
const GPIO_V2_LINE_FLAG_INPUT: u64 = 1 << 2;
const GPIO_V2_LINE_FLAG_OUTPUT: u64 = 1 << 3;
const GPIO_V2_LINE_FLAG_EDGE_RISING: u64 = 1 << 4;
const GPIO_V2_LINE_FLAG_EDGE_FALLING: u64 = 1 << 5;
const GPIO_V2_LINE_FLAG_OPEN_DRAIN: u64 = 1 << 6;
const GPIO_V2_LINE_FLAG_BIAS_PULL_UP: u64 = 1 << 8;

const GPIO_V2_LINE_EVENT_FALLING_EDGE: u32 = 2;

#[repr(C)]
#[derive(Clone, Copy)]
struct GpioV2LineAttribute {
    id: u32,
    padding: u32,
    value: u64,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct GpioV2LineConfigAttribute {
    attr: GpioV2LineAttribute,
    mask: u64,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct GpioV2LineConfig {
    flags: u64,
    num_attrs: u32,
    padding: [u32; 5],
    attrs: [GpioV2LineConfigAttribute; GPIO_V2_LINE_NUM_ATTRS_MAX],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct GpioV2LineRequest {
    offsets: [u32; GPIO_V2_LINES_MAX],
    consumer: [u8; 32],
    config: GpioV2LineConfig,
    num_lines: u32,
    event_buffer_size: u32,
    padding: [u32; 5],
    fd: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct GpioV2LineEvent {
    timestamp_ns: u64,
    id: u32,
    offset: u32,
    seqno: u32,
    line_seqno: u32,
    padding: [u32; 6],
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct GpioV2LineValues {
    bits: u64,
    mask: u64,
}

nix::ioctl_readwrite!(gpio_v2_get_line, GPIO_IOC_MAGIC, 0x07, GpioV2LineRequest);
nix::ioctl_readwrite!(
    gpio_v2_line_set_values,
    GPIO_IOC_MAGIC,
    0x0f,
    GpioV2LineValues
);

/// Request a single GPIO line with the given flags, returning the line fd.
fn request_line(
    chip: &str,
    pin: u32,
    flags: u64,
    consumer: &str,
) -> Result<OwnedFd, TransportError> {
    let chip_dev = File::open(format!("/dev/{chip}"))?;

    let mut req: GpioV2LineRequest = unsafe { std::mem::zeroed() };
    req.offsets[0] = pin;
    req.num_lines = 1;
    req.config.flags = flags;
    let name = consumer.as_bytes();
    let n = name.len().min(req.consumer.len() - 1);
    req.consumer[..n].copy_from_slice(&name[..n]);

    unsafe { gpio_v2_get_line(chip_dev.as_raw_fd(), &mut req) }
        .map_err(|e| TransportError::Io(e.into()))?;
    if req.fd < 0 {
        return Err(TransportError::Io(io::Error::other(
            "kernel returned invalid gpio line fd",
        )));
    }

    Ok(unsafe { OwnedFd::from_raw_fd(req.fd) })
}

struct ResetLine {
    fd: OwnedFd,
}

impl ResetLine {
    fn request(chip: &str, pin: u32) -> Result<Self, TransportError> {
        let fd = request_line(
            chip,
            pin,
            GPIO_V2_LINE_FLAG_OUTPUT
                | GPIO_V2_LINE_FLAG_OPEN_DRAIN
                | GPIO_V2_LINE_FLAG_BIAS_PULL_UP
                | GPIO_V2_LINE_FLAG_ACTIVE_LOW,
            "blazed-spidev-reset",
        )?;

        let line = Self { fd };
        line.set(false)?;
        Ok(line)
    }

    /// Drive the line; `true` asserts reset (active low on the wire).
    fn set(&self, asserted: bool) -> Result<(), TransportError> {
        let mut values = GpioV2LineValues {
            bits: u64::from(asserted),
            mask: 1,
        };
        unsafe { gpio_v2_line_set_values(self.fd.as_raw_fd(), &mut values) }
            .map_err(|e| TransportError::Io(e.into()))?;
        Ok(())
    }
}

struct IrqLine {
    fd: OwnedFd,
}

impl IrqLine {
    fn request(chip: &str, pin: u32) -> Result<Self, TransportError> {
        #[cfg(not(feature = "irq-toggle"))]
        let edges = GPIO_V2_LINE_FLAG_EDGE_FALLING;
        #[cfg(feature = "irq-toggle")]
        let edges = GPIO_V2_LINE_FLAG_EDGE_FALLING | GPIO_V2_LINE_FLAG_EDGE_RISING;

        let fd = request_line(
            chip,
            pin,
            GPIO_V2_LINE_FLAG_INPUT | edges,
            "blazed-spidev-irq",
        )?;

        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK))
            .map_err(|e| TransportError::Io(e.into()))?;
        Ok(Self { fd })
    }

    /// Read one queued edge event. `Ok(None)` when the fd has drained.
    ///
    /// Returns whether the event counts as a pending interrupt: falling edges
    /// always do, and with the `irq-toggle` feature every transition does.
    fn read_event(&mut self) -> Result<Option<bool>, TransportError> {
        let mut raw = [0u8; std::mem::size_of::<GpioV2LineEvent>()];
        match nix::unistd::read(self.fd.as_raw_fd(), &mut raw) {
            Ok(n) if n == raw.len() => {
                let event: GpioV2LineEvent = unsafe { std::mem::transmute(raw) };
                log::trace!("gpio edge event: id={} seqno={}", event.id, event.seqno);

                if cfg!(feature = "irq-toggle") {
                    Ok(Some(true))
                } else {
                    Ok(Some(event.id == GPIO_V2_LINE_EVENT_FALLING_EDGE))
                }
            }
            Ok(n) => Err(TransportError::Io(io::Error::other(format!(
                "short gpio event read: {n} bytes"
            )))),
            Err(nix::errno::Errno::EAGAIN) => Ok(None),
            Err(e) => Err(TransportError::Io(e.into())),
        }
    }
}

/// SPI radio transport over a `spidev` character device.
pub struct SpidevTransport {
    spi: File,
    irq: IrqLine,
    reset: Option<ResetLine>,
    irq_handlers: IrqHandlers,
}

impl SpidevTransport {
    /// Open and configure the SPI device and GPIO lines.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let spi = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.file)?;
        log::debug!("opened spidev {}", config.file.display());

        let mode = config.mode;
        unsafe {
            spi_wr_mode(spi.as_raw_fd(), &mode).map_err(io::Error::from)?;
            spi_wr_bits_per_word(spi.as_raw_fd(), &8u8).map_err(io::Error::from)?;
            spi_wr_max_speed_hz(spi.as_raw_fd(), &config.freq).map_err(io::Error::from)?;
        }

        let (irq_chip, irq_pin) = super::parse_gpio_descriptor(&config.irq)?;
        log::debug!("irq line: {} (chip {irq_chip}, line {irq_pin})", config.irq);
        let irq = IrqLine::request(&irq_chip, irq_pin)?;

        let reset = match &config.reset {
            Some(desc) => {
                let (chip, pin) = super::parse_gpio_descriptor(desc)?;
                log::debug!("reset line: {desc} (chip {chip}, line {pin})");
                Some(ResetLine::request(&chip, pin)?)
            }
            None => None,
        };

        Ok(Self {
            spi,
            irq,
            reset,
            irq_handlers: IrqHandlers::default(),
        })
    }

    /// The fd that becomes readable when an interrupt edge is queued.
    pub fn irq_event_fd(&self) -> RawFd {
        self.irq.fd.as_raw_fd()
    }

    /// Consume one queued edge event from the kernel.
    pub fn read_irq_event(&mut self) -> Result<Option<bool>, TransportError> {
        self.irq.read_event()
    }

    /// Watch the interrupt line from the run loop.
    ///
    /// Edge events are consumed under the transport borrow, then the handler
    /// snapshot is dispatched with no borrow held so handlers can issue
    /// commands of their own.
    pub fn watch_irq(
        this: &Rc<RefCell<Self>>,
        handle: &Rc<runloop::Handle>,
    ) -> Result<(), TransportError> {
        let fd = this.borrow().irq_event_fd();
        let weak = Rc::downgrade(this);

        handle.add_fd(
            fd,
            Rc::new(move || {
                let Some(transport) = weak.upgrade() else {
                    return;
                };

                loop {
                    let event = transport.borrow_mut().read_irq_event();
                    match event {
                        Ok(Some(true)) => {
                            for handler in transport.borrow().irq_handler_snapshot() {
                                handler();
                            }
                        }
                        Ok(Some(false)) => continue,
                        Ok(None) => break,
                        Err(e) => {
                            log::error!("irq event read failed: {e}");
                            break;
                        }
                    }
                }
            }),
        )?;

        Ok(())
    }

    fn transfer(&mut self, transfers: &[SpiIocTransfer]) -> Result<(), TransportError> {
        unsafe { spi_message(self.spi.as_raw_fd(), transfers) }
            .map_err(|e| TransportError::Io(e.into()))?;
        Ok(())
    }
}

impl Transport for SpidevTransport {
    fn reset(&mut self) -> Result<(), TransportError> {
        let Some(reset) = &self.reset else {
            return Ok(());
        };

        reset.set(true)?;
        std::thread::sleep(RESET_ASSERT_TIME);
        reset.set(false)?;

        // the controller may take a while to come up after deassertion
        std::thread::sleep(RESET_WAIT_TIME);
        Ok(())
    }

    fn send_read(&mut self, command: CommandId, out: &mut [u8]) -> Result<(), TransportError> {
        if out.is_empty() {
            return Err(TransportError::InvalidArgument("response buffer empty"));
        }
        if out.len() > u8::MAX as usize {
            return Err(TransportError::InvalidArgument("response buffer too long"));
        }

        let header = [command.id() | READ_FLAG, out.len() as u8];
        let transfers = [
            SpiIocTransfer {
                tx_buf: header.as_ptr() as u64,
                len: header.len() as u32,
                delay_usecs: READ_CMD_DELAY_US,
                ..Default::default()
            },
            SpiIocTransfer {
                rx_buf: out.as_mut_ptr() as u64,
                len: out.len() as u32,
                ..Default::default()
            },
        ];
        self.transfer(&transfers)
    }

    fn send_write(&mut self, command: CommandId, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > u8::MAX as usize {
            return Err(TransportError::InvalidArgument("payload too long"));
        }

        let header = [command.id(), payload.len() as u8];
        let transfers = [
            SpiIocTransfer {
                tx_buf: header.as_ptr() as u64,
                len: header.len() as u32,
                delay_usecs: WRITE_CMD_DELAY_US,
                ..Default::default()
            },
            SpiIocTransfer {
                tx_buf: payload.as_ptr() as u64,
                len: payload.len() as u32,
                ..Default::default()
            },
        ];

        if payload.is_empty() {
            self.transfer(&transfers[..1])
        } else {
            self.transfer(&transfers)
        }
    }

    fn on_irq(&mut self, handler: IrqHandler) {
        self.irq_handlers.register(handler);
    }

    fn irq_handler_snapshot(&self) -> Vec<IrqHandler> {
        self.irq_handlers.snapshot()
    }
}
