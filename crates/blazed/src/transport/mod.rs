// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Radio transports.
//!
//! A transport provides framed command exchange with the radio coprocessor
//! plus delivery of its interrupt line edges. Commands are two header bytes
//! (id and payload length) followed by payload in the direction the id's high
//! bit selects; see [`commands`] for the record layouts.

pub mod commands;
pub mod harness;
pub mod spidev;

use crate::config::TransportConfig;
use commands::CommandId;
use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("invalid gpio descriptor `{0}` (expected `chip:pin`)")]
    BadGpioDescriptor(String),

    #[error("unsupported transport type `{0}`")]
    UnknownType(String),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Handler invoked once per observed interrupt edge.
pub type IrqHandler = Rc<dyn Fn()>;

/// Low-level interface to the radio coprocessor.
pub trait Transport {
    /// Hard-reset the radio, blocking until it has rebooted. A no-op when the
    /// transport has no reset line.
    fn reset(&mut self) -> Result<()>;

    /// Execute a read command: send the header, then read `out.len()` bytes
    /// of response into `out`.
    fn send_read(&mut self, command: CommandId, out: &mut [u8]) -> Result<()>;

    /// Execute a write command: send the header followed by `payload`.
    fn send_write(&mut self, command: CommandId, payload: &[u8]) -> Result<()>;

    /// Register a handler to be invoked once per observed interrupt edge.
    fn on_irq(&mut self, handler: IrqHandler);

    /// Snapshot of the registered interrupt handlers.
    ///
    /// Callers dispatch from the snapshot with no transport borrow held, so a
    /// handler is free to issue commands.
    fn irq_handler_snapshot(&self) -> Vec<IrqHandler>;
}

/// Registered interrupt handler list, shared by transport implementations.
#[derive(Default)]
pub struct IrqHandlers(Vec<IrqHandler>);

impl IrqHandlers {
    pub fn register(&mut self, handler: IrqHandler) {
        self.0.push(handler);
    }

    pub fn snapshot(&self) -> Vec<IrqHandler> {
        self.0.clone()
    }
}

/// Parse a GPIO line descriptor of the form `gpiochip0:27`.
pub fn parse_gpio_descriptor(desc: &str) -> Result<(String, u32)> {
    let (chip, pin) = desc
        .split_once(':')
        .ok_or_else(|| TransportError::BadGpioDescriptor(desc.into()))?;
    if chip.is_empty() || !chip.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(TransportError::BadGpioDescriptor(desc.into()));
    }
    let pin = pin
        .parse::<u32>()
        .map_err(|_| TransportError::BadGpioDescriptor(desc.into()))?;
    Ok((chip.to_string(), pin))
}

/// Instantiate the transport named by the configuration.
pub fn create(config: &TransportConfig) -> Result<Rc<RefCell<spidev::SpidevTransport>>> {
    match config.kind.as_str() {
        "spidev" => Ok(Rc::new(RefCell::new(spidev::SpidevTransport::new(
            config,
        )?))),
        other => Err(TransportError::UnknownType(other.into())),
    }
}
