// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scripted in-memory transport.
//!
//! Stands in for real hardware when exercising the radio engine: read
//! responses are served from per-command scripts (with sensible defaults for
//! the status registers), writes are recorded for inspection, and submission
//! failures can be injected to drive the queue/retry paths.

use super::commands::{CommandId, StatusRegister};
use super::{IrqHandler, IrqHandlers, Transport, TransportError};
use std::collections::{HashMap, VecDeque};

/// A single recorded exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub command: CommandId,
    pub payload: Vec<u8>,
}

/// Transport double backed by scripted responses.
#[derive(Default)]
pub struct TestHarnessTransport {
    /// Scripted read responses, consumed front to back per command
    responses: HashMap<u8, VecDeque<Vec<u8>>>,
    /// All writes, in order
    pub writes: Vec<RecordedWrite>,
    /// All read commands issued, in order
    pub reads: Vec<CommandId>,
    /// Number of `reset()` calls
    pub resets: usize,

    /// Outcome reported for the *next* status check; refreshed per write
    last_cmd_ok: bool,
    /// Scripted outcomes for upcoming `TransmitPacket` writes; empty = accept
    transmit_results: VecDeque<bool>,

    irq_handlers: IrqHandlers,
}

impl TestHarnessTransport {
    pub fn new() -> Self {
        Self {
            last_cmd_ok: true,
            ..Default::default()
        }
    }

    /// Queue a response for the next read of `command`.
    pub fn push_response(&mut self, command: CommandId, bytes: Vec<u8>) {
        self.responses.entry(command.id()).or_default().push_back(bytes);
    }

    /// Make the next `count` transmit submissions fail their status check.
    pub fn fail_next_transmits(&mut self, count: usize) {
        self.transmit_results.extend(std::iter::repeat(false).take(count));
    }

    /// Script the outcome of the next transmit submissions, in order. Once
    /// the script runs out, submissions are accepted again.
    pub fn script_transmit_results(&mut self, results: &[bool]) {
        self.transmit_results.extend(results.iter().copied());
    }

    /// Payloads of all recorded `TransmitPacket` writes.
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.writes
            .iter()
            .filter(|w| w.command == CommandId::TransmitPacket)
            .map(|w| w.payload.clone())
            .collect()
    }

    /// Number of reads issued for `command`.
    pub fn reads_of(&self, command: CommandId) -> usize {
        self.reads.iter().filter(|&&c| c == command).count()
    }

    /// Invoke registered interrupt handlers, as a live edge would.
    pub fn raise_irq(&self) {
        for handler in self.irq_handlers.snapshot() {
            handler();
        }
    }

    fn default_response(&self, command: CommandId, out: &mut [u8]) {
        match command {
            CommandId::GetStatus => {
                out[0] = StatusRegister {
                    cmd_success: self.last_cmd_ok,
                    radio_active: true,
                    ..Default::default()
                }
                .to_byte();
            }
            // empty queues, no pending interrupts
            _ => out.fill(0),
        }
    }
}

impl Transport for TestHarnessTransport {
    fn reset(&mut self) -> Result<(), TransportError> {
        self.resets += 1;
        Ok(())
    }

    fn send_read(&mut self, command: CommandId, out: &mut [u8]) -> Result<(), TransportError> {
        if out.is_empty() {
            return Err(TransportError::InvalidArgument("response buffer empty"));
        }
        if out.len() > u8::MAX as usize {
            return Err(TransportError::InvalidArgument("response buffer too long"));
        }
        self.reads.push(command);

        match self
            .responses
            .get_mut(&command.id())
            .and_then(VecDeque::pop_front)
        {
            Some(bytes) => {
                let n = bytes.len().min(out.len());
                out[..n].copy_from_slice(&bytes[..n]);
                out[n..].fill(0);
            }
            None => self.default_response(command, out),
        }
        Ok(())
    }

    fn send_write(&mut self, command: CommandId, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > u8::MAX as usize {
            return Err(TransportError::InvalidArgument("payload too long"));
        }

        self.last_cmd_ok = if command == CommandId::TransmitPacket {
            self.transmit_results.pop_front().unwrap_or(true)
        } else {
            true
        };

        self.writes.push(RecordedWrite {
            command,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn on_irq(&mut self, handler: IrqHandler) {
        self.irq_handlers.register(handler);
    }

    fn irq_handler_snapshot(&self) -> Vec<IrqHandler> {
        self.irq_handlers.snapshot()
    }
}
