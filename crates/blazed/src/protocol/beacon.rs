// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network beacon manager.
//!
//! The radio transmits beacon frames autonomously with far better timing
//! accuracy than the host could manage; our job is to build the frame bytes
//! from the current configuration and push frame and interval down whenever
//! either changes. Dropping the manager disables beaconing on the radio.

use super::{ProtocolError, Result};
use crate::confd::RuntimeConfig;
use crate::radio::{Radio, MIN_BEACON_INTERVAL};
use blazenet_proto::{beacon, mac, phy, PROTOCOL_VERSION};
use std::rc::Rc;
use std::time::Duration;

/// Confd key for the beacon interval, in ms.
const CONF_BEACON_INTERVAL: &str = "radio.beacon.interval";
/// Confd key for the 16-byte network id.
const CONF_BEACON_ID: &str = "radio.beacon.id";

/// Interval used when confd carries no value.
const DEFAULT_BEACON_INTERVAL_MS: i64 = 5_000;

/// Whether rebuilt beacon frames are logged.
const LOG_BEACON_FRAME: bool = true;

/// Builds and uploads the autonomous beacon frame.
pub struct Beaconator {
    radio: Rc<Radio>,
    runtime: Rc<dyn RuntimeConfig>,

    interval: Duration,
    network_id: [u8; beacon::NETWORK_ID_LEN],
    /// Whether over-the-air pairing is advertised
    pairing_enabled: bool,

    /// Last serialised beacon frame
    frame: Vec<u8>,
}

impl Beaconator {
    /// Read the beacon configuration, build the initial frame, and push both
    /// frame and interval to the radio.
    pub fn new(radio: Rc<Radio>, runtime: Rc<dyn RuntimeConfig>) -> Result<Self> {
        let mut beaconator = Self {
            radio,
            runtime,
            interval: Duration::ZERO,
            network_id: [0; beacon::NETWORK_ID_LEN],
            pairing_enabled: false,
            frame: Vec::new(),
        };

        beaconator.read_config()?;
        beaconator.rebuild_frame()?;
        beaconator.upload()?;
        Ok(beaconator)
    }

    /// Re-read the beacon settings and rebuild the frame; with `upload` set,
    /// resend both to the radio.
    pub fn reload_config(&mut self, upload: bool) -> Result<()> {
        self.read_config()?;
        self.rebuild_frame()?;
        if upload {
            self.upload()?;
        }
        Ok(())
    }

    /// Advertise (or stop advertising) in-band pairing in the beacon.
    pub fn set_pairing_enabled(&mut self, enabled: bool) -> Result<()> {
        self.pairing_enabled = enabled;
        self.rebuild_frame()?;
        self.upload()
    }

    /// The serialised beacon frame, PHY length byte first.
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn read_config(&mut self) -> Result<()> {
        let interval_ms = self
            .runtime
            .get_int(CONF_BEACON_INTERVAL)?
            .unwrap_or(DEFAULT_BEACON_INTERVAL_MS);
        if interval_ms < MIN_BEACON_INTERVAL.as_millis() as i64 {
            return Err(ProtocolError::BeaconInterval(interval_ms));
        }

        // the radio wants a 10 ms granularity; round up
        let interval_ms = (interval_ms as u64).div_ceil(10) * 10;
        self.interval = Duration::from_millis(interval_ms);
        log::debug!("beacon interval: {interval_ms} ms");

        let read = self
            .runtime
            .get_blob(CONF_BEACON_ID, &mut self.network_id)?;
        if read != self.network_id.len() {
            return Err(ProtocolError::NetworkId(read));
        }

        Ok(())
    }

    /// Regenerate the frame buffer from the current settings.
    fn rebuild_frame(&mut self) -> Result<()> {
        let total = phy::HEADER_LEN + mac::HEADER_LEN + beacon::HEADER_LEN;
        let mut frame = vec![0u8; total];

        let mac_header = mac::Header {
            flags: mac::header_flags::ENDPOINT_NET_CONTROL,
            sequence: 0,
            source: self.radio.short_address(),
            destination: mac::BROADCAST_ADDRESS,
        };
        mac_header
            .write_to(&mut frame[phy::HEADER_LEN..])
            .ok_or(ProtocolError::FrameTooLarge(total))?;

        let mut flags = 0;
        if self.pairing_enabled {
            flags |= beacon::header_flags::PAIRING_ENABLE;
        }
        let beacon_header = beacon::Header {
            version: PROTOCOL_VERSION,
            flags,
            id: self.network_id,
        };
        beacon_header
            .write_to(&mut frame[phy::HEADER_LEN + mac::HEADER_LEN..])
            .ok_or(ProtocolError::FrameTooLarge(total))?;

        phy::finalize_frame(&mut frame).ok_or(ProtocolError::FrameTooLarge(total))?;

        if LOG_BEACON_FRAME {
            log::debug!("beacon frame: {:02x?}", frame);
        }

        self.frame = frame;
        Ok(())
    }

    /// Push the beacon configuration and the current frame to the radio.
    fn upload(&self) -> Result<()> {
        self.radio
            .set_beacon_config(true, self.interval, &self.frame, true)?;
        Ok(())
    }
}

impl Drop for Beaconator {
    fn drop(&mut self) {
        // inhibit autonomous beaconing; best-effort on the way out
        if let Err(e) = self
            .radio
            .set_beacon_config(false, self.interval, &[], true)
        {
            log::warn!("failed to disable beaconing: {e}");
        }
    }
}
