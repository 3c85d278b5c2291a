// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! BlazeNet coordinator daemon.
//!
//! `blazed` owns the SPI-attached radio coprocessor of a BlazeNet mesh. It
//! drives the binary host↔radio command protocol, maintains priority transmit
//! queues, keeps the autonomous beacon configuration up to date, and exposes a
//! local length-prefixed CBOR RPC socket for other daemons (such as the status
//! GUI) to query.
//!
//! Everything runs on a single-threaded [`runloop`] driving fd readiness and
//! timers; components are wired together in `main` and share state through
//! `Rc` handles.

pub mod config;
pub mod confd;
pub mod protocol;
pub mod radio;
pub mod rpc;
pub mod runloop;
pub mod transport;
pub mod version;
