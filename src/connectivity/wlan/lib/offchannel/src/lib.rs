// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Remain-on-channel and management frame TX control for P2P and TDLS signalling.
//!
//! An `OffChannelManager` owns the radio's channel for one device. User space reserves channels
//! with `remain_on_channel` and sends negotiation frames with `transmit`; both are correlated
//! with a cookie. Radio reports and timeouts are fed back through `handle_radio_event` and
//! `handle_timeout`, usually by the `event_loop`.

pub mod completion;
pub mod config;
pub mod cookie;
pub mod device;
pub mod diagnostics;
pub mod error;
pub mod event_loop;
pub mod iface;
pub mod manager;
pub mod roc;
pub mod timer;
pub mod tx;

#[cfg(test)]
mod test_utils;

pub use {
    config::Config,
    error::{Error, ResultExt},
    manager::OffChannelManager,
    tx::TxRequest,
};

/// Opaque identifier correlating a request with its notifications.
pub type Cookie = u64;
pub type IfaceId = u16;
