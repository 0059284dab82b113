// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Remain-on-channel reservations. At most one reservation owns the radio at a time; the others
//! wait in a FIFO queue and are dispatched as the radio frees up.

pub mod context;
pub mod executor;
pub mod queue;

pub use {
    context::{PendingFrame, RequestKind, RocContext, RocState},
    queue::{QueueEntry, RocQueue},
};

use crate::Cookie;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedEvent {
    /// The dwell time of the reservation ran out.
    RocExpired { cookie: Cookie },
    /// Start the next queued reservation.
    Dispatch,
}
