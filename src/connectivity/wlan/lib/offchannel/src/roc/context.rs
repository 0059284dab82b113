// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{completion::Completion, error::Error, timer::EventId, Cookie},
    std::{
        sync::Arc,
        time::{Duration, Instant},
    },
    wlan_common::channel::Channel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Requested by user space to listen on a channel. Readiness and expiry are reported.
    Listen,
    /// Created on behalf of a management frame transmit. Silent towards user space.
    OffChannelTx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RocState {
    Pending,
    Activating,
    Active,
    CancelRequested,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFrame {
    pub freq_mhz: u16,
    pub rssi_dbm: i8,
    pub bytes: Vec<u8>,
}

pub type ReadyCompletion = Completion<Result<(), Error>>;

/// A single channel reservation, queued or owning the radio.
pub struct RocContext {
    pub channel: Channel,
    /// Requested dwell time, before any GO scaling.
    pub duration: Duration,
    pub cookie: Cookie,
    pub kind: RequestKind,
    pub state: RocState,
    /// The expiry timer. Only set while Active.
    pub timer_id: Option<EventId>,
    pub expires_at: Option<Instant>,
    pub pending_frame: Option<PendingFrame>,
    pub cancel_in_progress: bool,
    /// Resolved once the radio reached the channel, or with the reason it never will.
    pub ready: Arc<ReadyCompletion>,
    /// Resolved once the reservation is torn down.
    pub cancel_done: Arc<Completion<()>>,
}

impl RocContext {
    pub fn new(channel: Channel, duration: Duration, cookie: Cookie, kind: RequestKind) -> Self {
        Self {
            channel,
            duration,
            cookie,
            kind,
            state: RocState::Pending,
            timer_id: None,
            expires_at: None,
            pending_frame: None,
            cancel_in_progress: false,
            ready: Completion::new(),
            cancel_done: Completion::new(),
        }
    }

    /// Holds `frame` until the reservation is ready. Returns true if an earlier frame was
    /// replaced.
    pub fn buffer_frame(&mut self, frame: PendingFrame) -> bool {
        self.pending_frame.replace(frame).is_some()
    }

    pub fn is_listen(&self) -> bool {
        self.kind == RequestKind::Listen
    }
}

impl std::fmt::Debug for RocContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocContext")
            .field("channel", &self.channel)
            .field("duration", &self.duration)
            .field("cookie", &self.cookie)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("timer_id", &self.timer_id)
            .field("cancel_in_progress", &self.cancel_in_progress)
            .finish()
    }
}
