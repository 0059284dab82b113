// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{device::RadioPath, error::Error, roc::context::RocContext, Cookie, IfaceId},
    std::collections::VecDeque,
};

#[derive(Debug)]
pub struct QueueEntry {
    pub iface: IfaceId,
    pub path: RadioPath,
    pub ctx: RocContext,
}

/// Reservations waiting for the radio, served in arrival order.
pub struct RocQueue {
    entries: VecDeque<QueueEntry>,
    capacity: usize,
}

impl RocQueue {
    pub fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::with_capacity(capacity), capacity }
    }

    /// On failure the entry is handed back so that its waiters can be resolved.
    pub fn enqueue(&mut self, entry: QueueEntry) -> Result<(), (Error, QueueEntry)> {
        if self.entries.len() >= self.capacity {
            return Err((Error::ResourceExhausted, entry));
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// Puts back an entry that was dequeued but could not be started, ahead of later arrivals.
    pub fn requeue_front(&mut self, entry: QueueEntry) -> Result<(), (Error, QueueEntry)> {
        if self.entries.len() >= self.capacity {
            return Err((Error::ResourceExhausted, entry));
        }
        self.entries.push_front(entry);
        Ok(())
    }

    pub fn dequeue_front(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    pub fn remove_by_cookie(&mut self, cookie: Cookie) -> Option<QueueEntry> {
        let idx = self.entries.iter().position(|e| e.ctx.cookie == cookie)?;
        self.entries.remove(idx)
    }

    /// Drops every entry of `iface`, keeping the order of the others.
    pub fn remove_iface(&mut self, iface: IfaceId) -> Vec<QueueEntry> {
        let (removed, kept): (Vec<_>, Vec<_>) =
            self.entries.drain(..).partition(|e| e.iface == iface);
        self.entries = kept.into();
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn cookies(&self) -> Vec<Cookie> {
        self.entries.iter().map(|e| e.ctx.cookie).collect()
    }
}
