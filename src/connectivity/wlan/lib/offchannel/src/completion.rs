// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A single-resolution signal shared between the thread that triggers a radio operation and the
//! threads waiting for its outcome. The first resolution wins; any number of waiters observe it,
//! and every wait is bounded.

use {
    log::error,
    parking_lot::{Condvar, Mutex},
    std::{
        fmt,
        sync::Arc,
        time::{Duration, Instant},
    },
};

pub struct Completion<T> {
    value: Mutex<Option<T>>,
    resolved: Condvar,
}

impl<T: Clone> Completion<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { value: Mutex::new(None), resolved: Condvar::new() })
    }

    /// Resolves the completion and wakes every waiter. Returns false if it was already resolved,
    /// in which case `value` is dropped.
    pub fn complete(&self, value: T) -> bool {
        let mut slot = self.value.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        self.resolved.notify_all();
        true
    }

    pub fn is_complete(&self) -> bool {
        self.value.lock().is_some()
    }

    pub fn peek(&self) -> Option<T> {
        self.value.lock().clone()
    }

    /// Blocks until the completion resolves or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.value.lock();
        while slot.is_none() {
            if self.resolved.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        slot.clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").field("value", &*self.value.lock()).finish()
    }
}

/// Hands a completion to a collaborator. If the collaborator drops it without calling
/// `complete`, the completion resolves with the fallback value so that no waiter is left to run
/// into its timeout.
pub struct Completer<T: Clone> {
    completion: Option<Arc<Completion<T>>>,
    fallback: Option<T>,
}

impl<T: Clone> Completer<T> {
    pub fn new(completion: Arc<Completion<T>>, fallback: T) -> Self {
        Self { completion: Some(completion), fallback: Some(fallback) }
    }

    pub fn complete(mut self, value: T) {
        if let Some(completion) = self.completion.take() {
            completion.complete(value);
        }
    }
}

impl<T: Clone> Drop for Completer<T> {
    fn drop(&mut self) {
        if let (Some(completion), Some(fallback)) = (self.completion.take(), self.fallback.take())
        {
            error!("completer dropped without being called; resolving with fallback");
            completion.complete(fallback);
        }
    }
}
