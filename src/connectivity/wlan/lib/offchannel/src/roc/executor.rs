// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        completion::Completion,
        device::{Notification, RadioPath, RadioStatus, SuspendLock, RX_FLAG_DEFERRED},
        error::Error,
        manager::OffChannelManager,
        roc::{
            context::{ReadyCompletion, RequestKind, RocContext, RocState},
            queue::QueueEntry,
            TimedEvent,
        },
        timer::{EventId, Timer},
        Cookie, IfaceId,
    },
    log::{debug, error, info, warn},
    std::{
        sync::Arc,
        thread,
        time::{Duration, Instant},
    },
    wlan_common::channel::Channel,
};

const ROC_SUSPEND_TAG: &str = "wlan_roc";

/// The reservation that currently owns the radio.
pub(crate) struct ActiveRoc {
    pub iface: IfaceId,
    pub path: RadioPath,
    pub ctx: RocContext,
    suspend: SuspendLock,
}

pub(crate) struct RocSlot {
    pub active: Option<ActiveRoc>,
    pub timer: Timer<TimedEvent>,
    dispatch_id: Option<EventId>,
}

impl RocSlot {
    pub fn new(timer: Timer<TimedEvent>) -> Self {
        Self { active: None, timer, dispatch_id: None }
    }

    /// Moves the expiry of the active reservation to `extension` from now unless it already
    /// expires later. Returns true if the timer was rescheduled.
    pub fn extend_active(&mut self, extension: Duration) -> bool {
        let active = match self.active.as_mut() {
            Some(a) if a.ctx.state == RocState::Active && !a.ctx.cancel_in_progress => a,
            _ => return false,
        };
        let deadline = Instant::now() + extension;
        if active.ctx.expires_at.map_or(false, |at| at >= deadline) {
            return false;
        }
        if let Some(id) = active.ctx.timer_id.take() {
            self.timer.cancel_event(id);
        }
        let cookie = active.ctx.cookie;
        active.ctx.timer_id =
            Some(self.timer.schedule_after(extension, TimedEvent::RocExpired { cookie }));
        active.ctx.expires_at = Some(deadline);
        debug!("reservation {:#x} extended by {:?}", cookie, extension);
        true
    }

    fn schedule_dispatch(&mut self) {
        if self.dispatch_id.is_none() {
            let id = self.timer.schedule_after(Duration::ZERO, TimedEvent::Dispatch);
            self.dispatch_id = Some(id);
        }
    }
}

/// Parameters of a reservation installed in the active slot but not yet handed to the radio.
struct Activation {
    iface: IfaceId,
    path: RadioPath,
    channel: Channel,
    duration: Duration,
    cookie: Cookie,
}

enum CancelStep {
    WaitReady(Arc<ReadyCompletion>),
    WaitTeardown(Arc<Completion<()>>),
    Issue { iface: IfaceId, path: RadioPath, done: Arc<Completion<()>> },
}

impl OffChannelManager {
    /// Reserves `channel` for `duration` on behalf of user space. Readiness and expiry of the
    /// reservation are notified with the returned cookie.
    pub fn remain_on_channel(
        &self,
        iface: IfaceId,
        channel: Channel,
        duration: Duration,
    ) -> Result<Cookie, Error> {
        if duration.is_zero() {
            return Err(Error::InvalidArgs("zero duration"));
        }
        if !channel.is_valid() {
            return Err(Error::InvalidArgs("invalid channel"));
        }
        let path = self.radio_path(iface)?;
        let cookie = self.next_cookie();
        info!(
            "iface {} requests channel {} for {:?}, cookie {:#x}",
            iface, channel, duration, cookie
        );
        let ctx = RocContext::new(channel, duration, cookie, RequestKind::Listen);
        self.request_roc(QueueEntry { iface, path, ctx })?;
        Ok(cookie)
    }

    /// Starts the reservation right away if the radio is free, queues it otherwise.
    pub(crate) fn request_roc(&self, entry: QueueEntry) -> Result<(), Error> {
        let connecting = self.ops.adapters.is_connection_in_progress();
        let mut slot = self.roc.lock();
        let roc_busy = slot.active.is_some();
        {
            let mut queue = self.queue.lock();
            if connecting || roc_busy || !queue.is_empty() {
                let cookie = entry.ctx.cookie;
                queue.enqueue(entry).map_err(|(e, _)| e)?;
                info!("reservation {:#x} queued, {} waiting", cookie, queue.len());
                if !connecting && !roc_busy {
                    slot.schedule_dispatch();
                }
                return Ok(());
            }
        }
        let activation = self.install(&mut slot, entry);
        drop(slot);
        self.execute_roc(activation)
    }

    fn install(&self, slot: &mut RocSlot, entry: QueueEntry) -> Activation {
        let QueueEntry { iface, path, mut ctx } = entry;
        ctx.state = RocState::Activating;
        let activation = Activation {
            iface,
            path,
            channel: ctx.channel,
            duration: ctx.duration,
            cookie: ctx.cookie,
        };
        let suspend = SuspendLock::new(self.ops.power.clone(), ROC_SUSPEND_TAG);
        slot.active = Some(ActiveRoc { iface, path, ctx, suspend });
        activation
    }

    /// Hands an installed reservation to the radio. The radio sees the requested duration scaled
    /// for GO presence.
    fn execute_roc(&self, activation: Activation) -> Result<(), Error> {
        let Activation { iface, path, channel, duration, cookie } = activation;
        let scaled = self.cfg.scaled_duration(duration, self.ops.adapters.is_go_present());
        debug!("activating {:#x} on channel {} for {:?}", cookie, channel, scaled);
        let status = match self.ops.radio.activate_reservation(path, iface, channel, scaled, cookie)
        {
            Ok(()) => return Ok(()),
            Err(status) => status,
        };

        let active = {
            let mut slot = self.roc.lock();
            match slot.active.as_ref() {
                Some(a) if a.ctx.cookie == cookie && a.ctx.state == RocState::Activating => {
                    slot.active.take()
                }
                _ => None,
            }
        };
        let ActiveRoc { iface, path, mut ctx, suspend } = match active {
            Some(active) => active,
            None => {
                debug!("reservation {:#x} already torn down", cookie);
                return Ok(());
            }
        };
        drop(suspend);

        match status {
            RadioStatus::Busy => {
                warn!("radio busy, reservation {:#x} goes back to the queue", cookie);
                ctx.state = RocState::Pending;
                self.queue.lock().requeue_front(QueueEntry { iface, path, ctx }).map_err(
                    |(e, entry)| {
                        entry.ctx.ready.complete(Err(e.clone()));
                        e
                    },
                )?;
                self.dispatch_if_queued();
                Ok(())
            }
            status => {
                error!("radio refused reservation {:#x}: {}", cookie, status);
                let e = Error::InvalidArgs("reservation refused by radio");
                ctx.ready.complete(Err(e.clone()));
                ctx.cancel_done.complete(());
                self.dispatch_if_queued();
                Err(e)
            }
        }
    }

    /// Starts queued reservations until one owns the radio or the queue runs dry.
    pub(crate) fn dispatch_next(&self) {
        loop {
            if self.ops.adapters.is_connection_in_progress() {
                debug!("connection in progress, holding queued reservations");
                return;
            }
            let activation = {
                let mut slot = self.roc.lock();
                if slot.active.is_some() {
                    return;
                }
                let entry = match self.queue.lock().dequeue_front() {
                    Some(entry) => entry,
                    None => return,
                };
                self.install(&mut slot, entry)
            };
            let cookie = activation.cookie;
            match self.execute_roc(activation) {
                Ok(()) => return,
                Err(e) => warn!("queued reservation {:#x} failed: {}", cookie, e),
            }
        }
    }

    /// Restarts dispatch of queued reservations, e.g. once a connection attempt finished.
    pub fn kick_queue(&self) {
        self.dispatch_next();
    }

    fn dispatch_if_queued(&self) {
        let mut slot = self.roc.lock();
        if !self.queue.lock().is_empty() {
            slot.schedule_dispatch();
        }
    }

    pub(crate) fn handle_reservation_ready(&self, iface: IfaceId, cookie: Cookie) {
        let (listen, channel, duration, ready, buffered) = {
            let mut guard = self.roc.lock();
            let slot = &mut *guard;
            let active = match slot.active.as_mut() {
                Some(a) if a.ctx.cookie == cookie && a.iface == iface => a,
                _ => {
                    warn!("ready event for unknown reservation {:#x}", cookie);
                    return;
                }
            };
            if active.ctx.state != RocState::Activating {
                debug!("duplicate ready event for {:#x} in {:?}", cookie, active.ctx.state);
                return;
            }
            active.ctx.state = RocState::Active;
            let delay = active.ctx.duration + self.cfg.expiry_slack;
            active.ctx.timer_id =
                Some(slot.timer.schedule_after(delay, TimedEvent::RocExpired { cookie }));
            active.ctx.expires_at = Some(Instant::now() + delay);
            (
                active.ctx.is_listen(),
                active.ctx.channel,
                active.ctx.duration,
                active.ctx.ready.clone(),
                active.ctx.pending_frame.take(),
            )
        };
        info!("reservation {:#x} ready on channel {}", cookie, channel);
        if listen {
            self.notifier.send(Notification::ReservationReady { iface, cookie, channel, duration });
        }
        ready.complete(Ok(()));
        if let Some(frame) = buffered {
            self.notifier.send(Notification::FrameReceived {
                iface,
                freq_mhz: frame.freq_mhz,
                rssi_dbm: frame.rssi_dbm,
                frame: frame.bytes,
                flags: RX_FLAG_DEFERRED,
            });
        }
    }

    pub(crate) fn handle_reservation_complete(&self, iface: IfaceId, cookie: Cookie) {
        if !self.teardown(cookie, "completed by radio") {
            debug!("completion for unknown reservation {:#x} on iface {}", cookie, iface);
        }
    }

    pub(crate) fn handle_roc_timeout(&self, id: EventId) {
        let event = {
            let mut slot = self.roc.lock();
            let event = slot.timer.triggered(&id);
            if event == Some(TimedEvent::Dispatch) {
                slot.dispatch_id = None;
            }
            event
        };
        match event {
            Some(TimedEvent::RocExpired { cookie }) => self.handle_roc_expired(id, cookie),
            Some(TimedEvent::Dispatch) => self.dispatch_next(),
            None => debug!("stale timeout {:?}", id),
        }
    }

    fn handle_roc_expired(&self, id: EventId, cookie: Cookie) {
        let target = {
            let mut slot = self.roc.lock();
            match slot.active.as_mut() {
                Some(a) if a.ctx.cookie == cookie && a.ctx.timer_id == Some(id) => {
                    a.ctx.timer_id = None;
                    if a.ctx.cancel_in_progress {
                        None
                    } else {
                        a.ctx.cancel_in_progress = true;
                        a.ctx.state = RocState::CancelRequested;
                        Some((a.iface, a.path))
                    }
                }
                _ => None,
            }
        };
        if let Some((iface, path)) = target {
            info!("reservation {:#x} expired", cookie);
            if let Err(status) = self.ops.radio.cancel_reservation(path, iface, cookie) {
                error!("radio refused to end expired reservation {:#x}: {}", cookie, status);
                self.teardown(cookie, "expired, cancel refused");
            }
        }
    }

    /// Frees the reservation `cookie` if it owns the radio. Returns false if it does not.
    pub(crate) fn teardown(&self, cookie: Cookie, reason: &'static str) -> bool {
        let active = {
            let mut guard = self.roc.lock();
            let slot = &mut *guard;
            match slot.active.as_ref() {
                Some(a) if a.ctx.cookie == cookie => {}
                _ => return false,
            }
            let mut active = match slot.active.take() {
                Some(active) => active,
                None => return false,
            };
            if let Some(id) = active.ctx.timer_id.take() {
                slot.timer.cancel_event(id);
            }
            active
        };
        info!("reservation {:#x} torn down: {}", cookie, reason);
        let ActiveRoc { iface, ctx, suspend, .. } = active;
        if ctx.is_listen() {
            self.notifier.send(Notification::ReservationExpired {
                iface,
                cookie,
                channel: ctx.channel,
            });
        }
        drop(suspend);
        ctx.ready.complete(Err(Error::Aborted));
        ctx.cancel_done.complete(());
        self.dispatch_if_queued();
        true
    }

    /// Cancels the reservation `cookie`. A queued reservation is dropped without involving the
    /// radio. Concurrent cancels of the active reservation share one hardware cancel.
    ///
    /// Returns `InvalidState` if no reservation owns the radio and `NotFound` if the active
    /// reservation belongs to another cookie. Both leave the active reservation untouched.
    pub fn cancel_remain_on_channel(&self, iface: IfaceId, cookie: Cookie) -> Result<(), Error> {
        let mut waited_for_ready = false;
        loop {
            let step = {
                let mut guard = self.roc.lock();
                let slot = &mut *guard;
                if let Some(entry) = self.queue.lock().remove_by_cookie(cookie) {
                    info!("iface {} dropped queued reservation {:#x}", iface, cookie);
                    entry.ctx.ready.complete(Err(Error::Aborted));
                    entry.ctx.cancel_done.complete(());
                    return Ok(());
                }
                let active = match slot.active.as_mut() {
                    None => return Err(Error::InvalidState),
                    Some(a) if a.ctx.cookie != cookie => return Err(Error::NotFound(cookie)),
                    Some(a) => a,
                };
                if active.ctx.cancel_in_progress {
                    CancelStep::WaitTeardown(active.ctx.cancel_done.clone())
                } else if active.ctx.state == RocState::Activating && !waited_for_ready {
                    CancelStep::WaitReady(active.ctx.ready.clone())
                } else {
                    active.ctx.cancel_in_progress = true;
                    active.ctx.state = RocState::CancelRequested;
                    if let Some(id) = active.ctx.timer_id.take() {
                        slot.timer.cancel_event(id);
                    }
                    CancelStep::Issue {
                        iface: active.iface,
                        path: active.path,
                        done: active.ctx.cancel_done.clone(),
                    }
                }
            };

            match step {
                CancelStep::WaitReady(ready) => {
                    if ready.wait_timeout(self.cfg.ready_wait).is_none() {
                        warn!("reservation {:#x} never became ready, cancelling anyway", cookie);
                    }
                    waited_for_ready = true;
                }
                CancelStep::WaitTeardown(done) => {
                    debug!("cancel of {:#x} already in progress", cookie);
                    self.wait_teardown(cookie, &done);
                    return Ok(());
                }
                CancelStep::Issue { iface, path, done } => {
                    info!("cancelling reservation {:#x}", cookie);
                    if let Err(status) = self.ops.radio.cancel_reservation(path, iface, cookie) {
                        error!("radio refused to cancel {:#x}: {}", cookie, status);
                        self.teardown(cookie, "cancel refused");
                        return Ok(());
                    }
                    self.wait_teardown(cookie, &done);
                    return Ok(());
                }
            }
        }
    }

    fn wait_teardown(&self, cookie: Cookie, done: &Completion<()>) {
        if done.wait_timeout(self.cfg.cancel_wait).is_none() {
            warn!(
                "radio did not confirm end of {:#x} within {:?}, forcing cleanup",
                cookie, self.cfg.cancel_wait
            );
            self.teardown(cookie, "cancel timed out");
        }
    }

    /// Waits a bounded time for the reservation of `iface` to end on its own, then cancels it.
    pub(crate) fn cleanup_reservation(&self, iface: IfaceId) {
        for attempt in 0..self.cfg.cleanup_retries {
            if self.active_cookie_of(iface).is_none() {
                return;
            }
            debug!("waiting for reservation of iface {} to end, attempt {}", iface, attempt + 1);
            thread::sleep(self.cfg.cleanup_sleep);
        }
        if let Some(cookie) = self.active_cookie_of(iface) {
            warn!("reservation {:#x} outlived iface {}, cancelling", cookie, iface);
            if let Err(e) = self.cancel_remain_on_channel(iface, cookie) {
                debug!("cleanup cancel of {:#x}: {}", cookie, e);
            }
        }
    }

    fn active_cookie_of(&self, iface: IfaceId) -> Option<Cookie> {
        self.roc.lock().active.as_ref().filter(|a| a.iface == iface).map(|a| a.ctx.cookie)
    }

    pub fn is_roc_in_progress(&self) -> bool {
        self.roc.lock().active.is_some()
    }

    pub fn active_reservation(&self) -> Option<(IfaceId, Cookie, RocState)> {
        self.roc.lock().active.as_ref().map(|a| (a.iface, a.ctx.cookie, a.ctx.state))
    }

    pub fn queued_reservations(&self) -> Vec<Cookie> {
        self.queue.lock().cookies()
    }
}
