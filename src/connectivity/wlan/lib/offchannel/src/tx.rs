// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Management frame transmission on behalf of user space, and the receive side that feeds
//! negotiation frames back to it.

use {
    crate::{
        completion::Completion,
        device::{Notification, RadioPath, TxDescriptor},
        error::Error,
        manager::{Iface, OffChannelManager},
        roc::{
            context::ReadyCompletion, PendingFrame, QueueEntry, RequestKind, RocContext, RocState,
        },
        Cookie, IfaceId,
    },
    log::{debug, error, info, warn},
    std::{sync::Arc, time::Duration},
    wlan_common::{
        channel::Channel,
        mac::{MgmtFrame, MgmtHdr, MGMT_SUBTYPE_ACTION, MGMT_SUBTYPE_AUTH},
        p2p::{ActionKind, PublicActionSubtype},
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    /// A complete management frame, starting with its MAC header.
    pub frame: Vec<u8>,
    /// None sends on the operating channel.
    pub channel: Option<Channel>,
    /// How long to stay on the channel for a response.
    pub wait: Duration,
    pub no_ack: bool,
}

/// The frame of an interface that still waits for its acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingTx {
    pub cookie: Cookie,
    pub frame: Vec<u8>,
    pub action: Option<ActionKind>,
    /// Receiving this frame from the peer proves the pending one arrived.
    pub acked_by: Option<PublicActionSubtype>,
}

struct Outgoing {
    cookie: Cookie,
    frame: Vec<u8>,
    action: Option<ActionKind>,
    no_ack: bool,
    randomized: bool,
}

enum Reuse {
    Extended,
    WaitReady(Arc<ReadyCompletion>),
    WaitCancel(Arc<Completion<()>>),
    None,
}

/// Frames answering these only need to be acknowledged, so the peer's reply proves delivery.
fn early_ack_reply(action: Option<ActionKind>) -> Option<PublicActionSubtype> {
    use PublicActionSubtype::*;
    action.and_then(|a| a.p2p_public()).and_then(|s| s.expected_reply()).filter(|reply| {
        matches!(reply, GoNegotiationConfirmation | ProvisionDiscoveryResponse | InvitationResponse)
    })
}

impl OffChannelManager {
    /// Sends a management frame for user space and returns the cookie its transmit status is
    /// reported with. Errors are only returned for requests that were never attempted; once a
    /// cookie is handed out, failures are reported as a failed transmit status.
    pub fn transmit(&self, iface: IfaceId, req: TxRequest) -> Result<Cookie, Error> {
        if req.frame.len() < MgmtHdr::LEN {
            return Err(Error::InvalidArgs("frame shorter than a management header"));
        }
        let (subtype, src, action) = {
            let frame = MgmtFrame::parse(&req.frame[..])
                .ok_or(Error::InvalidArgs("not a management frame"))?;
            let subtype = frame.subtype();
            let action = if subtype == MGMT_SUBTYPE_ACTION {
                ActionKind::from_body(frame.body)
            } else {
                None
            };
            (subtype, frame.transmitter_addr(), action)
        };
        let state = self.iface(iface)?;
        let info = state.info.lock().clone();
        let path = info.role.radio_path().ok_or(Error::Unsupported(info.role))?;
        if req.no_ack && state.tx.lock().is_some() {
            warn!("iface {} rejects no-ack frame while another is unacknowledged", iface);
            return Err(Error::Busy);
        }

        let cookie = self.next_cookie();
        self.diagnostics.lock().on_tx(iface, subtype, action);
        let mut out =
            Outgoing { cookie, frame: req.frame, action, no_ack: req.no_ack, randomized: false };

        if subtype == MGMT_SUBTYPE_AUTH && info.role.sends_auth_directly() {
            self.send(&state, iface, path, out, info.operating_channel, Duration::ZERO);
            return Ok(cookie);
        }
        if info.role.drops_user_frame(subtype) {
            debug!("iface {} leaves frame subtype {:#x} to firmware", iface, subtype);
            self.notifier.send(Notification::TransmitStatus {
                iface,
                cookie,
                frame: out.frame,
                ack: true,
            });
            return Ok(cookie);
        }
        if src != info.perm_addr {
            self.register_random_cookie(iface, src, cookie)?;
            out.randomized = true;
        }

        match req.channel.or(info.operating_channel) {
            Some(channel) if Some(channel) != info.operating_channel => {
                self.transmit_off_channel(&state, iface, path, channel, req.wait, out)
            }
            channel => self.send(&state, iface, path, out, channel, Duration::ZERO),
        }
        Ok(cookie)
    }

    fn transmit_off_channel(
        &self,
        state: &Iface,
        iface: IfaceId,
        path: RadioPath,
        channel: Channel,
        wait: Duration,
        out: Outgoing,
    ) {
        let reuse = {
            let mut slot = self.roc.lock();
            match slot.active.as_ref() {
                Some(a) if a.iface == iface && a.ctx.channel == channel => {
                    if a.ctx.cancel_in_progress {
                        Reuse::WaitCancel(a.ctx.cancel_done.clone())
                    } else if a.ctx.state == RocState::Activating {
                        Reuse::WaitReady(a.ctx.ready.clone())
                    } else {
                        slot.extend_active(wait.max(self.tx_grace(out.action)));
                        Reuse::Extended
                    }
                }
                _ => Reuse::None,
            }
        };
        match reuse {
            Reuse::Extended => return self.send(state, iface, path, out, Some(channel), wait),
            Reuse::WaitReady(ready) => {
                return match ready.wait_timeout(self.cfg.ready_wait) {
                    Some(Ok(())) => self.send(state, iface, path, out, Some(channel), wait),
                    _ => {
                        warn!("reservation on channel {} never became ready", channel);
                        self.fail_tx(iface, out)
                    }
                };
            }
            Reuse::WaitCancel(done) => {
                debug!("reservation on channel {} is ending, requesting a new one", channel);
                if done.wait_timeout(self.cfg.cancel_wait).is_none() {
                    warn!("previous reservation on channel {} did not end in time", channel);
                }
            }
            Reuse::None => {}
        }

        let duration = wait.max(self.cfg.default_tx_wait);
        let ctx = RocContext::new(channel, duration, out.cookie, RequestKind::OffChannelTx);
        let ready = ctx.ready.clone();
        if let Err(e) = self.request_roc(QueueEntry { iface, path, ctx }) {
            warn!("no reservation for frame {:#x}: {}", out.cookie, e);
            return self.fail_tx(iface, out);
        }
        match ready.wait_timeout(self.cfg.ready_wait) {
            Some(Ok(())) => self.send(state, iface, path, out, Some(channel), wait),
            Some(Err(e)) => {
                warn!("reservation for frame {:#x} failed: {}", out.cookie, e);
                self.fail_tx(iface, out)
            }
            None => {
                warn!("channel {} not ready within {:?}", channel, self.cfg.ready_wait);
                match self.cancel_remain_on_channel(iface, out.cookie) {
                    Err(e) if !e.is_soft() => {
                        error!("failed to cancel reservation for frame {:#x}: {}", out.cookie, e)
                    }
                    _ => {}
                }
                self.fail_tx(iface, out)
            }
        }
    }

    fn tx_grace(&self, action: Option<ActionKind>) -> Duration {
        match action.and_then(|a| a.p2p_public()) {
            Some(subtype) if subtype.expected_reply().is_some() => self.cfg.response_grace,
            _ => self.cfg.ack_grace,
        }
    }

    fn send(
        &self,
        state: &Iface,
        iface: IfaceId,
        path: RadioPath,
        out: Outgoing,
        channel: Option<Channel>,
        wait: Duration,
    ) {
        let previous = {
            let mut tx = state.tx.lock();
            if out.no_ack {
                if tx.is_some() {
                    drop(tx);
                    warn!("frame {:#x} raced with an unacknowledged frame", out.cookie);
                    return self.fail_tx(iface, out);
                }
                None
            } else {
                tx.replace(PendingTx {
                    cookie: out.cookie,
                    frame: out.frame.clone(),
                    action: out.action,
                    acked_by: early_ack_reply(out.action),
                })
            }
        };
        if let Some(previous) = previous {
            warn!("frame {:#x} still unacknowledged, reporting it failed", previous.cookie);
            self.notifier.send(Notification::TransmitStatus {
                iface,
                cookie: previous.cookie,
                frame: previous.frame,
                ack: false,
            });
        }

        let desc = TxDescriptor {
            frame: out.frame.clone(),
            channel,
            wait,
            no_ack: out.no_ack,
            cookie: out.cookie,
        };
        match self.ops.radio.send_frame(path, iface, desc) {
            Ok(()) if out.no_ack => self.notifier.send(Notification::TransmitStatus {
                iface,
                cookie: out.cookie,
                frame: out.frame,
                ack: true,
            }),
            Ok(()) => {}
            Err(status) => {
                error!("failed to send frame {:#x}: {}", out.cookie, status);
                {
                    let mut tx = state.tx.lock();
                    if tx.as_ref().map_or(false, |p| p.cookie == out.cookie) {
                        *tx = None;
                    }
                }
                self.fail_tx(iface, out)
            }
        }
    }

    fn fail_tx(&self, iface: IfaceId, out: Outgoing) {
        if out.randomized {
            self.unregister_random_cookie(out.cookie);
        }
        self.notifier.send(Notification::TransmitStatus {
            iface,
            cookie: out.cookie,
            frame: out.frame,
            ack: false,
        });
    }

    pub(crate) fn handle_tx_status(&self, iface: IfaceId, cookie: Cookie, success: bool) {
        let state = match self.iface(iface) {
            Ok(state) => state,
            Err(e) => {
                debug!("tx status {:#x} dropped: {}", cookie, e);
                return;
            }
        };
        let pending = {
            let mut tx = state.tx.lock();
            match tx.as_ref() {
                Some(p) if p.cookie == cookie => tx.take(),
                _ => None,
            }
        };
        match pending {
            Some(pending) => {
                self.diagnostics.lock().on_tx_status(iface, pending.action, success);
                self.notifier.send(Notification::TransmitStatus {
                    iface,
                    cookie,
                    frame: pending.frame,
                    ack: success,
                });
            }
            None => debug!("suppressing duplicate tx status for {:#x}", cookie),
        }
    }

    /// Stops waiting for a response to the frame `cookie`: its random MAC filter goes away and
    /// the reservation it created, if still around, is cancelled.
    pub fn cancel_tx_wait(&self, iface: IfaceId, cookie: Cookie) -> Result<(), Error> {
        let unregistered = self.unregister_random_cookie(cookie);
        match self.cancel_remain_on_channel(iface, cookie) {
            Ok(()) => Ok(()),
            Err(Error::InvalidState) | Err(Error::NotFound(_)) if unregistered => Ok(()),
            Err(Error::InvalidState) => Err(Error::NotFound(cookie)),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn handle_frame_rx(
        &self,
        iface: IfaceId,
        freq_mhz: u16,
        rssi_dbm: i8,
        bytes: Vec<u8>,
    ) {
        if bytes.len() < MgmtHdr::LEN {
            debug!("dropping runt frame of {} bytes on iface {}", bytes.len(), iface);
            return;
        }
        let action = ActionKind::from_frame(&bytes[..]);
        self.diagnostics.lock().on_rx(iface, action);
        let received = action.and_then(|a| a.p2p_public());
        if let Some(received) = received {
            self.ack_by_reply(iface, received);
        }

        {
            let mut guard = self.roc.lock();
            let slot = &mut *guard;
            let state = slot.active.as_ref().filter(|a| a.iface == iface).map(|a| a.ctx.state);
            match state {
                Some(RocState::Activating) if self.cfg.buffer_rx_before_ready => {
                    if let Some(active) = slot.active.as_mut() {
                        let frame = PendingFrame { freq_mhz, rssi_dbm, bytes };
                        if active.ctx.buffer_frame(frame) {
                            debug!("replaced frame buffered for {:#x}", active.ctx.cookie);
                        }
                    }
                    return;
                }
                Some(RocState::Active) => {
                    let grace = match received {
                        Some(subtype) if subtype.is_request() => Some(self.cfg.response_grace),
                        Some(PublicActionSubtype::GoNegotiationResponse) => {
                            Some(self.cfg.ack_grace)
                        }
                        _ => None,
                    };
                    if let Some(grace) = grace {
                        slot.extend_active(grace);
                    }
                }
                _ => {}
            }
        }

        self.notifier.send(Notification::FrameReceived {
            iface,
            freq_mhz,
            rssi_dbm,
            frame: bytes,
            flags: 0,
        });
    }

    /// Resolves the unacknowledged frame of `iface` if `received` is the reply it was waiting for.
    fn ack_by_reply(&self, iface: IfaceId, received: PublicActionSubtype) {
        let state = match self.iface(iface) {
            Ok(state) => state,
            Err(_) => return,
        };
        let pending = {
            let mut tx = state.tx.lock();
            match tx.as_ref() {
                Some(p) if p.acked_by == Some(received) => tx.take(),
                _ => None,
            }
        };
        if let Some(pending) = pending {
            info!("{} received before ack of {:#x}", received.name(), pending.cookie);
            self.diagnostics.lock().on_tx_status(iface, pending.action, true);
            self.notifier.send(Notification::TransmitStatus {
                iface,
                cookie: pending.cookie,
                frame: pending.frame,
                ack: true,
            });
        }
    }
}
