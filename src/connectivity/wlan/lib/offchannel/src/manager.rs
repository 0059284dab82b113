// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        completion::{Completer, Completion},
        config::Config,
        cookie::{Appended, Deleted, FreedBucket, Programmed, RandomMacTable},
        device::{
            DeviceOps, FrameFilter, Notification, NotificationSink, RadioEvent, RadioPath,
            RadioStatus,
        },
        diagnostics::{ConnectionStatus, Diagnostics},
        error::Error,
        iface::{IfaceInfo, Role},
        roc::{executor::RocSlot, RocQueue},
        timer::{EventId, Scheduler, Timer},
        tx::PendingTx,
        Cookie, IfaceId,
    },
    log::{debug, error, info, warn},
    parking_lot::{Mutex, RwLock},
    std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
    },
    wlan_common::{
        channel::Channel,
        mac::{MacAddr, MacFmt},
    },
};

const FRAME_FILTERS: [FrameFilter; 2] = [FrameFilter::ProbeRequest, FrameFilter::Action];

pub(crate) struct Iface {
    pub info: Mutex<IfaceInfo>,
    /// The single frame waiting for its acknowledgement.
    pub tx: Mutex<Option<PendingTx>>,
}

/// Coordinates every user of the radio's channel on one device: remain-on-channel reservations,
/// management frame transmits and the random MAC filters backing them.
///
/// Lock order is the active reservation slot before the request queue. Interface TX slots, the
/// random MAC table and the diagnostics context are leaf locks. No lock is held while the radio
/// is called or while waiting on a completion.
pub struct OffChannelManager {
    pub(crate) cfg: Config,
    pub(crate) ops: DeviceOps,
    pub(crate) notifier: NotificationSink,
    pub(crate) roc: Mutex<RocSlot>,
    pub(crate) queue: Mutex<RocQueue>,
    pub(crate) random_macs: Mutex<RandomMacTable>,
    pub(crate) diagnostics: Mutex<Diagnostics>,
    ifaces: RwLock<HashMap<IfaceId, Arc<Iface>>>,
    next_cookie: AtomicU64,
}

impl OffChannelManager {
    pub fn new(
        cfg: Config,
        ops: DeviceOps,
        scheduler: Arc<dyn Scheduler>,
        notifier: NotificationSink,
    ) -> Self {
        Self {
            roc: Mutex::new(RocSlot::new(Timer::new(scheduler))),
            queue: Mutex::new(RocQueue::new(cfg.queue_capacity)),
            random_macs: Mutex::new(RandomMacTable::new(cfg.random_mac_slots)),
            diagnostics: Mutex::new(Diagnostics::default()),
            ifaces: RwLock::new(HashMap::new()),
            next_cookie: AtomicU64::new(1),
            cfg,
            ops,
            notifier,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Starts tracking `info` and subscribes it to probe request and action frames.
    pub fn attach_iface(&self, info: IfaceInfo) -> Result<(), Error> {
        let id = info.id;
        if self.ifaces.read().contains_key(&id) {
            return Err(Error::InvalidArgs("interface already attached"));
        }
        if info.role.radio_path().is_some() {
            for (i, filter) in FRAME_FILTERS.iter().enumerate() {
                if let Err(status) = self.ops.radio.register_frame_filter(id, *filter) {
                    error!("iface {} failed to register {:?} filter: {}", id, filter, status);
                    for registered in &FRAME_FILTERS[..i] {
                        if let Err(status) =
                            self.ops.radio.deregister_frame_filter(id, *registered)
                        {
                            warn!(
                                "iface {} failed to roll back {:?} filter: {}",
                                id, registered, status
                            );
                        }
                    }
                    return Err(status.into());
                }
            }
        }
        info!("iface {} attached as {:?} ({})", id, info.role, info.perm_addr.to_mac_str());
        let iface = Iface { info: Mutex::new(info), tx: Mutex::new(None) };
        self.ifaces.write().insert(id, Arc::new(iface));
        Ok(())
    }

    /// Releases everything `iface` holds: its reservations, its random MAC filters, its
    /// unacknowledged frame and its frame filters.
    pub fn detach_iface(&self, iface: IfaceId) -> Result<(), Error> {
        let state = self.ifaces.write().remove(&iface).ok_or(Error::UnknownIface(iface))?;
        info!("detaching iface {}", iface);

        let dropped = self.queue.lock().remove_iface(iface);
        for entry in dropped {
            entry.ctx.ready.complete(Err(Error::Aborted));
            entry.ctx.cancel_done.complete(());
        }
        self.cleanup_reservation(iface);

        let freed = self.random_macs.lock().delete_all(iface);
        for bucket in freed {
            self.clear_random_mac(bucket);
        }

        let pending = state.tx.lock().take();
        if let Some(pending) = pending {
            warn!("iface {} detached with frame {:#x} unacknowledged", iface, pending.cookie);
            self.notifier.send(Notification::TransmitStatus {
                iface,
                cookie: pending.cookie,
                frame: pending.frame,
                ack: false,
            });
        }

        let role = state.info.lock().role;
        if role.radio_path().is_some() {
            for filter in FRAME_FILTERS.iter() {
                if let Err(status) = self.ops.radio.deregister_frame_filter(iface, *filter) {
                    warn!("iface {} failed to deregister {:?} filter: {}", iface, filter, status);
                }
            }
        }
        Ok(())
    }

    pub fn set_operating_channel(
        &self,
        iface: IfaceId,
        channel: Option<Channel>,
    ) -> Result<(), Error> {
        self.iface(iface)?.info.lock().operating_channel = channel;
        Ok(())
    }

    pub fn handle_radio_event(&self, event: RadioEvent) {
        match event {
            RadioEvent::ReservationReady { iface, cookie } => {
                self.handle_reservation_ready(iface, cookie)
            }
            RadioEvent::ReservationComplete { iface, cookie } => {
                self.handle_reservation_complete(iface, cookie)
            }
            RadioEvent::TxStatus { iface, cookie, success } => {
                self.handle_tx_status(iface, cookie, success)
            }
            RadioEvent::FrameRx { iface, freq_mhz, rssi_dbm, bytes } => {
                self.handle_frame_rx(iface, freq_mhz, rssi_dbm, bytes)
            }
        }
    }

    pub fn handle_timeout(&self, id: EventId) {
        self.handle_roc_timeout(id)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.diagnostics.lock().status()
    }

    /// Called by the adapter layer once a group formed by negotiation starts operating.
    pub fn note_role_started(&self, iface: IfaceId, role: Role) {
        self.diagnostics.lock().on_role_started(iface, role)
    }

    pub fn note_connected(&self, iface: IfaceId) {
        self.diagnostics.lock().on_connected(iface)
    }

    pub fn reset_connection_status(&self) {
        self.diagnostics.lock().reset()
    }

    pub(crate) fn iface(&self, iface: IfaceId) -> Result<Arc<Iface>, Error> {
        self.ifaces.read().get(&iface).cloned().ok_or(Error::UnknownIface(iface))
    }

    pub(crate) fn radio_path(&self, iface: IfaceId) -> Result<RadioPath, Error> {
        let role = self.iface(iface)?.info.lock().role;
        role.radio_path().ok_or(Error::Unsupported(role))
    }

    /// Cookies are unique across interfaces and request kinds.
    pub(crate) fn next_cookie(&self) -> Cookie {
        self.next_cookie.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers `cookie` for frames sent from the random address `mac`, programming a filter for
    /// `mac` if it has none yet. Returns once the filter is in place; a caller that finds the
    /// filter still being programmed waits for that instead of programming it again.
    pub(crate) fn register_random_cookie(
        &self,
        iface: IfaceId,
        mac: MacAddr,
        cookie: Cookie,
    ) -> Result<(), Error> {
        let appended = self.random_macs.lock().append_cookie(iface, mac, cookie)?;
        let (bucket, programmed) = match appended {
            Appended::Existing { .. } => return Ok(()),
            Appended::Joined { bucket, programmed } => {
                debug!("cookie {:#x} waits for random mac bucket {}", cookie, bucket);
                let result = self.wait_random_mac(&programmed);
                if result.is_err() {
                    self.unregister_random_cookie(cookie);
                }
                return result;
            }
            Appended::NewBucket { bucket, programmed } => (bucket, programmed),
        };

        let result = self
            .ops
            .radio
            .set_random_mac(iface, bucket, mac, Completer::new(programmed.clone(), false))
            .map_err(Error::from)
            .and_then(|()| self.wait_random_mac(&programmed));
        let settled = self.random_macs.lock().finish_programming(bucket, result.is_ok());
        // Wakes callers that joined the bucket; a no-op if the radio already answered.
        programmed.complete(result.is_ok());
        match (settled, result) {
            (Programmed::Active, result) => result,
            (Programmed::Orphaned(freed), _) => {
                info!("random mac {} lost its cookies while programmed", mac.to_mac_str());
                self.clear_random_mac(freed);
                Err(Error::Aborted)
            }
            (Programmed::Failed(cookies), result) => {
                let e = result.err().unwrap_or(Error::Aborted);
                error!(
                    "failed to program random mac {} in bucket {}, dropping {} cookies: {}",
                    mac.to_mac_str(),
                    bucket,
                    cookies.len(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Returns true if `cookie` was registered.
    pub(crate) fn unregister_random_cookie(&self, cookie: Cookie) -> bool {
        let deleted = self.random_macs.lock().delete_cookie(cookie);
        match deleted {
            Deleted::NotFound => false,
            Deleted::Removed { .. } => true,
            Deleted::BucketFreed(bucket) => {
                self.clear_random_mac(bucket);
                true
            }
        }
    }

    fn clear_random_mac(&self, freed: FreedBucket) {
        let FreedBucket { bucket, iface, mac } = freed;
        let done = Completion::new();
        let result = self
            .ops
            .radio
            .clear_random_mac(iface, bucket, mac, Completer::new(done.clone(), false))
            .map_err(Error::from)
            .and_then(|()| self.wait_random_mac(&done));
        if let Err(e) = result {
            warn!("failed to clear random mac {} in bucket {}: {}", mac.to_mac_str(), bucket, e);
        }
    }

    fn wait_random_mac(&self, done: &Completion<bool>) -> Result<(), Error> {
        match done.wait_timeout(self.cfg.random_mac_wait) {
            Some(true) => Ok(()),
            Some(false) => Err(Error::Radio(RadioStatus::Failure(-libc::EIO))),
            None => Err(Error::Timeout("random mac filter")),
        }
    }
}
