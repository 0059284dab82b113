// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{completion::Completer, Cookie, IfaceId},
    futures::channel::mpsc,
    log::debug,
    std::{sync::Arc, time::Duration},
    thiserror::Error,
    wlan_common::{channel::Channel, mac::MacAddr},
};

/// Outcome reported by the radio when it refuses a request.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RadioStatus {
    #[error("radio busy")]
    Busy,
    #[error("not supported by radio")]
    NotSupported,
    #[error("radio failure ({0})")]
    Failure(i32),
}

/// The firmware entity a request is routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioPath {
    /// Station management, used by client and P2P device interfaces.
    Sme,
    /// Soft AP, used by AP and P2P GO interfaces.
    Sap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameFilter {
    ProbeRequest,
    Action,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxDescriptor {
    pub frame: Vec<u8>,
    /// None transmits on the channel the interface currently operates on.
    pub channel: Option<Channel>,
    pub wait: Duration,
    pub no_ack: bool,
    pub cookie: Cookie,
}

/// Low level radio control. Every call returns as soon as the request was handed to the
/// firmware; the outcome arrives later as a `RadioEvent` carrying the same cookie.
pub trait RadioControl: Send + Sync {
    fn activate_reservation(
        &self,
        path: RadioPath,
        iface: IfaceId,
        channel: Channel,
        duration: Duration,
        cookie: Cookie,
    ) -> Result<(), RadioStatus>;
    fn cancel_reservation(
        &self,
        path: RadioPath,
        iface: IfaceId,
        cookie: Cookie,
    ) -> Result<(), RadioStatus>;
    fn register_frame_filter(&self, iface: IfaceId, filter: FrameFilter)
        -> Result<(), RadioStatus>;
    fn deregister_frame_filter(
        &self,
        iface: IfaceId,
        filter: FrameFilter,
    ) -> Result<(), RadioStatus>;
    fn send_frame(
        &self,
        path: RadioPath,
        iface: IfaceId,
        tx: TxDescriptor,
    ) -> Result<(), RadioStatus>;
    /// Programs the random MAC filter of `bucket`. `done` reports whether the firmware accepted it.
    fn set_random_mac(
        &self,
        iface: IfaceId,
        bucket: usize,
        mac: MacAddr,
        done: Completer<bool>,
    ) -> Result<(), RadioStatus>;
    fn clear_random_mac(
        &self,
        iface: IfaceId,
        bucket: usize,
        mac: MacAddr,
        done: Completer<bool>,
    ) -> Result<(), RadioStatus>;
}

/// Asynchronous reports of the radio. They are fed to `OffChannelManager::handle_radio_event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    ReservationReady { iface: IfaceId, cookie: Cookie },
    ReservationComplete { iface: IfaceId, cookie: Cookie },
    TxStatus { iface: IfaceId, cookie: Cookie, success: bool },
    FrameRx { iface: IfaceId, freq_mhz: u16, rssi_dbm: i8, bytes: Vec<u8> },
}

/// Set on a `FrameReceived` notification whose frame was held until its reservation became ready.
pub const RX_FLAG_DEFERRED: u32 = 1 << 0;

/// Upcalls to user space. Delivery is fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ReservationReady { iface: IfaceId, cookie: Cookie, channel: Channel, duration: Duration },
    ReservationExpired { iface: IfaceId, cookie: Cookie, channel: Channel },
    FrameReceived { iface: IfaceId, freq_mhz: u16, rssi_dbm: i8, frame: Vec<u8>, flags: u32 },
    TransmitStatus { iface: IfaceId, cookie: Cookie, frame: Vec<u8>, ack: bool },
}

#[derive(Debug, Clone)]
pub struct UnboundedSink<T> {
    sink: mpsc::UnboundedSender<T>,
}

impl<T> UnboundedSink<T> {
    pub fn new(sink: mpsc::UnboundedSender<T>) -> Self {
        UnboundedSink { sink }
    }

    pub fn send(&self, msg: T) {
        if let Err(e) = self.sink.unbounded_send(msg) {
            if e.is_full() {
                panic!("Did not expect an unbounded channel to be full: {:?}", e);
            }
            // If user space went away the radio must still be driven back to its home channel,
            // so carry on.
            debug!("notification dropped, receiver disconnected");
        }
    }
}

pub type NotificationSink = UnboundedSink<Notification>;

pub trait PowerGuard: Send + Sync {
    fn prevent_suspend(&self, tag: &'static str);
    fn allow_suspend(&self, tag: &'static str);
}

/// Keeps the system awake until dropped.
pub struct SuspendLock {
    guard: Arc<dyn PowerGuard>,
    tag: &'static str,
}

impl SuspendLock {
    pub fn new(guard: Arc<dyn PowerGuard>, tag: &'static str) -> Self {
        guard.prevent_suspend(tag);
        Self { guard, tag }
    }
}

impl Drop for SuspendLock {
    fn drop(&mut self) {
        self.guard.allow_suspend(self.tag);
    }
}

/// What the off-channel machinery needs to know about the adapters sharing the radio.
pub trait AdapterView: Send + Sync {
    /// True if any attached interface currently operates as a P2P group owner.
    fn is_go_present(&self) -> bool;
    /// True while an association or group formation is running on any interface.
    fn is_connection_in_progress(&self) -> bool;
}

#[derive(Clone)]
pub struct DeviceOps {
    pub radio: Arc<dyn RadioControl>,
    pub power: Arc<dyn PowerGuard>,
    pub adapters: Arc<dyn AdapterView>,
}
