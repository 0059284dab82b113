// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        completion::Completer,
        config::Config,
        device::{
            AdapterView, DeviceOps, FrameFilter, Notification, NotificationSink, PowerGuard,
            RadioControl, RadioEvent, RadioPath, RadioStatus, TxDescriptor,
        },
        iface::{IfaceInfo, Role},
        manager::OffChannelManager,
        timer::{EventId, Scheduler},
        Cookie, IfaceId,
    },
    futures::{channel::mpsc, executor::block_on, StreamExt},
    parking_lot::Mutex,
    std::{
        collections::{BTreeMap, HashMap, HashSet, VecDeque},
        sync::{
            atomic::{AtomicBool, AtomicI64, Ordering},
            Arc,
        },
        time::Duration,
    },
    wlan_common::{
        channel::Channel,
        mac::{FrameControl, MacAddr, MgmtHdr, FRAME_TYPE_MGMT, MGMT_SUBTYPE_PROBE_REQ},
        p2p::{
            test_utils::{action_frame, p2p_public_action_body},
            PublicActionSubtype,
        },
    },
    zerocopy::AsBytes,
};

pub const IFACE: IfaceId = 1;
pub const PERM_ADDR: MacAddr = [0x00, 0x1a, 0x11, 0x00, 0x00, 0x01];
pub const PEER: MacAddr = [0x00, 0x1a, 0x11, 0x00, 0x00, 0x02];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    Activate {
        path: RadioPath,
        iface: IfaceId,
        channel: Channel,
        duration: Duration,
        cookie: Cookie,
    },
    Cancel { path: RadioPath, iface: IfaceId, cookie: Cookie },
    RegisterFilter { iface: IfaceId, filter: FrameFilter },
    DeregisterFilter { iface: IfaceId, filter: FrameFilter },
    Send { path: RadioPath, iface: IfaceId, tx: TxDescriptor },
    SetRandomMac { iface: IfaceId, bucket: usize, mac: MacAddr },
    ClearRandomMac { iface: IfaceId, bucket: usize, mac: MacAddr },
}

/// Records every call. All calls but frame filter updates are also streamed so that a test can
/// wait for a call made on another thread.
pub struct FakeRadio {
    calls: Mutex<Vec<RadioCall>>,
    call_sink: mpsc::UnboundedSender<RadioCall>,
    activate_results: Mutex<VecDeque<Result<(), RadioStatus>>>,
    send_result: Mutex<Result<(), RadioStatus>>,
    filter_failures: Mutex<HashMap<FrameFilter, RadioStatus>>,
    frame_filters: Mutex<HashSet<(IfaceId, FrameFilter)>>,
    /// None leaves random MAC requests unanswered.
    random_mac_response: Mutex<Option<bool>>,
    random_mac_filters: Mutex<BTreeMap<usize, MacAddr>>,
    /// Held random MAC requests: the completer, the bucket and the MAC being set, or None when
    /// the bucket is being cleared.
    unanswered: Mutex<Vec<(Completer<bool>, usize, Option<MacAddr>)>>,
    deregister_failure: Mutex<Option<RadioStatus>>,
}

impl FakeRadio {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RadioCall>) {
        let (call_sink, calls) = mpsc::unbounded();
        let radio = Self {
            calls: Mutex::new(vec![]),
            call_sink,
            activate_results: Mutex::new(VecDeque::new()),
            send_result: Mutex::new(Ok(())),
            filter_failures: Mutex::new(HashMap::new()),
            frame_filters: Mutex::new(HashSet::new()),
            random_mac_response: Mutex::new(Some(true)),
            random_mac_filters: Mutex::new(BTreeMap::new()),
            unanswered: Mutex::new(vec![]),
            deregister_failure: Mutex::new(None),
        };
        (radio, calls)
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.calls.lock().clone()
    }

    /// The next activation returns `result`. Activations succeed once the scripted results ran out.
    pub fn push_activate_result(&self, result: Result<(), RadioStatus>) {
        self.activate_results.lock().push_back(result);
    }

    pub fn set_send_result(&self, result: Result<(), RadioStatus>) {
        *self.send_result.lock() = result;
    }

    pub fn fail_filter(&self, filter: FrameFilter, status: RadioStatus) {
        self.filter_failures.lock().insert(filter, status);
    }

    pub fn set_random_mac_response(&self, response: Option<bool>) {
        *self.random_mac_response.lock() = response;
    }

    pub fn fail_deregister(&self, status: RadioStatus) {
        *self.deregister_failure.lock() = Some(status);
    }

    /// Answers every random MAC request held while no response was set.
    pub fn answer_random_macs(&self, success: bool) {
        let held = std::mem::take(&mut *self.unanswered.lock());
        for (done, bucket, mac) in held {
            if success {
                let mut filters = self.random_mac_filters.lock();
                match mac {
                    Some(mac) => filters.insert(bucket, mac),
                    None => filters.remove(&bucket),
                };
            }
            done.complete(success);
        }
    }

    pub fn active_frame_filters(&self) -> Vec<(IfaceId, FrameFilter)> {
        self.frame_filters.lock().iter().copied().collect()
    }

    pub fn random_mac_filters(&self) -> Vec<MacAddr> {
        self.random_mac_filters.lock().values().copied().collect()
    }

    fn record(&self, call: RadioCall, stream: bool) {
        self.calls.lock().push(call.clone());
        if stream {
            self.call_sink.unbounded_send(call).expect("radio call stream closed");
        }
    }

    fn answer_random_mac(&self, done: Completer<bool>, bucket: usize, mac: Option<MacAddr>) {
        let response = *self.random_mac_response.lock();
        match response {
            Some(true) => {
                let mut filters = self.random_mac_filters.lock();
                match mac {
                    Some(mac) => filters.insert(bucket, mac),
                    None => filters.remove(&bucket),
                };
                drop(filters);
                done.complete(true);
            }
            Some(false) => done.complete(false),
            None => self.unanswered.lock().push((done, bucket, mac)),
        }
    }
}

impl RadioControl for FakeRadio {
    fn activate_reservation(
        &self,
        path: RadioPath,
        iface: IfaceId,
        channel: Channel,
        duration: Duration,
        cookie: Cookie,
    ) -> Result<(), RadioStatus> {
        self.record(RadioCall::Activate { path, iface, channel, duration, cookie }, true);
        self.activate_results.lock().pop_front().unwrap_or(Ok(()))
    }

    fn cancel_reservation(
        &self,
        path: RadioPath,
        iface: IfaceId,
        cookie: Cookie,
    ) -> Result<(), RadioStatus> {
        self.record(RadioCall::Cancel { path, iface, cookie }, true);
        Ok(())
    }

    fn register_frame_filter(
        &self,
        iface: IfaceId,
        filter: FrameFilter,
    ) -> Result<(), RadioStatus> {
        self.record(RadioCall::RegisterFilter { iface, filter }, false);
        if let Some(status) = self.filter_failures.lock().get(&filter) {
            return Err(*status);
        }
        self.frame_filters.lock().insert((iface, filter));
        Ok(())
    }

    fn deregister_frame_filter(
        &self,
        iface: IfaceId,
        filter: FrameFilter,
    ) -> Result<(), RadioStatus> {
        self.record(RadioCall::DeregisterFilter { iface, filter }, false);
        self.frame_filters.lock().remove(&(iface, filter));
        match *self.deregister_failure.lock() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn send_frame(
        &self,
        path: RadioPath,
        iface: IfaceId,
        tx: TxDescriptor,
    ) -> Result<(), RadioStatus> {
        self.record(RadioCall::Send { path, iface, tx }, true);
        *self.send_result.lock()
    }

    fn set_random_mac(
        &self,
        iface: IfaceId,
        bucket: usize,
        mac: MacAddr,
        done: Completer<bool>,
    ) -> Result<(), RadioStatus> {
        self.record(RadioCall::SetRandomMac { iface, bucket, mac }, true);
        self.answer_random_mac(done, bucket, Some(mac));
        Ok(())
    }

    fn clear_random_mac(
        &self,
        iface: IfaceId,
        bucket: usize,
        mac: MacAddr,
        done: Completer<bool>,
    ) -> Result<(), RadioStatus> {
        self.record(RadioCall::ClearRandomMac { iface, bucket, mac }, true);
        self.answer_random_mac(done, bucket, None);
        Ok(())
    }
}

#[derive(Default)]
struct SchedulerState {
    next_id: u64,
    scheduled: BTreeMap<EventId, Duration>,
    cancels: usize,
    stale_cancels: usize,
}

/// Timeouts only fire when a test fires them.
#[derive(Default)]
pub struct FakeScheduler {
    state: Mutex<SchedulerState>,
}

impl FakeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live timeouts in scheduling order.
    pub fn scheduled(&self) -> Vec<(EventId, Duration)> {
        self.state.lock().scheduled.iter().map(|(id, delay)| (*id, *delay)).collect()
    }

    pub fn is_scheduled(&self, id: EventId) -> bool {
        self.state.lock().scheduled.contains_key(&id)
    }

    /// Marks `id` as fired. Returns false if it was not live.
    pub fn take(&self, id: EventId) -> bool {
        self.state.lock().scheduled.remove(&id).is_some()
    }

    pub fn take_all(&self) -> Vec<EventId> {
        let scheduled = std::mem::take(&mut self.state.lock().scheduled);
        scheduled.into_keys().collect()
    }

    pub fn cancel_count(&self) -> usize {
        self.state.lock().cancels
    }

    /// Cancels of timeouts that already fired or were cancelled before.
    pub fn stale_cancels(&self) -> usize {
        self.state.lock().stale_cancels
    }
}

impl Scheduler for FakeScheduler {
    fn schedule(&self, delay: Duration) -> EventId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = EventId(state.next_id);
        state.scheduled.insert(id, delay);
        id
    }

    fn cancel(&self, id: EventId) {
        let mut state = self.state.lock();
        if state.scheduled.remove(&id).is_some() {
            state.cancels += 1;
        } else {
            state.stale_cancels += 1;
        }
    }
}

#[derive(Default)]
pub struct FakePowerGuard {
    held: AtomicI64,
}

impl FakePowerGuard {
    pub fn held(&self) -> i64 {
        self.held.load(Ordering::SeqCst)
    }
}

impl PowerGuard for FakePowerGuard {
    fn prevent_suspend(&self, _tag: &'static str) {
        self.held.fetch_add(1, Ordering::SeqCst);
    }

    fn allow_suspend(&self, _tag: &'static str) {
        self.held.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeAdapters {
    go_present: AtomicBool,
    connecting: AtomicBool,
}

impl FakeAdapters {
    pub fn set_go_present(&self, present: bool) {
        self.go_present.store(present, Ordering::SeqCst);
    }

    pub fn set_connection_in_progress(&self, connecting: bool) {
        self.connecting.store(connecting, Ordering::SeqCst);
    }
}

impl AdapterView for FakeAdapters {
    fn is_go_present(&self) -> bool {
        self.go_present.load(Ordering::SeqCst)
    }

    fn is_connection_in_progress(&self) -> bool {
        self.connecting.load(Ordering::SeqCst)
    }
}

/// Short enough for tests that run into a timeout, long enough for the ones that race a
/// background thread.
pub fn test_config() -> Config {
    Config {
        ready_wait: Duration::from_secs(2),
        cancel_wait: Duration::from_secs(2),
        random_mac_wait: Duration::from_secs(1),
        cleanup_sleep: Duration::from_millis(5),
        ..Config::default()
    }
}

pub struct TestHarness {
    pub mgr: Arc<OffChannelManager>,
    pub radio: Arc<FakeRadio>,
    pub scheduler: Arc<FakeScheduler>,
    pub power: Arc<FakePowerGuard>,
    pub adapters: Arc<FakeAdapters>,
    radio_calls: mpsc::UnboundedReceiver<RadioCall>,
    notifications: mpsc::UnboundedReceiver<Notification>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(cfg: Config) -> Self {
        let (radio, radio_calls) = FakeRadio::new();
        let radio = Arc::new(radio);
        let scheduler = Arc::new(FakeScheduler::new());
        let power = Arc::new(FakePowerGuard::default());
        let adapters = Arc::new(FakeAdapters::default());
        let (sink, notifications) = mpsc::unbounded();
        let ops =
            DeviceOps { radio: radio.clone(), power: power.clone(), adapters: adapters.clone() };
        let mgr = Arc::new(OffChannelManager::new(
            cfg,
            ops,
            scheduler.clone(),
            NotificationSink::new(sink),
        ));
        Self { mgr, radio, scheduler, power, adapters, radio_calls, notifications }
    }

    pub fn attach(&self, id: IfaceId, role: Role, operating_channel: Option<Channel>) {
        self.mgr
            .attach_iface(IfaceInfo { id, role, perm_addr: PERM_ADDR, operating_channel })
            .expect("attaching iface");
    }

    /// Blocks until the radio is called.
    pub fn next_radio_call(&mut self) -> RadioCall {
        block_on(self.radio_calls.next()).expect("radio call stream closed")
    }

    pub fn drain_radio_calls(&mut self) -> Vec<RadioCall> {
        std::iter::from_fn(|| self.radio_calls.try_next().ok().flatten()).collect()
    }

    pub fn notifications(&mut self) -> Vec<Notification> {
        std::iter::from_fn(|| self.notifications.try_next().ok().flatten()).collect()
    }

    pub fn fire_all_timers(&self) {
        for id in self.scheduler.take_all() {
            self.mgr.handle_timeout(id);
        }
    }

    pub fn ready(&self, iface: IfaceId, cookie: Cookie) {
        self.mgr.handle_radio_event(RadioEvent::ReservationReady { iface, cookie });
    }

    pub fn complete(&self, iface: IfaceId, cookie: Cookie) {
        self.mgr.handle_radio_event(RadioEvent::ReservationComplete { iface, cookie });
    }
}

pub fn mgmt_frame(subtype: u16, src: MacAddr) -> Vec<u8> {
    let fc = FrameControl::new(FRAME_TYPE_MGMT, subtype);
    MgmtHdr::new(fc, PEER, src, PEER).as_bytes().to_vec()
}

pub fn probe_request_frame(src: MacAddr) -> Vec<u8> {
    mgmt_frame(MGMT_SUBTYPE_PROBE_REQ, src)
}

pub fn p2p_frame(src: MacAddr, subtype: PublicActionSubtype) -> Vec<u8> {
    action_frame(src, &p2p_public_action_body(subtype, 1))
}
