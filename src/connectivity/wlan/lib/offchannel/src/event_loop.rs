// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{device::RadioEvent, manager::OffChannelManager, timer::EventId},
    anyhow::{bail, Error},
    futures::{channel::mpsc, StreamExt},
    log::{error, info},
    std::sync::Arc,
};

pub enum DriverEvent {
    // Indicates that the device is going away and the loop should exit.
    Stop,
    // An asynchronous report of the radio.
    Radio(RadioEvent),
    // A timeout scheduled through the manager's `Scheduler` fired.
    Timeout(EventId),
}

/// Hands driver callbacks to the event loop. Clones may be given to any thread, including the
/// ones the radio reports from.
#[derive(Clone)]
pub struct DriverEventSink(pub mpsc::UnboundedSender<DriverEvent>);

impl DriverEventSink {
    pub fn send(&self, event: DriverEvent) {
        if let Err(e) = self.0.unbounded_send(event) {
            error!("driver event dropped, event loop is gone: {}", e);
        }
    }
}

/// Feeds driver events to `manager` one at a time. Does not return until `DriverEvent::Stop` is
/// received, unless every sender went away first.
pub async fn serve(
    manager: Arc<OffChannelManager>,
    mut driver_event_stream: mpsc::UnboundedReceiver<DriverEvent>,
) -> Result<(), Error> {
    loop {
        match driver_event_stream.next().await {
            Some(DriverEvent::Stop) => {
                info!("off-channel event loop stopped");
                return Ok(());
            }
            Some(DriverEvent::Radio(event)) => manager.handle_radio_event(event),
            Some(DriverEvent::Timeout(id)) => manager.handle_timeout(id),
            None => bail!("Driver event stream terminated unexpectedly."),
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{device::Notification, iface::Role, test_utils::*},
        futures::executor::block_on,
        std::time::Duration,
        wlan_common::{assert_variant, channel::Channel},
    };

    fn run(h: &TestHarness, events: Vec<DriverEvent>) {
        let (sender, receiver) = mpsc::unbounded();
        let sink = DriverEventSink(sender);
        for event in events {
            sink.send(event);
        }
        sink.send(DriverEvent::Stop);
        block_on(serve(h.mgr.clone(), receiver)).expect("serve");
    }

    #[test]
    fn serve_until_stop() {
        let mut h = TestHarness::new();
        h.attach(IFACE, Role::P2pDevice, None);
        let channel = Channel::new(6);
        let cookie =
            h.mgr.remain_on_channel(IFACE, channel, Duration::from_millis(100)).expect("roc");

        run(&h, vec![DriverEvent::Radio(RadioEvent::ReservationReady { iface: IFACE, cookie })]);
        let (timer, _) = h.scheduler.scheduled().first().copied().expect("expiry timer");
        h.scheduler.take(timer);

        run(&h, vec![DriverEvent::Timeout(timer)]);
        assert_variant!(h.next_radio_call(), RadioCall::Activate { .. });
        assert_variant!(h.next_radio_call(), RadioCall::Cancel { .. });

        run(
            &h,
            vec![DriverEvent::Radio(RadioEvent::ReservationComplete { iface: IFACE, cookie })],
        );
        assert!(!h.mgr.is_roc_in_progress());
        assert_eq!(
            h.notifications(),
            vec![
                Notification::ReservationReady {
                    iface: IFACE,
                    cookie,
                    channel,
                    duration: Duration::from_millis(100),
                },
                Notification::ReservationExpired { iface: IFACE, cookie, channel },
            ]
        );
    }

    #[test]
    fn serve_fails_when_senders_are_gone() {
        let h = TestHarness::new();
        let (sender, receiver) = mpsc::unbounded();
        drop(sender);
        assert!(block_on(serve(h.mgr.clone(), receiver)).is_err());
    }
}
