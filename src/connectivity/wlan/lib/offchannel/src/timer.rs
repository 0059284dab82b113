// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::{collections::HashMap, sync::Arc, time::Duration};

#[derive(PartialEq, Eq, Hash, Debug, Copy, Clone, PartialOrd, Ord)]
pub struct EventId(pub u64);

/// A scheduler to schedule and cancel timeouts. When a scheduled event fires, the platform
/// reports it back through `OffChannelManager::handle_timeout` with the id returned here.
pub trait Scheduler: Send + Sync {
    /// Requests to schedule an event. Returns a unique ID used to cancel the scheduled event.
    fn schedule(&self, delay: Duration) -> EventId;
    /// Cancels a previously scheduled event.
    fn cancel(&self, id: EventId);
}

/// A timer to schedule and cancel timeouts and retrieve triggered events.
pub struct Timer<E> {
    events: HashMap<EventId, E>,
    scheduler: Arc<dyn Scheduler>,
}

impl<E> Timer<E> {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self { events: HashMap::default(), scheduler }
    }

    /// Returns the event attached to `event_id` and forgets it. An event triggers at most once,
    /// and never after it was canceled.
    pub fn triggered(&mut self, event_id: &EventId) -> Option<E> {
        self.events.remove(event_id)
    }

    pub fn schedule_after(&mut self, delay: Duration, event: E) -> EventId {
        let event_id = self.scheduler.schedule(delay);
        self.events.insert(event_id, event);
        event_id
    }

    pub fn cancel_event(&mut self, event_id: EventId) {
        if self.events.remove(&event_id).is_some() {
            self.scheduler.cancel(event_id);
        }
    }

    pub fn cancel_all(&mut self) {
        for event_id in self.events.keys() {
            self.scheduler.cancel(*event_id);
        }
        self.events.clear();
    }

    pub fn is_scheduled(&self, event_id: &EventId) -> bool {
        self.events.contains_key(event_id)
    }

    pub fn pending(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::test_utils::FakeScheduler};

    #[test]
    fn schedule_cancel_event() {
        #[derive(PartialEq, Eq, Debug, Hash)]
        struct FooEvent(u8);

        let scheduler = Arc::new(FakeScheduler::new());
        let delay = Duration::from_millis(5);

        // Verify event triggers no more than once.
        let mut timer = Timer::<FooEvent>::new(scheduler.clone());
        let event_id = timer.schedule_after(delay, FooEvent(8));
        assert_eq!(timer.triggered(&event_id), Some(FooEvent(8)));
        assert_eq!(timer.triggered(&event_id), None);

        // Verify event does not trigger if it was canceled.
        let event_id = timer.schedule_after(delay, FooEvent(9));
        timer.cancel_event(event_id);
        assert_eq!(timer.triggered(&event_id), None);
        assert!(!scheduler.is_scheduled(event_id));

        // Verify multiple events can be scheduled and canceled.
        let event_id_1 = timer.schedule_after(delay, FooEvent(8));
        let event_id_2 = timer.schedule_after(delay, FooEvent(9));
        let event_id_3 = timer.schedule_after(delay, FooEvent(10));
        timer.cancel_event(event_id_2);
        assert_eq!(timer.triggered(&event_id_2), None);
        assert_eq!(timer.triggered(&event_id_3), Some(FooEvent(10)));
        assert_eq!(timer.triggered(&event_id_1), Some(FooEvent(8)));
    }

    #[test]
    fn cancel_triggered_event_does_not_reach_scheduler() {
        let scheduler = Arc::new(FakeScheduler::new());
        let mut timer = Timer::<u8>::new(scheduler.clone());
        let event_id = timer.schedule_after(Duration::ZERO, 1);
        assert_eq!(timer.triggered(&event_id), Some(1));
        timer.cancel_event(event_id);
        assert_eq!(scheduler.cancel_count(), 0);
    }

    #[test]
    fn cancel_all() {
        let scheduler = Arc::new(FakeScheduler::new());
        let mut timer = Timer::<_>::new(scheduler.clone());
        let delay = Duration::from_millis(5);

        let event_id_1 = timer.schedule_after(delay, 8);
        let event_id_2 = timer.schedule_after(delay, 9);
        let event_id_3 = timer.schedule_after(delay, 10);
        assert_eq!(timer.pending(), 3);
        timer.cancel_all();
        assert_eq!(timer.triggered(&event_id_1), None);
        assert_eq!(timer.triggered(&event_id_2), None);
        assert_eq!(timer.triggered(&event_id_3), None);
        assert_eq!(scheduler.cancel_count(), 3);
        assert_eq!(timer.pending(), 0);
    }
}
