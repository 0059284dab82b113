// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::time::Duration;

/// Timing and sizing knobs of the off-channel machinery. The defaults follow the deadlines that
/// P2P peers enforce during GO negotiation and provision discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// How long a transmit or cancel waits for the radio to report that it reached the channel.
    pub ready_wait: Duration,
    /// How long a cancel waits for the radio to confirm the reservation ended.
    pub cancel_wait: Duration,
    /// How long programming or clearing a random MAC filter may take.
    pub random_mac_wait: Duration,
    /// Dwell time of an off-channel transmit when user space did not ask for one.
    pub default_tx_wait: Duration,
    /// Multiplier applied to requested dwell times while a P2P GO runs on the device.
    pub go_present_multiplier: u32,
    /// Multiplier applied to requested dwell times otherwise.
    pub go_absent_multiplier: u32,
    /// Extra dwell granted when a frame that expects a reply goes out or comes in.
    pub response_grace: Duration,
    /// Extra dwell granted when only an acknowledgement is still expected.
    pub ack_grace: Duration,
    /// Slack added to every expiry timer.
    pub expiry_slack: Duration,
    /// Attempts made by interface teardown before forcing the active reservation down.
    pub cleanup_retries: u32,
    pub cleanup_sleep: Duration,
    pub queue_capacity: usize,
    pub random_mac_slots: usize,
    /// Hold a frame received before the reservation is ready and deliver it once it is.
    pub buffer_rx_before_ready: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ready_wait: Duration::from_millis(3000),
            cancel_wait: Duration::from_millis(1000),
            random_mac_wait: Duration::from_millis(100),
            default_tx_wait: Duration::from_millis(200),
            go_present_multiplier: 5,
            go_absent_multiplier: 2,
            response_grace: Duration::from_millis(500),
            ack_grace: Duration::from_millis(300),
            expiry_slack: Duration::from_millis(10),
            cleanup_retries: 4,
            cleanup_sleep: Duration::from_millis(500),
            queue_capacity: 16,
            random_mac_slots: 16,
            buffer_rx_before_ready: true,
        }
    }
}

impl Config {
    /// Dwell time handed to the radio for a requested `duration`.
    pub fn scaled_duration(&self, duration: Duration, go_present: bool) -> Duration {
        let multiplier =
            if go_present { self.go_present_multiplier } else { self.go_absent_multiplier };
        duration * multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_waits_are_bounded() {
        let cfg = Config::default();
        for wait in [cfg.ready_wait, cfg.cancel_wait, cfg.response_grace] {
            assert!(wait >= Duration::from_millis(500) && wait <= Duration::from_secs(10));
        }
        assert!(cfg.go_present_multiplier > cfg.go_absent_multiplier);
    }

    #[test]
    fn scaled_duration() {
        let cfg = Config::default();
        let base = Duration::from_millis(200);
        assert_eq!(cfg.scaled_duration(base, false), Duration::from_millis(400));
        assert_eq!(cfg.scaled_duration(base, true), Duration::from_millis(1000));
    }
}
