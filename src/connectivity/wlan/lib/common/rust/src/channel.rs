// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fmt;

const BASE_FREQ_2GHZ: u16 = 2407;
const BASE_FREQ_5GHZ: u16 = 5000;
const CHANNEL_14_FREQ: u16 = 2484;

/// A 20 MHz primary channel as seen by the off-channel machinery. Channel width is not relevant
/// to remain-on-channel since the radio always listens on the primary channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel {
    pub primary: u8,
}

impl Channel {
    pub const fn new(primary: u8) -> Self {
        Self { primary }
    }

    pub fn is_2ghz(&self) -> bool {
        self.primary >= 1 && self.primary <= 14
    }

    pub fn is_5ghz(&self) -> bool {
        self.primary >= 36 && self.primary <= 177
    }

    pub fn is_valid(&self) -> bool {
        self.is_2ghz() || self.is_5ghz()
    }

    /// Center frequency of the primary channel in MHz, or None if the channel number does not
    /// belong to a supported band.
    // IEEE Std 802.11-2016, 19.3.15.2 and 21.3.14
    pub fn center_freq_mhz(&self) -> Option<u16> {
        if self.primary == 14 {
            Some(CHANNEL_14_FREQ)
        } else if self.is_2ghz() {
            Some(BASE_FREQ_2GHZ + 5 * self.primary as u16)
        } else if self.is_5ghz() {
            Some(BASE_FREQ_5GHZ + 5 * self.primary as u16)
        } else {
            None
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.center_freq_mhz() {
            Some(freq) => write!(f, "{} ({} MHz)", self.primary, freq),
            None => write!(f, "{} (invalid)", self.primary),
        }
    }
}
