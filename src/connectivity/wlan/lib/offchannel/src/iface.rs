// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{device::RadioPath, IfaceId},
    wlan_common::{
        channel::Channel,
        mac::{MacAddr, MGMT_SUBTYPE_DEAUTH, MGMT_SUBTYPE_DISASSOC, MGMT_SUBTYPE_PROBE_RESP},
    },
};

/// The operating role of an interface. It decides which firmware entity serves its off-channel
/// requests and which user space frames the firmware generates on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Station,
    P2pClient,
    P2pDevice,
    Ap,
    P2pGo,
    Monitor,
}

impl Role {
    /// None if the role cannot reserve the radio or transmit management frames.
    pub fn radio_path(&self) -> Option<RadioPath> {
        match self {
            Role::Station | Role::P2pClient | Role::P2pDevice => Some(RadioPath::Sme),
            Role::Ap | Role::P2pGo => Some(RadioPath::Sap),
            Role::Monitor => None,
        }
    }

    pub fn is_ap_like(&self) -> bool {
        matches!(self, Role::Ap | Role::P2pGo)
    }

    /// Authentication frames of these roles bypass the off-channel machinery and go out on the
    /// home channel.
    pub fn sends_auth_directly(&self) -> bool {
        matches!(self, Role::Station | Role::Ap)
    }

    /// The firmware answers probes and handles disassociation itself while beaconing, so user
    /// space copies of these frames are dropped.
    pub fn drops_user_frame(&self, subtype: u16) -> bool {
        self.is_ap_like()
            && matches!(
                subtype,
                MGMT_SUBTYPE_PROBE_RESP | MGMT_SUBTYPE_DISASSOC | MGMT_SUBTYPE_DEAUTH
            )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfaceInfo {
    pub id: IfaceId,
    pub role: Role,
    pub perm_addr: MacAddr,
    /// The channel the interface is associated or beaconing on, if any.
    pub operating_channel: Option<Channel>,
}
