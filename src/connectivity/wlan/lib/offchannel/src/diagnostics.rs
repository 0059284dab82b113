// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{iface::Role, IfaceId},
    log::{debug, info},
    wlan_common::{
        mac::{
            MGMT_SUBTYPE_ACTION, MGMT_SUBTYPE_AUTH, MGMT_SUBTYPE_DEAUTH, MGMT_SUBTYPE_DISASSOC,
            MGMT_SUBTYPE_PROBE_REQ, MGMT_SUBTYPE_PROBE_RESP,
        },
        p2p::{ActionKind, PublicActionSubtype},
    },
};

/// Progress of P2P group formation as observed through the frames exchanged for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    GoNegotiation,
    GoNegCompleted,
    Invitation,
    ClientConnecting,
    GoStarting,
    Connected,
}

pub fn subtype_name(subtype: u16) -> &'static str {
    match subtype {
        MGMT_SUBTYPE_PROBE_REQ => "Probe Request",
        MGMT_SUBTYPE_PROBE_RESP => "Probe Response",
        MGMT_SUBTYPE_AUTH => "Authentication",
        MGMT_SUBTYPE_DEAUTH => "Deauthentication",
        MGMT_SUBTYPE_DISASSOC => "Disassociation",
        MGMT_SUBTYPE_ACTION => "Action",
        _ => "Management",
    }
}

/// Per-device record of the P2P negotiation in flight. Purely informational; nothing in the
/// off-channel machinery depends on it.
#[derive(Debug)]
pub struct Diagnostics {
    status: ConnectionStatus,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self { status: ConnectionStatus::Idle }
    }
}

impl Diagnostics {
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn on_tx(&mut self, iface: IfaceId, subtype: u16, action: Option<ActionKind>) {
        match action {
            Some(kind) => info!("iface {} TX {}", iface, kind),
            None => debug!("iface {} TX {}", iface, subtype_name(subtype)),
        }
        if let Some(subtype) = action.and_then(|a| a.p2p_public()) {
            self.observe(subtype, false);
        }
    }

    pub fn on_tx_status(&mut self, iface: IfaceId, action: Option<ActionKind>, ack: bool) {
        if let Some(kind) = action {
            info!("iface {} TX {} {}", iface, kind, if ack { "acked" } else { "failed" });
        }
        let confirmation = Some(PublicActionSubtype::GoNegotiationConfirmation);
        if ack && action.and_then(|a| a.p2p_public()) == confirmation {
            self.set(ConnectionStatus::GoNegCompleted);
        }
    }

    pub fn on_rx(&mut self, iface: IfaceId, action: Option<ActionKind>) {
        if let Some(kind) = action {
            info!("iface {} RX {}", iface, kind);
        }
        if let Some(subtype) = action.and_then(|a| a.p2p_public()) {
            self.observe(subtype, true);
        }
    }

    pub fn on_role_started(&mut self, iface: IfaceId, role: Role) {
        let next = match (self.status, role) {
            (ConnectionStatus::GoNegCompleted | ConnectionStatus::Invitation, Role::P2pClient) => {
                ConnectionStatus::ClientConnecting
            }
            (ConnectionStatus::GoNegCompleted | ConnectionStatus::Invitation, Role::P2pGo) => {
                ConnectionStatus::GoStarting
            }
            _ => return,
        };
        debug!("iface {} started as {:?}", iface, role);
        self.set(next);
    }

    pub fn on_connected(&mut self, iface: IfaceId) {
        if matches!(self.status, ConnectionStatus::ClientConnecting | ConnectionStatus::GoStarting)
        {
            debug!("iface {} connected", iface);
            self.set(ConnectionStatus::Connected);
        }
    }

    pub fn reset(&mut self) {
        self.set(ConnectionStatus::Idle);
    }

    fn observe(&mut self, subtype: PublicActionSubtype, received: bool) {
        use PublicActionSubtype::*;
        match subtype {
            GoNegotiationRequest | GoNegotiationResponse => {
                self.set(ConnectionStatus::GoNegotiation)
            }
            // Our own confirmation only counts once acknowledged.
            GoNegotiationConfirmation if received => self.set(ConnectionStatus::GoNegCompleted),
            InvitationRequest | InvitationResponse => self.set(ConnectionStatus::Invitation),
            _ => {}
        }
    }

    fn set(&mut self, status: ConnectionStatus) {
        if self.status != status {
            info!("p2p connection status {:?} -> {:?}", self.status, status);
            self.status = status;
        }
    }
}
