// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Classification of the action frames exchanged by P2P and TDLS peers while negotiating.
//! Only the fixed fields needed to tell frames apart are parsed; attributes are left to the
//! supplicant.

use {
    crate::mac::{MgmtFrame, MGMT_SUBTYPE_ACTION},
    num_derive::FromPrimitive,
    num_traits::FromPrimitive,
    std::fmt,
};

// IEEE Std 802.11-2016, 9.4.1.11, Table 9-47
pub const ACTION_CATEGORY_PUBLIC: u8 = 4;
pub const ACTION_CATEGORY_VENDOR_SPECIFIC: u8 = 127;

// IEEE Std 802.11-2016, 9.6.8.1, Table 9-307
pub const PUBLIC_ACTION_VENDOR_SPECIFIC: u8 = 9;
pub const PUBLIC_ACTION_TDLS_DISCOVERY_RESP: u8 = 14;

// Wi-Fi P2P Technical Specification v1.7, 4.2.8 and 4.2.9
pub const WFA_OUI: [u8; 3] = [0x50, 0x6F, 0x9A];
pub const P2P_OUI_TYPE: u8 = 9;

// Offsets of the P2P subtype inside the action frame body.
const P2P_PUBLIC_SUBTYPE_OFFSET: usize = 6;
const P2P_ACTION_SUBTYPE_OFFSET: usize = 5;

/// Wi-Fi P2P Technical Specification v1.7, Table 61
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum PublicActionSubtype {
    GoNegotiationRequest = 0,
    GoNegotiationResponse = 1,
    GoNegotiationConfirmation = 2,
    InvitationRequest = 3,
    InvitationResponse = 4,
    DeviceDiscoverabilityRequest = 5,
    DeviceDiscoverabilityResponse = 6,
    ProvisionDiscoveryRequest = 7,
    ProvisionDiscoveryResponse = 8,
}

impl PublicActionSubtype {
    /// The frame the peer is expected to send back, if any.
    pub fn expected_reply(&self) -> Option<Self> {
        match self {
            Self::GoNegotiationRequest => Some(Self::GoNegotiationResponse),
            Self::GoNegotiationResponse => Some(Self::GoNegotiationConfirmation),
            Self::InvitationRequest => Some(Self::InvitationResponse),
            Self::DeviceDiscoverabilityRequest => Some(Self::DeviceDiscoverabilityResponse),
            Self::ProvisionDiscoveryRequest => Some(Self::ProvisionDiscoveryResponse),
            _ => None,
        }
    }

    pub fn is_request(&self) -> bool {
        match self {
            Self::GoNegotiationRequest
            | Self::InvitationRequest
            | Self::DeviceDiscoverabilityRequest
            | Self::ProvisionDiscoveryRequest => true,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GoNegotiationRequest => "GO Negotiation Request",
            Self::GoNegotiationResponse => "GO Negotiation Response",
            Self::GoNegotiationConfirmation => "GO Negotiation Confirmation",
            Self::InvitationRequest => "P2P Invitation Request",
            Self::InvitationResponse => "P2P Invitation Response",
            Self::DeviceDiscoverabilityRequest => "Device Discoverability Request",
            Self::DeviceDiscoverabilityResponse => "Device Discoverability Response",
            Self::ProvisionDiscoveryRequest => "Provision Discovery Request",
            Self::ProvisionDiscoveryResponse => "Provision Discovery Response",
        }
    }
}

/// Wi-Fi P2P Technical Specification v1.7, Table 75
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum P2pActionSubtype {
    NoticeOfAbsence = 0,
    PresenceRequest = 1,
    PresenceResponse = 2,
    GoDiscoverabilityRequest = 3,
}

impl P2pActionSubtype {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoticeOfAbsence => "Notice of Absence",
            Self::PresenceRequest => "Presence Request",
            Self::PresenceResponse => "Presence Response",
            Self::GoDiscoverabilityRequest => "GO Discoverability Request",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    P2pPublic(PublicActionSubtype),
    P2p(P2pActionSubtype),
    TdlsDiscoveryResponse,
    Other { category: u8 },
}

impl ActionKind {
    /// Classifies the body of an action frame. Returns None for an empty body.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        let category = *body.first()?;
        let kind = match category {
            ACTION_CATEGORY_PUBLIC => match body.get(1) {
                Some(&PUBLIC_ACTION_VENDOR_SPECIFIC) if is_p2p_ie_header(&body[2..]) => body
                    .get(P2P_PUBLIC_SUBTYPE_OFFSET)
                    .and_then(|subtype| PublicActionSubtype::from_u8(*subtype))
                    .map(Self::P2pPublic),
                Some(&PUBLIC_ACTION_TDLS_DISCOVERY_RESP) => Some(Self::TdlsDiscoveryResponse),
                _ => None,
            },
            ACTION_CATEGORY_VENDOR_SPECIFIC if is_p2p_ie_header(&body[1..]) => body
                .get(P2P_ACTION_SUBTYPE_OFFSET)
                .and_then(|subtype| P2pActionSubtype::from_u8(*subtype))
                .map(Self::P2p),
            _ => None,
        };
        Some(kind.unwrap_or(Self::Other { category }))
    }

    /// Classifies a full management frame. Returns None if the frame is not an action frame.
    pub fn from_frame(bytes: &[u8]) -> Option<Self> {
        let frame = MgmtFrame::parse(bytes)?;
        if frame.subtype() != MGMT_SUBTYPE_ACTION {
            return None;
        }
        Self::from_body(frame.body)
    }

    pub fn p2p_public(&self) -> Option<PublicActionSubtype> {
        match self {
            Self::P2pPublic(subtype) => Some(*subtype),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::P2pPublic(subtype) => write!(f, "{}", subtype.name()),
            Self::P2p(subtype) => write!(f, "{}", subtype.name()),
            Self::TdlsDiscoveryResponse => write!(f, "TDLS Discovery Response"),
            Self::Other { category } => write!(f, "action (category {})", category),
        }
    }
}

fn is_p2p_ie_header(bytes: &[u8]) -> bool {
    bytes.len() > WFA_OUI.len() && bytes[..3] == WFA_OUI && bytes[3] == P2P_OUI_TYPE
}

/// Frame builders for tests of crates that consume these frames.
pub mod test_utils {
    use {
        super::*,
        crate::mac::{FrameControl, MacAddr, MgmtHdr, FRAME_TYPE_MGMT},
        zerocopy::AsBytes,
    };

    pub fn p2p_public_action_body(subtype: PublicActionSubtype, dialog_token: u8) -> Vec<u8> {
        let mut body = vec![ACTION_CATEGORY_PUBLIC, PUBLIC_ACTION_VENDOR_SPECIFIC];
        body.extend_from_slice(&WFA_OUI);
        body.extend_from_slice(&[P2P_OUI_TYPE, subtype as u8, dialog_token]);
        body
    }

    pub fn action_frame(src: MacAddr, body: &[u8]) -> Vec<u8> {
        let fc = FrameControl::new(FRAME_TYPE_MGMT, MGMT_SUBTYPE_ACTION);
        let mut bytes = MgmtHdr::new(fc, [0xaa; 6], src, [0xaa; 6]).as_bytes().to_vec();
        bytes.extend_from_slice(body);
        bytes
    }
}
