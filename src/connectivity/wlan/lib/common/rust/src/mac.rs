// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    byteorder::{ByteOrder, LittleEndian},
    zerocopy::{AsBytes, ByteSlice, FromBytes, LayoutVerified, Unaligned},
};

pub type MacAddr = [u8; 6];

// IEEE Std 802.11-2016, 9.2.4.1.3
// Frame types:
pub const FRAME_TYPE_MGMT: u16 = 0;
pub const FRAME_TYPE_DATA: u16 = 2;
// Management subtypes:
pub const MGMT_SUBTYPE_PROBE_REQ: u16 = 0x04;
pub const MGMT_SUBTYPE_PROBE_RESP: u16 = 0x05;
pub const MGMT_SUBTYPE_DISASSOC: u16 = 0x0A;
pub const MGMT_SUBTYPE_AUTH: u16 = 0x0B;
pub const MGMT_SUBTYPE_DEAUTH: u16 = 0x0C;
pub const MGMT_SUBTYPE_ACTION: u16 = 0x0D;

const HT_CONTROL_LEN: usize = 4;

// IEEE Std 802.11-2016, 9.2.4.1.1
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct FrameControl(pub u16);

impl FrameControl {
    pub fn new(frame_type: u16, frame_subtype: u16) -> Self {
        Self(((frame_type & 0b11) << 2) | ((frame_subtype & 0b1111) << 4))
    }

    pub fn frame_type(&self) -> u16 {
        (self.0 >> 2) & 0b11
    }

    pub fn frame_subtype(&self) -> u16 {
        (self.0 >> 4) & 0b1111
    }

    pub fn htc_order(&self) -> bool {
        self.bit(15)
    }

    pub fn set_htc_order(&mut self, value: bool) {
        if value {
            self.0 |= 1 << 15;
        } else {
            self.0 &= !(1 << 15);
        }
    }

    pub fn is_mgmt(&self) -> bool {
        self.frame_type() == FRAME_TYPE_MGMT
    }

    fn bit(&self, idx: u16) -> bool {
        self.0 & (1 << idx) != 0
    }
}

// IEEE Std 802.11-2016, 9.3.3.2
#[derive(FromBytes, AsBytes, Unaligned, PartialEq, Eq, Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct MgmtHdr {
    pub frame_ctrl: [u8; 2],
    pub duration: [u8; 2],
    pub addr1: MacAddr,
    pub addr2: MacAddr,
    pub addr3: MacAddr,
    pub seq_ctrl: [u8; 2],
}

impl MgmtHdr {
    /// Length in bytes of the fixed management header.
    pub const LEN: usize = std::mem::size_of::<MgmtHdr>();

    pub fn new(frame_ctrl: FrameControl, addr1: MacAddr, addr2: MacAddr, addr3: MacAddr) -> Self {
        let mut fc = [0u8; 2];
        LittleEndian::write_u16(&mut fc, frame_ctrl.0);
        Self { frame_ctrl: fc, duration: [0; 2], addr1, addr2, addr3, seq_ctrl: [0; 2] }
    }

    pub fn frame_ctrl(&self) -> FrameControl {
        FrameControl(LittleEndian::read_u16(&self.frame_ctrl))
    }
}

/// A parsed management frame. Only the fixed header is verified, the body is handed out as is.
pub struct MgmtFrame<B> {
    pub mgmt_hdr: LayoutVerified<B, MgmtHdr>,
    pub body: B,
}

impl<B: ByteSlice> MgmtFrame<B> {
    /// Returns None if `bytes` is too short to hold a management header or if the frame is not
    /// a management frame.
    pub fn parse(bytes: B) -> Option<Self> {
        let (mgmt_hdr, rest) = LayoutVerified::<B, MgmtHdr>::new_unaligned_from_prefix(bytes)?;
        let fc = mgmt_hdr.frame_ctrl();
        if !fc.is_mgmt() {
            return None;
        }
        let body = if fc.htc_order() {
            if rest.len() < HT_CONTROL_LEN {
                return None;
            }
            rest.split_at(HT_CONTROL_LEN).1
        } else {
            rest
        };
        Some(Self { mgmt_hdr, body })
    }

    pub fn frame_ctrl(&self) -> FrameControl {
        self.mgmt_hdr.frame_ctrl()
    }

    pub fn subtype(&self) -> u16 {
        self.frame_ctrl().frame_subtype()
    }

    pub fn transmitter_addr(&self) -> MacAddr {
        self.mgmt_hdr.addr2
    }
}

pub trait MacFmt {
    fn to_mac_str(&self) -> String;
}

impl MacFmt for MacAddr {
    fn to_mac_str(&self) -> String {
        format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self[0], self[1], self[2], self[3], self[4], self[5]
        )
    }
}
