//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use iccp_utils::bytes::{BytesExt, BytesMutExt};
use iccp_utils::MacAddr;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::message::{Message, MessageDecodeInfo, MessageKind, MessageType};
use crate::packet::messages::{NeighFlags, TableOp};
use crate::packet::tlv::{self, TlvDecodeInfo, TlvKind, TlvType};
use crate::packet::DecodeCxt;

//
// ARP information message.
//
// Batch of IPv4 neighbor entry updates, one TLV per entry.
//
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct ArpInfoMsg {
    pub msg_id: u32,
    pub entries: Vec<TlvArpEntry>,
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct TlvArpEntry {
    pub op: TableOp,
    pub vlan_id: u16,
    pub ipv4_addr: Ipv4Addr,
    pub mac: MacAddr,
    pub flags: NeighFlags,
    pub ifname: String,
}

// ===== impl ArpInfoMsg =====

impl MessageKind for ArpInfoMsg {
    const U_BIT: bool = false;

    fn msg_id(&self) -> u32 {
        self.msg_id
    }

    fn msg_type(&self) -> MessageType {
        MessageType::ArpInfo
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        for entry in &self.entries {
            entry.encode(buf);
        }
    }

    fn decode_body(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        msgi: &mut MessageDecodeInfo,
    ) -> DecodeResult<Message> {
        let mut entries = Vec::new();

        // Decode ARP entry TLVs, skipping unrecognized types.
        while msgi.msg_rlen >= tlv::TLV_HDR_SIZE {
            let tlvi = tlv::decode_tlv_hdr(buf, msgi)?;
            match tlvi.tlv_etype {
                Some(TlvType::ArpEntry) => {
                    entries.push(TlvArpEntry::decode_value(buf, cxt, &tlvi)?);
                }
                _ => buf.advance(tlvi.tlv_len as usize),
            }
        }

        if entries.is_empty() {
            return Err(DecodeError::MissingMsgTlv(TlvType::ArpEntry));
        }

        Ok(Message::ArpInfo(ArpInfoMsg {
            msg_id: msgi.msg_id,
            entries,
        }))
    }
}

// ===== impl TlvArpEntry =====

impl TlvKind for TlvArpEntry {
    const TLV_TYPE: TlvType = TlvType::ArpEntry;

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u8(self.op as u8);
        buf.put_u16(self.vlan_id);
        buf.put_ipv4(&self.ipv4_addr);
        buf.put_mac(&self.mac);
        buf.put_u8(self.flags.bits());
        tlv::encode_ifname(buf, &self.ifname);
    }

    fn decode_value(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
        tlvi: &TlvDecodeInfo,
    ) -> DecodeResult<Self> {
        if tlvi.tlv_len < 15 {
            return Err(DecodeError::InvalidTlvLength(tlvi.tlv_len));
        }

        let op = TableOp::from_u8(buf.try_get_u8()?)
            .ok_or(DecodeError::InvalidTlvValue(TlvType::ArpEntry))?;
        let vlan_id = buf.try_get_u16()?;
        let ipv4_addr = buf.try_get_ipv4()?;
        let mac = buf.try_get_mac()?;
        let flags = NeighFlags::from_bits_truncate(buf.try_get_u8()?);
        let ifname = tlv::decode_ifname(buf)?;

        Ok(TlvArpEntry {
            op,
            vlan_id,
            ipv4_addr,
            mac,
            flags,
            ifname,
        })
    }
}
