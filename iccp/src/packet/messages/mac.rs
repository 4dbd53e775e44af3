//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use iccp_utils::bytes::{BytesExt, BytesMutExt};
use iccp_utils::MacAddr;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::message::{Message, MessageDecodeInfo, MessageKind, MessageType};
use crate::packet::messages::{MacType, TableOp};
use crate::packet::tlv::{self, TlvDecodeInfo, TlvKind, TlvType};
use crate::packet::DecodeCxt;

//
// MAC information message.
//
// Batch of FDB entry updates. Each entry is one TLV so a single message can
// carry a bulk snapshot or an incremental update.
//
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct MacInfoMsg {
    pub msg_id: u32,
    pub entries: Vec<TlvMacEntry>,
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct TlvMacEntry {
    pub op: TableOp,
    pub vlan_id: u16,
    pub mac: MacAddr,
    pub mac_type: MacType,
    pub ifname: String,
}

// ===== impl MacInfoMsg =====

impl MessageKind for MacInfoMsg {
    const U_BIT: bool = false;

    fn msg_id(&self) -> u32 {
        self.msg_id
    }

    fn msg_type(&self) -> MessageType {
        MessageType::MacInfo
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

        // Decode MAC entry TLVs, skipping unrecognized types.
        while msgi.msg_rlen >= tlv::TLV_HDR_SIZE {
            let tlvi = tlv::decode_tlv_hdr(buf, msgi)?;
            match tlvi.tlv_etype {
                Some(TlvType::MacEntry) => {
                    entries.push(TlvMacEntry::decode_value(buf, cxt, &tlvi)?);
                }
                _ => buf.advance(tlvi.tlv_len as usize),
            }
        }

        if entries.is_empty() {
            return Err(DecodeError::MissingMsgTlv(TlvType::MacEntry));
        }

        Ok(Message::MacInfo(MacInfoMsg {
            msg_id: msgi.msg_id,
            entries,
        }))
    }
}

// ===== impl TlvMacEntry =====

impl TlvKind for TlvMacEntry {
    const TLV_TYPE: TlvType = TlvType::MacEntry;

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u8(self.op as u8);
        buf.put_u16(self.vlan_id);
        buf.put_mac(&self.mac);
        buf.put_u8(self.mac_type as u8);
        tlv::encode_ifname(buf, &self.ifname);
    }

    fn decode_value(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
        tlvi: &TlvDecodeInfo,
    ) -> DecodeResult<Self> {
        if tlvi.tlv_len < 11 {
            return Err(DecodeError::InvalidTlvLength(tlvi.tlv_len));
        }

        let op = TableOp::from_u8(buf.try_get_u8()?)
            .ok_or(DecodeError::InvalidTlvValue(TlvType::MacEntry))?;
        let vlan_id = buf.try_get_u16()?;
        let mac = buf.try_get_mac()?;
        let mac_type = MacType::from_u8(buf.try_get_u8()?)
            .ok_or(DecodeError::InvalidTlvValue(TlvType::MacEntry))?;
        let ifname = tlv::decode_ifname(buf)?;

        Ok(TlvMacEntry {
            op,
            vlan_id,
            mac,
            mac_type,
            ifname,
        })
    }
}
