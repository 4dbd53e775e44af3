//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use iccp_utils::bytes::{BytesExt, BytesMutExt};
use iccp_utils::MacAddr;
use serde::{Deserialize, Serialize};

use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::message::{Message, MessageDecodeInfo, MessageKind, MessageType};
use crate::packet::tlv::{self, TlvDecodeInfo, TlvKind, TlvType};
use crate::packet::DecodeCxt;

//
// System configuration message.
//
// First message exchanged after the session comes up. Carries the chassis
// identity used for role election and duplicate node-id detection.
//
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct SysConfigMsg {
    pub msg_id: u32,
    pub sys_config: TlvSysConfig,
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct TlvSysConfig {
    pub sys_mac: MacAddr,
    pub node_id: u8,
}

// ===== impl SysConfigMsg =====

impl MessageKind for SysConfigMsg {
    const U_BIT: bool = false;

    fn msg_id(&self) -> u32 {
        self.msg_id
    }

    fn msg_type(&self) -> MessageType {
        MessageType::SysConfig
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        self.sys_config.encode(buf);
    }

    fn decode_body(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        msgi: &mut MessageDecodeInfo,
    ) -> DecodeResult<Message> {
        // Decode mandatory system configuration TLV.
        if msgi.msg_rlen < tlv::TLV_HDR_SIZE {
            return Err(DecodeError::MissingMsgTlv(TlvType::SysConfig));
        }
        let tlvi = tlv::decode_tlv_hdr(buf, msgi)?;
        if tlvi.tlv_etype != Some(TlvType::SysConfig) {
            return Err(DecodeError::MissingMsgTlv(TlvType::SysConfig));
        }
        let sys_config = TlvSysConfig::decode_value(buf, cxt, &tlvi)?;

        let mut msg = SysConfigMsg {
            msg_id: msgi.msg_id,
            sys_config,
        };

        // Decode optional TLVs.
        msg.decode_opt_tlvs(buf, cxt, msgi)?;

        Ok(Message::SysConfig(msg))
    }
}

// ===== impl TlvSysConfig =====

impl TlvKind for TlvSysConfig {
    const TLV_TYPE: TlvType = TlvType::SysConfig;

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_mac(&self.sys_mac);
        buf.put_u8(self.node_id);
    }

    fn decode_value(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
        tlvi: &TlvDecodeInfo,
    ) -> DecodeResult<Self> {
        if tlvi.tlv_len != 7 {
            return Err(DecodeError::InvalidTlvLength(tlvi.tlv_len));
        }

        let sys_mac = buf.try_get_mac()?;
        let node_id = buf.try_get_u8()?;

        // The all-zeroes system MAC is reserved.
        if sys_mac.is_unspecified() {
            return Err(DecodeError::InvalidTlvValue(TlvType::SysConfig));
        }

        Ok(TlvSysConfig { sys_mac, node_id })
    }
}
