//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use iccp_utils::bytes::BytesExt;
use serde::{Deserialize, Serialize};

use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::message::{Message, MessageDecodeInfo, MessageKind, MessageType};
use crate::packet::tlv::{self, TlvDecodeInfo, TlvKind, TlvType};
use crate::packet::DecodeCxt;

//
// Warmboot message.
//
// Announces a planned restart so the peer freezes aging of the sender's
// table entries instead of flushing them when the session drops.
//
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct WarmbootMsg {
    pub msg_id: u32,
    pub warmboot: TlvWarmboot,
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct TlvWarmboot {
    pub restarting: bool,
}

// ===== impl WarmbootMsg =====

impl MessageKind for WarmbootMsg {
    const U_BIT: bool = true;

    fn msg_id(&self) -> u32 {
        self.msg_id
    }

    fn msg_type(&self) -> MessageType {
        MessageType::Warmboot
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        self.warmboot.encode(buf);
    }

    fn decode_body(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        msgi: &mut MessageDecodeInfo,
    ) -> DecodeResult<Message> {
        // Decode mandatory warmboot TLV.
        if msgi.msg_rlen < tlv::TLV_HDR_SIZE {
            return Err(DecodeError::MissingMsgTlv(TlvType::Warmboot));
        }
        let tlvi = tlv::decode_tlv_hdr(buf, msgi)?;
        if tlvi.tlv_etype != Some(TlvType::Warmboot) {
            return Err(DecodeError::MissingMsgTlv(TlvType::Warmboot));
        }
        let warmboot = TlvWarmboot::decode_value(buf, cxt, &tlvi)?;

        let mut msg = WarmbootMsg {
            msg_id: msgi.msg_id,
            warmboot,
        };

        // Decode optional TLVs.
        msg.decode_opt_tlvs(buf, cxt, msgi)?;

        Ok(Message::Warmboot(msg))
    }
}

// ===== impl TlvWarmboot =====

impl TlvKind for TlvWarmboot {
    const TLV_TYPE: TlvType = TlvType::Warmboot;

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u8(self.restarting as u8);
    }

    fn decode_value(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
        tlvi: &TlvDecodeInfo,
    ) -> DecodeResult<Self> {
        if tlvi.tlv_len != 1 {
            return Err(DecodeError::InvalidTlvLength(tlvi.tlv_len));
        }

        let restarting = buf.try_get_u8()? != 0;

        Ok(TlvWarmboot { restarting })
    }
}
