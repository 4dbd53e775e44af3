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
// Heartbeat message.
//
// Sent periodically once the session is established so each side can detect
// a dead peer without waiting for a TCP timeout.
//
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct HeartbeatMsg {
    pub msg_id: u32,
    pub heartbeat: TlvHeartbeat,
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct TlvHeartbeat {
    pub node_id: u8,
}

// ===== impl HeartbeatMsg =====

impl MessageKind for HeartbeatMsg {
    const U_BIT: bool = false;

    fn msg_id(&self) -> u32 {
        self.msg_id
    }

    fn msg_type(&self) -> MessageType {
        MessageType::Heartbeat
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        self.heartbeat.encode(buf);
    }

    fn decode_body(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        msgi: &mut MessageDecodeInfo,
    ) -> DecodeResult<Message> {
        // Decode mandatory heartbeat TLV.
        if msgi.msg_rlen < tlv::TLV_HDR_SIZE {
            return Err(DecodeError::MissingMsgTlv(TlvType::Heartbeat));
        }
        let tlvi = tlv::decode_tlv_hdr(buf, msgi)?;
        if tlvi.tlv_etype != Some(TlvType::Heartbeat) {
            return Err(DecodeError::MissingMsgTlv(TlvType::Heartbeat));
        }
        let heartbeat = TlvHeartbeat::decode_value(buf, cxt, &tlvi)?;

        let mut msg = HeartbeatMsg {
            msg_id: msgi.msg_id,
            heartbeat,
        };

        // Decode optional TLVs.
        msg.decode_opt_tlvs(buf, cxt, msgi)?;

        Ok(Message::Heartbeat(msg))
    }
}

// ===== impl TlvHeartbeat =====

impl TlvKind for TlvHeartbeat {
    const TLV_TYPE: TlvType = TlvType::Heartbeat;

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u8(self.node_id);
    }

    fn decode_value(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
        tlvi: &TlvDecodeInfo,
    ) -> DecodeResult<Self> {
        if tlvi.tlv_len != 1 {
            return Err(DecodeError::InvalidTlvLength(tlvi.tlv_len));
        }

        let node_id = buf.try_get_u8()?;

        Ok(TlvHeartbeat { node_id })
    }
}
