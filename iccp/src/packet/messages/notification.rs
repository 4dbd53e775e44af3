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
// Notification (NAK) message.
//
// Sent in response to a message the receiver couldn't process, carrying the
// rejected message's ID and type so the sender can correlate it against its
// message log.
//
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct NakMsg {
    pub msg_id: u32,
    pub status: TlvStatus,
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct TlvStatus {
    pub status: StatusCode,
    pub rej_msg_id: u32,
    pub rej_msg_type: u16,
}

// NAK status codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum StatusCode {
    MalformedMessage,
    UnknownMessage,
    UnknownTlv,
    InternalError,
    Unknown(u16),
}

// ===== impl NakMsg =====

impl NakMsg {
    // Message type the NAK refers to, when it's one we know about.
    pub fn rejected_type(&self) -> Option<MessageType> {
        MessageType::decode(self.status.rej_msg_type)
    }
}

impl MessageKind for NakMsg {
    const U_BIT: bool = false;

    fn msg_id(&self) -> u32 {
        self.msg_id
    }

    fn msg_type(&self) -> MessageType {
        MessageType::Notification
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        self.status.encode(buf);
    }

    fn decode_body(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        msgi: &mut MessageDecodeInfo,
    ) -> DecodeResult<Message> {
        // Decode mandatory status TLV.
        if msgi.msg_rlen < tlv::TLV_HDR_SIZE {
            return Err(DecodeError::MissingMsgTlv(TlvType::Status));
        }
        let tlvi = tlv::decode_tlv_hdr(buf, msgi)?;
        if tlvi.tlv_etype != Some(TlvType::Status) {
            return Err(DecodeError::MissingMsgTlv(TlvType::Status));
        }
        let status = TlvStatus::decode_value(buf, cxt, &tlvi)?;

        let mut msg = NakMsg {
            msg_id: msgi.msg_id,
            status,
        };

        // Decode optional TLVs.
        msg.decode_opt_tlvs(buf, cxt, msgi)?;

        Ok(Message::Nak(msg))
    }
}

// ===== impl TlvStatus =====

impl TlvKind for TlvStatus {
    const TLV_TYPE: TlvType = TlvType::Status;

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u16(self.status.encode());
        buf.put_u32(self.rej_msg_id);
        buf.put_u16(self.rej_msg_type);
    }

    fn decode_value(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
        tlvi: &TlvDecodeInfo,
    ) -> DecodeResult<Self> {
        if tlvi.tlv_len != 8 {
            return Err(DecodeError::InvalidTlvLength(tlvi.tlv_len));
        }

        let status = StatusCode::decode(buf.try_get_u16()?);
        let rej_msg_id = buf.try_get_u32()?;
        let rej_msg_type = buf.try_get_u16()?;

        Ok(TlvStatus {
            status,
            rej_msg_id,
            rej_msg_type,
        })
    }
}

// ===== impl StatusCode =====

impl StatusCode {
    pub(crate) fn encode(&self) -> u16 {
        match self {
            StatusCode::MalformedMessage => 1,
            StatusCode::UnknownMessage => 2,
            StatusCode::UnknownTlv => 3,
            StatusCode::InternalError => 4,
            StatusCode::Unknown(value) => *value,
        }
    }

    pub(crate) fn decode(value: u16) -> Self {
        match value {
            1 => StatusCode::MalformedMessage,
            2 => StatusCode::UnknownMessage,
            3 => StatusCode::UnknownTlv,
            4 => StatusCode::InternalError,
            _ => StatusCode::Unknown(value),
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusCode::MalformedMessage => write!(f, "malformed message"),
            StatusCode::UnknownMessage => write!(f, "unknown message type"),
            StatusCode::UnknownTlv => write!(f, "unknown TLV type"),
            StatusCode::InternalError => write!(f, "internal error"),
            StatusCode::Unknown(value) => {
                write!(f, "unknown status code ({value})")
            }
        }
    }
}
