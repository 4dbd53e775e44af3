//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::{Buf, BufMut, Bytes, BytesMut};
use iccp_utils::bytes::BytesExt;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::messages::{
    AggConfigMsg, AggStateMsg, ArpInfoMsg, HeartbeatMsg, MacInfoMsg, NakMsg,
    NdiscInfoMsg, PeerLinkInfoMsg, PortChannelInfoMsg, SysConfigMsg,
    WarmbootMsg,
};
use crate::packet::tlv::{self, TlvDecodeInfo};
use crate::packet::DecodeCxt;

//
// ICCP message.
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |     U-bit     |         Message Type          |  Message
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//    Length       |                  Message ID
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//                 |                    TLVs ...                    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
// The message length covers the TLV payload only, not the fixed header.
// The U-bit tells the receiver to silently skip the message when it doesn't
// recognize the message type (instead of answering with a NAK).
//
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Message {
    Nak(NakMsg),
    Heartbeat(HeartbeatMsg),
    SysConfig(SysConfigMsg),
    AggConfig(AggConfigMsg),
    AggState(AggStateMsg),
    PeerLinkInfo(PeerLinkInfoMsg),
    PortChannelInfo(PortChannelInfoMsg),
    MacInfo(MacInfoMsg),
    ArpInfo(ArpInfoMsg),
    NdiscInfo(NdiscInfoMsg),
    Warmboot(WarmbootMsg),
}

// ICCP message types.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum MessageType {
    Notification = 0x0001,
    Heartbeat = 0x0010,
    SysConfig = 0x0020,
    AggConfig = 0x0021,
    AggState = 0x0022,
    PeerLinkInfo = 0x0023,
    PortChannelInfo = 0x0024,
    MacInfo = 0x0030,
    ArpInfo = 0x0031,
    NdiscInfo = 0x0032,
    Warmboot = 0x0040,
}

//
// Message decode information.
//
// Used as a control block during the decode process, and used to return
// detailed error information.
//
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MessageDecodeInfo {
    pub msg_u_bit: u8,
    pub msg_type: u16,
    pub msg_etype: Option<MessageType>,
    pub msg_len: u16,
    pub msg_rlen: u16,
    pub msg_id: u32,
}

pub trait MessageKind: std::fmt::Debug {
    const U_BIT: bool;

    fn msg_id(&self) -> u32;

    fn msg_type(&self) -> MessageType;

    fn encode_hdr(&self, buf: &mut BytesMut) {
        buf.put_u8(Self::U_BIT as u8);
        buf.put_u16(self.msg_type() as u16);
        // The message length will be rewritten later.
        buf.put_u16(0);
        buf.put_u32(self.msg_id());
    }

    fn encode_body(&self, buf: &mut BytesMut);

    fn decode_body(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        msgi: &mut MessageDecodeInfo,
    ) -> DecodeResult<Message>;

    // Decodes one known optional TLV. Returns true when the TLV type isn't
    // handled by this message, in which case it's skipped.
    fn decode_opt_tlv(
        &mut self,
        _buf: &mut Bytes,
        _cxt: &DecodeCxt,
        _tlvi: &TlvDecodeInfo,
    ) -> DecodeResult<bool> {
        Ok(true)
    }

    fn decode_opt_tlvs(
        &mut self,
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        msgi: &mut MessageDecodeInfo,
    ) -> DecodeResult<()> {
        while msgi.msg_rlen >= tlv::TLV_HDR_SIZE {
            let tlvi = tlv::decode_tlv_hdr(buf, msgi)?;

            // Decode TLV, skipping unrecognized types.
            let unknown = match tlvi.tlv_etype {
                Some(_) => self.decode_opt_tlv(buf, cxt, &tlvi)?,
                None => true,
            };
            if unknown {
                buf.advance(tlvi.tlv_len as usize);
            }
        }

        Ok(())
    }
}

// ===== impl Message =====

impl Message {
    pub const HDR_SIZE: u16 = 9;
    pub const DFLT_MAX_LEN: u16 = 4096;
    pub const MAX_SIZE: usize =
        u16::MAX as usize + Message::HDR_SIZE as usize;

    pub fn msg_id(&self) -> u32 {
        match self {
            Message::Nak(msg) => msg.msg_id(),
            Message::Heartbeat(msg) => msg.msg_id(),
            Message::SysConfig(msg) => msg.msg_id(),
            Message::AggConfig(msg) => msg.msg_id(),
            Message::AggState(msg) => msg.msg_id(),
            Message::PeerLinkInfo(msg) => msg.msg_id(),
            Message::PortChannelInfo(msg) => msg.msg_id(),
            Message::MacInfo(msg) => msg.msg_id(),
            Message::ArpInfo(msg) => msg.msg_id(),
            Message::NdiscInfo(msg) => msg.msg_id(),
            Message::Warmboot(msg) => msg.msg_id(),
        }
    }

    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::Nak(msg) => msg.msg_type(),
            Message::Heartbeat(msg) => msg.msg_type(),
            Message::SysConfig(msg) => msg.msg_type(),
            Message::AggConfig(msg) => msg.msg_type(),
            Message::AggState(msg) => msg.msg_type(),
            Message::PeerLinkInfo(msg) => msg.msg_type(),
            Message::PortChannelInfo(msg) => msg.msg_type(),
            Message::MacInfo(msg) => msg.msg_type(),
            Message::ArpInfo(msg) => msg.msg_type(),
            Message::NdiscInfo(msg) => msg.msg_type(),
            Message::Warmboot(msg) => msg.msg_type(),
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let start_pos = buf.len();

        self.encode_hdr(buf);
        self.encode_body(buf);

        // Rewrite message length.
        let msg_len = (buf.len() - start_pos) as u16 - Message::HDR_SIZE;
        buf[start_pos + 3..start_pos + 5]
            .copy_from_slice(&msg_len.to_be_bytes());
    }

    fn encode_hdr(&self, buf: &mut BytesMut) {
        match self {
            Message::Nak(msg) => msg.encode_hdr(buf),
            Message::Heartbeat(msg) => msg.encode_hdr(buf),
            Message::SysConfig(msg) => msg.encode_hdr(buf),
            Message::AggConfig(msg) => msg.encode_hdr(buf),
            Message::AggState(msg) => msg.encode_hdr(buf),
            Message::PeerLinkInfo(msg) => msg.encode_hdr(buf),
            Message::PortChannelInfo(msg) => msg.encode_hdr(buf),
            Message::MacInfo(msg) => msg.encode_hdr(buf),
            Message::ArpInfo(msg) => msg.encode_hdr(buf),
            Message::NdiscInfo(msg) => msg.encode_hdr(buf),
            Message::Warmboot(msg) => msg.encode_hdr(buf),
        }
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        match self {
            Message::Nak(msg) => msg.encode_body(buf),
            Message::Heartbeat(msg) => msg.encode_body(buf),
            Message::SysConfig(msg) => msg.encode_body(buf),
            Message::AggConfig(msg) => msg.encode_body(buf),
            Message::AggState(msg) => msg.encode_body(buf),
            Message::PeerLinkInfo(msg) => msg.encode_body(buf),
            Message::PortChannelInfo(msg) => msg.encode_body(buf),
            Message::MacInfo(msg) => msg.encode_body(buf),
            Message::ArpInfo(msg) => msg.encode_body(buf),
            Message::NdiscInfo(msg) => msg.encode_body(buf),
            Message::Warmboot(msg) => msg.encode_body(buf),
        }
    }

    // Parse data and check whether the buffer contains a whole message,
    // returning the message size in case of success.
    pub fn get_size(data: &[u8], cxt: &DecodeCxt) -> DecodeResult<usize> {
        if data.len() < Message::HDR_SIZE as usize {
            return Err(DecodeError::IncompleteMessage);
        }

        let msg_len = u16::from_be_bytes([data[3], data[4]]);
        let max_msg_len = cxt.max_msg_len.unwrap_or(Message::DFLT_MAX_LEN);
        if msg_len > max_msg_len {
            return Err(DecodeError::InvalidMessageLength(msg_len));
        }

        let msg_size = Message::HDR_SIZE as usize + msg_len as usize;
        if data.len() < msg_size {
            return Err(DecodeError::IncompleteMessage);
        }

        Ok(msg_size)
    }

    // Decode buffer into a message.
    //
    // Unknown message types with the U-bit set are skipped, in which case
    // `None` is returned.
    //
    // NOTE: Message::get_size() must be called before this method to ensure
    // the given buffer contains a complete message.
    pub fn decode(
        data: &[u8],
        cxt: &DecodeCxt,
    ) -> DecodeResult<Option<Self>> {
        let mut buf = Bytes::copy_from_slice(data);
        let mut msgi = Message::decode_hdr(&mut buf, cxt)?;

        match msgi.msg_etype {
            Some(_) => {
                let msg =
                    Message::decode_known_message(&mut buf, cxt, &mut msgi)?;
                Ok(Some(msg))
            }
            None if msgi.msg_u_bit != 0 => Ok(None),
            None => Err(DecodeError::UnknownMessage(msgi.msg_type)),
        }
    }

    fn decode_hdr(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
    ) -> DecodeResult<MessageDecodeInfo> {
        // Parse U-bit and message type.
        let msg_u_bit = buf.try_get_u8()?;
        let msg_type = buf.try_get_u16()?;
        let msg_etype = MessageType::decode(msg_type);

        // Parse message length.
        let msg_len = buf.try_get_u16()?;
        if msg_len as usize + 4 > buf.remaining() {
            return Err(DecodeError::InvalidMessageLength(msg_len));
        }

        // Parse message ID.
        let msg_id = buf.try_get_u32()?;

        // Call custom validation closure.
        if let Some(validate_msg_hdr) = &cxt.validate_msg_hdr {
            (validate_msg_hdr)(msg_type, msg_id)?;
        }

        Ok(MessageDecodeInfo {
            msg_u_bit,
            msg_type,
            msg_etype,
            msg_len,
            msg_rlen: msg_len,
            msg_id,
        })
    }

    fn decode_known_message(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        msgi: &mut MessageDecodeInfo,
    ) -> DecodeResult<Self> {
        let Some(msg_etype) = msgi.msg_etype else {
            return Err(DecodeError::UnknownMessage(msgi.msg_type));
        };
        let msg = match msg_etype {
            MessageType::Notification => NakMsg::decode_body(buf, cxt, msgi)?,
            MessageType::Heartbeat => {
                HeartbeatMsg::decode_body(buf, cxt, msgi)?
            }
            MessageType::SysConfig => {
                SysConfigMsg::decode_body(buf, cxt, msgi)?
            }
            MessageType::AggConfig => {
                AggConfigMsg::decode_body(buf, cxt, msgi)?
            }
            MessageType::AggState => AggStateMsg::decode_body(buf, cxt, msgi)?,
            MessageType::PeerLinkInfo => {
                PeerLinkInfoMsg::decode_body(buf, cxt, msgi)?
            }
            MessageType::PortChannelInfo => {
                PortChannelInfoMsg::decode_body(buf, cxt, msgi)?
            }
            MessageType::MacInfo => MacInfoMsg::decode_body(buf, cxt, msgi)?,
            MessageType::ArpInfo => ArpInfoMsg::decode_body(buf, cxt, msgi)?,
            MessageType::NdiscInfo => {
                NdiscInfoMsg::decode_body(buf, cxt, msgi)?
            }
            MessageType::Warmboot => {
                WarmbootMsg::decode_body(buf, cxt, msgi)?
            }
        };

        // Check for trailing data.
        if msgi.msg_rlen != 0 {
            return Err(DecodeError::InvalidMessageLength(msgi.msg_len));
        }

        Ok(msg)
    }
}

//
// Type conversion functions.
//

impl From<NakMsg> for Message {
    fn from(msg: NakMsg) -> Message {
        Message::Nak(msg)
    }
}

impl From<HeartbeatMsg> for Message {
    fn from(msg: HeartbeatMsg) -> Message {
        Message::Heartbeat(msg)
    }
}

impl From<SysConfigMsg> for Message {
    fn from(msg: SysConfigMsg) -> Message {
        Message::SysConfig(msg)
    }
}

impl From<AggConfigMsg> for Message {
    fn from(msg: AggConfigMsg) -> Message {
        Message::AggConfig(msg)
    }
}

impl From<AggStateMsg> for Message {
    fn from(msg: AggStateMsg) -> Message {
        Message::AggState(msg)
    }
}

impl From<PeerLinkInfoMsg> for Message {
    fn from(msg: PeerLinkInfoMsg) -> Message {
        Message::PeerLinkInfo(msg)
    }
}

impl From<PortChannelInfoMsg> for Message {
    fn from(msg: PortChannelInfoMsg) -> Message {
        Message::PortChannelInfo(msg)
    }
}

impl From<MacInfoMsg> for Message {
    fn from(msg: MacInfoMsg) -> Message {
        Message::MacInfo(msg)
    }
}

impl From<ArpInfoMsg> for Message {
    fn from(msg: ArpInfoMsg) -> Message {
        Message::ArpInfo(msg)
    }
}

impl From<NdiscInfoMsg> for Message {
    fn from(msg: NdiscInfoMsg) -> Message {
        Message::NdiscInfo(msg)
    }
}

impl From<WarmbootMsg> for Message {
    fn from(msg: WarmbootMsg) -> Message {
        Message::Warmboot(msg)
    }
}

// ===== impl MessageType =====

impl MessageType {
    pub(crate) fn decode(value: u16) -> Option<Self> {
        MessageType::from_u16(value)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Notification => write!(f, "Notification"),
            MessageType::Heartbeat => write!(f, "Heartbeat"),
            MessageType::SysConfig => write!(f, "System Config"),
            MessageType::AggConfig => write!(f, "Aggregate Config"),
            MessageType::AggState => write!(f, "Aggregate State"),
            MessageType::PeerLinkInfo => write!(f, "Peer-Link Info"),
            MessageType::PortChannelInfo => write!(f, "Port-Channel Info"),
            MessageType::MacInfo => write!(f, "MAC Info"),
            MessageType::ArpInfo => write!(f, "ARP Info"),
            MessageType::NdiscInfo => write!(f, "Neighbor Discovery Info"),
            MessageType::Warmboot => write!(f, "Warmboot"),
        }
    }
}
