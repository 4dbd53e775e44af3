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
use crate::packet::message::MessageDecodeInfo;
use crate::packet::DecodeCxt;

//
// ICCP Type-Length-Value.
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |            Type               |            Length             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                             Value                             |
// ~                                                               ~
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
pub const TLV_HDR_SIZE: u16 = 4;

// ICCP TLV types.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum TlvType {
    Status = 0x0001,
    Heartbeat = 0x0002,
    Warmboot = 0x0003,
    SysConfig = 0x0010,
    AggConfig = 0x0011,
    AggState = 0x0012,
    PeerLinkInfo = 0x0013,
    PortChannelInfo = 0x0014,
    MacEntry = 0x0020,
    ArpEntry = 0x0021,
    NdiscEntry = 0x0022,
}

//
// TLV decode information.
//
// Used as a control block during the decode process, and used to return
// detailed error information.
//
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TlvDecodeInfo {
    pub tlv_type: u16,
    pub tlv_etype: Option<TlvType>,
    pub tlv_len: u16,
}

pub trait TlvKind: std::fmt::Debug {
    const TLV_TYPE: TlvType;

    fn encode_hdr(&self, buf: &mut BytesMut) {
        buf.put_u16(Self::TLV_TYPE as u16);
        // The TLV length will be rewritten later.
        buf.put_u16(0);
    }

    fn encode_value(&self, buf: &mut BytesMut);

    fn encode(&self, buf: &mut BytesMut) {
        let start_pos = buf.len();

        self.encode_hdr(buf);
        self.encode_value(buf);

        // Rewrite TLV length.
        let tlv_len = (buf.len() - start_pos) as u16 - TLV_HDR_SIZE;
        buf[start_pos + 2..start_pos + 4]
            .copy_from_slice(&tlv_len.to_be_bytes());
    }

    fn decode_value(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        tlvi: &TlvDecodeInfo,
    ) -> DecodeResult<Self>
    where
        Self: Sized;
}

// ===== impl TlvType =====

impl TlvType {
    pub(crate) fn decode(value: u16) -> Option<Self> {
        TlvType::from_u16(value)
    }
}

// ===== global functions =====

pub(crate) fn decode_tlv_hdr(
    buf: &mut Bytes,
    msgi: &mut MessageDecodeInfo,
) -> DecodeResult<TlvDecodeInfo> {
    // Parse TLV type.
    let tlv_type = buf.try_get_u16()?;
    let tlv_etype = TlvType::decode(tlv_type);

    // Parse and validate TLV length. The size addition is widened so an
    // adversarial length close to u16::MAX can't wrap.
    let tlv_len = buf.try_get_u16()?;
    let tlv_size = tlv_len as u32 + TLV_HDR_SIZE as u32;
    if tlv_size > msgi.msg_rlen as u32 {
        return Err(DecodeError::InvalidTlvLength(tlv_len));
    }

    // Update number of remaining bytes in the message.
    msgi.msg_rlen -= tlv_size as u16;

    Ok(TlvDecodeInfo {
        tlv_type,
        tlv_etype,
        tlv_len,
    })
}

// Decodes a length-prefixed interface name (u8 length + bytes).
pub(crate) fn decode_ifname(buf: &mut Bytes) -> DecodeResult<String> {
    let name_len = buf.try_get_u8()?;
    let name = buf.try_get_string(name_len as usize)?;
    Ok(name)
}

// Encodes a length-prefixed interface name (u8 length + bytes).
pub(crate) fn encode_ifname(buf: &mut BytesMut, name: &str) {
    buf.put_u8(name.len() as u8);
    buf.put_slice(name.as_bytes());
}
