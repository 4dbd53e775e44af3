//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use iccp_utils::bytes::{BytesExt, BytesMutExt};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::message::{Message, MessageDecodeInfo, MessageKind, MessageType};
use crate::packet::tlv::{self, TlvDecodeInfo, TlvKind, TlvType};
use crate::packet::DecodeCxt;

// Peer-link port type.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PeerLinkType {
    Ethernet = 1,
    PortChannel = 2,
    Vlan = 3,
}

//
// Port-channel information message.
//
// Full configuration snapshot of one MLAG port-channel: L3 mode, IPv4
// address and the complete VLAN membership list. The receiver applies the
// VLAN list with mark-then-prune semantics.
//
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct PortChannelInfoMsg {
    pub msg_id: u32,
    pub port_channel: TlvPortChannelInfo,
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct TlvPortChannelInfo {
    pub agg_id: u16,
    pub l3_mode: bool,
    pub ipv4_addr: Ipv4Addr,
    pub prefixlen: u8,
    pub vlan_ids: BTreeSet<u16>,
    pub ifname: String,
}

//
// Peer-link information message.
//
// Announces the sender's peer-link interface name and type.
//
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct PeerLinkInfoMsg {
    pub msg_id: u32,
    pub peer_link: TlvPeerLinkInfo,
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct TlvPeerLinkInfo {
    pub port_type: PeerLinkType,
    pub ifname: String,
}

// ===== impl PortChannelInfoMsg =====

impl MessageKind for PortChannelInfoMsg {
    const U_BIT: bool = false;

    fn msg_id(&self) -> u32 {
        self.msg_id
    }

    fn msg_type(&self) -> MessageType {
        MessageType::PortChannelInfo
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        self.port_channel.encode(buf);
    }

    fn decode_body(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        msgi: &mut MessageDecodeInfo,
    ) -> DecodeResult<Message> {
        // Decode mandatory port-channel information TLV.
        if msgi.msg_rlen < tlv::TLV_HDR_SIZE {
            return Err(DecodeError::MissingMsgTlv(TlvType::PortChannelInfo));
        }
        let tlvi = tlv::decode_tlv_hdr(buf, msgi)?;
        if tlvi.tlv_etype != Some(TlvType::PortChannelInfo) {
            return Err(DecodeError::MissingMsgTlv(TlvType::PortChannelInfo));
        }
        let port_channel = TlvPortChannelInfo::decode_value(buf, cxt, &tlvi)?;

        let mut msg = PortChannelInfoMsg {
            msg_id: msgi.msg_id,
            port_channel,
        };

        // Decode optional TLVs.
        msg.decode_opt_tlvs(buf, cxt, msgi)?;

        Ok(Message::PortChannelInfo(msg))
    }
}

// ===== impl TlvPortChannelInfo =====

impl TlvKind for TlvPortChannelInfo {
    const TLV_TYPE: TlvType = TlvType::PortChannelInfo;

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u16(self.agg_id);
        buf.put_u8(self.l3_mode as u8);
        buf.put_ipv4(&self.ipv4_addr);
        buf.put_u8(self.prefixlen);
        buf.put_u16(self.vlan_ids.len() as u16);
        for vlan_id in &self.vlan_ids {
            buf.put_u16(*vlan_id);
        }
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

        let agg_id = buf.try_get_u16()?;
        let l3_mode = buf.try_get_u8()? != 0;
        let ipv4_addr = buf.try_get_ipv4()?;
        let prefixlen = buf.try_get_u8()?;

        // Parse VLAN membership list.
        let vlan_count = buf.try_get_u16()?;
        let mut vlan_ids = BTreeSet::new();
        for _ in 0..vlan_count {
            vlan_ids.insert(buf.try_get_u16()?);
        }

        let ifname = tlv::decode_ifname(buf)?;

        Ok(TlvPortChannelInfo {
            agg_id,
            l3_mode,
            ipv4_addr,
            prefixlen,
            vlan_ids,
            ifname,
        })
    }
}

// ===== impl PeerLinkInfoMsg =====

impl MessageKind for PeerLinkInfoMsg {
    const U_BIT: bool = false;

    fn msg_id(&self) -> u32 {
        self.msg_id
    }

    fn msg_type(&self) -> MessageType {
        MessageType::PeerLinkInfo
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        self.peer_link.encode(buf);
    }

    fn decode_body(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        msgi: &mut MessageDecodeInfo,
    ) -> DecodeResult<Message> {
        // Decode mandatory peer-link information TLV.
        if msgi.msg_rlen < tlv::TLV_HDR_SIZE {
            return Err(DecodeError::MissingMsgTlv(TlvType::PeerLinkInfo));
        }
        let tlvi = tlv::decode_tlv_hdr(buf, msgi)?;
        if tlvi.tlv_etype != Some(TlvType::PeerLinkInfo) {
            return Err(DecodeError::MissingMsgTlv(TlvType::PeerLinkInfo));
        }
        let peer_link = TlvPeerLinkInfo::decode_value(buf, cxt, &tlvi)?;

        let mut msg = PeerLinkInfoMsg {
            msg_id: msgi.msg_id,
            peer_link,
        };

        // Decode optional TLVs.
        msg.decode_opt_tlvs(buf, cxt, msgi)?;

        Ok(Message::PeerLinkInfo(msg))
    }
}

// ===== impl TlvPeerLinkInfo =====

impl TlvKind for TlvPeerLinkInfo {
    const TLV_TYPE: TlvType = TlvType::PeerLinkInfo;

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u8(self.port_type as u8);
        tlv::encode_ifname(buf, &self.ifname);
    }

    fn decode_value(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
        tlvi: &TlvDecodeInfo,
    ) -> DecodeResult<Self> {
        if tlvi.tlv_len < 2 {
            return Err(DecodeError::InvalidTlvLength(tlvi.tlv_len));
        }

        let port_type = PeerLinkType::from_u8(buf.try_get_u8()?)
            .ok_or(DecodeError::InvalidTlvValue(TlvType::PeerLinkInfo))?;
        let ifname = tlv::decode_ifname(buf)?;

        Ok(TlvPeerLinkInfo { port_type, ifname })
    }
}
