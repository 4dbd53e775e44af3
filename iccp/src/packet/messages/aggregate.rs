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
use crate::packet::messages::PortState;
use crate::packet::tlv::{self, TlvDecodeInfo, TlvKind, TlvType};
use crate::packet::DecodeCxt;

// Aggregate configuration operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(num_derive::FromPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum AggOp {
    Create = 1,
    Remove = 2,
}

//
// Aggregate configuration message.
//
// Announces creation or removal of a local MLAG port-channel so the peer
// can mirror it as a peer interface.
//
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct AggConfigMsg {
    pub msg_id: u32,
    pub agg_config: TlvAggConfig,
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct TlvAggConfig {
    pub agg_id: u16,
    pub op: AggOp,
    pub mac: MacAddr,
    pub ifname: String,
}

//
// Aggregate state message.
//
// Propagates UP/DOWN transitions of a local MLAG port-channel.
//
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct AggStateMsg {
    pub msg_id: u32,
    pub agg_state: TlvAggState,
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct TlvAggState {
    pub agg_id: u16,
    pub state: PortState,
}

// ===== impl AggConfigMsg =====

impl MessageKind for AggConfigMsg {
    const U_BIT: bool = false;

    fn msg_id(&self) -> u32 {
        self.msg_id
    }

    fn msg_type(&self) -> MessageType {
        MessageType::AggConfig
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        self.agg_config.encode(buf);
    }

    fn decode_body(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        msgi: &mut MessageDecodeInfo,
    ) -> DecodeResult<Message> {
        // Decode mandatory aggregate configuration TLV.
        if msgi.msg_rlen < tlv::TLV_HDR_SIZE {
            return Err(DecodeError::MissingMsgTlv(TlvType::AggConfig));
        }
        let tlvi = tlv::decode_tlv_hdr(buf, msgi)?;
        if tlvi.tlv_etype != Some(TlvType::AggConfig) {
            return Err(DecodeError::MissingMsgTlv(TlvType::AggConfig));
        }
        let agg_config = TlvAggConfig::decode_value(buf, cxt, &tlvi)?;

        let mut msg = AggConfigMsg {
            msg_id: msgi.msg_id,
            agg_config,
        };

        // Decode optional TLVs.
        msg.decode_opt_tlvs(buf, cxt, msgi)?;

        Ok(Message::AggConfig(msg))
    }
}

// ===== impl TlvAggConfig =====

impl TlvKind for TlvAggConfig {
    const TLV_TYPE: TlvType = TlvType::AggConfig;

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u16(self.agg_id);
        buf.put_u8(self.op as u8);
        buf.put_mac(&self.mac);
        tlv::encode_ifname(buf, &self.ifname);
    }

    fn decode_value(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
        tlvi: &TlvDecodeInfo,
    ) -> DecodeResult<Self> {
        if tlvi.tlv_len < 10 {
            return Err(DecodeError::InvalidTlvLength(tlvi.tlv_len));
        }

        let agg_id = buf.try_get_u16()?;
        let op = AggOp::from_u8(buf.try_get_u8()?)
            .ok_or(DecodeError::InvalidTlvValue(TlvType::AggConfig))?;
        let mac = buf.try_get_mac()?;
        let ifname = tlv::decode_ifname(buf)?;

        Ok(TlvAggConfig {
            agg_id,
            op,
            mac,
            ifname,
        })
    }
}

// ===== impl AggStateMsg =====

impl MessageKind for AggStateMsg {
    const U_BIT: bool = false;

    fn msg_id(&self) -> u32 {
        self.msg_id
    }

    fn msg_type(&self) -> MessageType {
        MessageType::AggState
    }

    fn encode_body(&self, buf: &mut BytesMut) {
        self.agg_state.encode(buf);
    }

    fn decode_body(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        msgi: &mut MessageDecodeInfo,
    ) -> DecodeResult<Message> {
        // Decode mandatory aggregate state TLV.
        if msgi.msg_rlen < tlv::TLV_HDR_SIZE {
            return Err(DecodeError::MissingMsgTlv(TlvType::AggState));
        }
        let tlvi = tlv::decode_tlv_hdr(buf, msgi)?;
        if tlvi.tlv_etype != Some(TlvType::AggState) {
            return Err(DecodeError::MissingMsgTlv(TlvType::AggState));
        }
        let agg_state = TlvAggState::decode_value(buf, cxt, &tlvi)?;

        let mut msg = AggStateMsg {
            msg_id: msgi.msg_id,
            agg_state,
        };

        // Decode optional TLVs.
        msg.decode_opt_tlvs(buf, cxt, msgi)?;

        Ok(Message::AggState(msg))
    }
}

// ===== impl TlvAggState =====

impl TlvKind for TlvAggState {
    const TLV_TYPE: TlvType = TlvType::AggState;

    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u16(self.agg_id);
        buf.put_u8(self.state as u8);
    }

    fn decode_value(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
        tlvi: &TlvDecodeInfo,
    ) -> DecodeResult<Self> {
        if tlvi.tlv_len != 3 {
            return Err(DecodeError::InvalidTlvLength(tlvi.tlv_len));
        }

        let agg_id = buf.try_get_u16()?;
        let state = PortState::from_u8(buf.try_get_u8()?)
            .ok_or(DecodeError::InvalidTlvValue(TlvType::AggState))?;

        Ok(TlvAggState { agg_id, state })
    }
}
