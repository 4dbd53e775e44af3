//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use iccp_utils::bytes::TryGetError;
use serde::{Deserialize, Serialize};

use crate::packet::tlv::TlvType;

// Type aliases.
pub type DecodeResult<T> = Result<T, DecodeError>;

// ICCP message decoding errors.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum DecodeError {
    // The buffer ended before the advertised length was reached.
    ReadOutOfBounds,
    // The buffer doesn't contain a complete message yet.
    IncompleteMessage,
    InvalidMessageLength(u16),
    UnknownMessage(u16),
    InvalidTlvLength(u16),
    InvalidTlvValue(TlvType),
    MissingMsgTlv(TlvType),
}

// ===== impl DecodeError =====

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::ReadOutOfBounds => {
                write!(f, "attempt to read out of bounds")
            }
            DecodeError::IncompleteMessage => {
                write!(f, "incomplete message")
            }
            DecodeError::InvalidMessageLength(len) => {
                write!(f, "invalid message length: {len}")
            }
            DecodeError::UnknownMessage(msg_type) => {
                write!(f, "unknown message type: {msg_type:#06x}")
            }
            DecodeError::InvalidTlvLength(len) => {
                write!(f, "invalid TLV length: {len}")
            }
            DecodeError::InvalidTlvValue(tlv_type) => {
                write!(f, "invalid value in {tlv_type:?} TLV")
            }
            DecodeError::MissingMsgTlv(tlv_type) => {
                write!(f, "missing mandatory {tlv_type:?} TLV")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<TryGetError> for DecodeError {
    fn from(_error: TryGetError) -> DecodeError {
        DecodeError::ReadOutOfBounds
    }
}
