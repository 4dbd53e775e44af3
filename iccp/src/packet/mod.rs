//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod error;
pub mod message;
pub mod messages;
pub mod tlv;

pub use error::*;
pub use message::*;
pub use messages::*;
pub use tlv::*;

// Message header validation callback.
pub type MsgHdrValidationCb = dyn Fn(u16, u32) -> DecodeResult<()> + Send + Sync;

// ICCP message decoding context.
#[derive(Default)]
pub struct DecodeCxt {
    pub max_msg_len: Option<u16>,
    pub validate_msg_hdr: Option<Box<MsgHdrValidationCb>>,
}
