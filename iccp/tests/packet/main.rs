//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

mod aggregate;
mod heartbeat;
mod mac;
mod neighbor;
mod notification;
mod portchannel;
mod system;
mod warmboot;

use std::sync::LazyLock as Lazy;

use bytes::BytesMut;
use iccp::packet::*;
use iccp_utils::MacAddr;

static CXT: Lazy<DecodeCxt> = Lazy::new(DecodeCxt::default);

//
// Helper functions.
//

fn test_encode_msg(bytes_expected: &[u8], msg: &Message) {
    let mut bytes_actual = BytesMut::with_capacity(1500);
    msg.encode(&mut bytes_actual);
    assert_eq!(bytes_expected, bytes_actual.as_ref());
}

fn test_decode_msg(bytes: &[u8], msg_expected: &Message) {
    let msg_size = Message::get_size(bytes, &CXT).unwrap();
    assert_eq!(msg_size, bytes.len());

    let msg_actual = Message::decode(bytes, &CXT).unwrap().unwrap();
    assert_eq!(*msg_expected, msg_actual);
}

//
// Header-level tests.
//

#[test]
fn test_get_size_incomplete_hdr() {
    // Fewer bytes than the fixed message header.
    let bytes = [0x00, 0x00, 0x10, 0x00];
    assert_eq!(
        Message::get_size(&bytes, &CXT),
        Err(DecodeError::IncompleteMessage)
    );
}

#[test]
fn test_get_size_incomplete_body() {
    // Complete header advertising a 5-byte payload that isn't there yet.
    let bytes = [0x00, 0x00, 0x10, 0x00, 0x05, 0x00, 0x00, 0x00, 0x01];
    assert_eq!(
        Message::get_size(&bytes, &CXT),
        Err(DecodeError::IncompleteMessage)
    );
}

#[test]
fn test_get_size_too_big() {
    let cxt = DecodeCxt {
        max_msg_len: Some(4),
        ..Default::default()
    };
    let bytes = [0x00, 0x00, 0x10, 0x00, 0x05, 0x00, 0x00, 0x00, 0x01];
    assert_eq!(
        Message::get_size(&bytes, &cxt),
        Err(DecodeError::InvalidMessageLength(5))
    );
}

#[test]
fn test_decode_truncated_body() {
    // Header-only buffer handed straight to decode(), without the usual
    // length pre-scan.
    let bytes = [0x00, 0x00, 0x10, 0x00, 0x05];
    assert_eq!(
        Message::decode(&bytes, &CXT),
        Err(DecodeError::InvalidMessageLength(5))
    );
}

#[test]
fn test_decode_unknown_msg_type() {
    // Unknown message type without the U-bit elicits a NAK.
    let bytes = [
        0x00, 0x0f, 0xff, 0x00, 0x05, 0x00, 0x00, 0x00, 0x01, 0x0f, 0xff,
        0x00, 0x01, 0x00,
    ];
    assert_eq!(
        Message::decode(&bytes, &CXT),
        Err(DecodeError::UnknownMessage(0x0fff))
    );
}

#[test]
fn test_decode_unknown_msg_type_u_bit() {
    // Unknown message type with the U-bit set is silently skipped.
    let bytes = [
        0x01, 0x0f, 0xff, 0x00, 0x05, 0x00, 0x00, 0x00, 0x01, 0x0f, 0xff,
        0x00, 0x01, 0x00,
    ];
    assert_eq!(Message::decode(&bytes, &CXT), Ok(None));
}
