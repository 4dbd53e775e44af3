//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use super::*;

static HEARTBEAT_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x00, 0x10, 0x00, 0x05, 0x00, 0x00, 0x00, 0x09, 0x00, 0x02,
            0x00, 0x01, 0x00,
        ],
        HeartbeatMsg {
            msg_id: 9,
            heartbeat: TlvHeartbeat { node_id: 0 },
        }
        .into(),
    )
});

#[test]
fn test_encode_heartbeat() {
    let (ref bytes, ref msg) = *HEARTBEAT_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_heartbeat() {
    let (ref bytes, ref msg) = *HEARTBEAT_MSG1;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_decode_heartbeat_bad_tlv_len() {
    let bytes = [
        0x00, 0x00, 0x10, 0x00, 0x06, 0x00, 0x00, 0x00, 0x09, 0x00, 0x02,
        0x00, 0x02, 0x00, 0x00,
    ];
    assert_eq!(
        Message::decode(&bytes, &CXT),
        Err(DecodeError::InvalidTlvLength(2))
    );
}

#[test]
fn test_decode_heartbeat_huge_tlv_len() {
    // TLV length near u16::MAX; the size check must not wrap.
    let bytes = [
        0x00, 0x00, 0x10, 0x00, 0x09, 0x00, 0x00, 0x00, 0x09, 0x00, 0x02,
        0xff, 0xfd, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    assert_eq!(
        Message::decode(&bytes, &CXT),
        Err(DecodeError::InvalidTlvLength(0xfffd))
    );
}
