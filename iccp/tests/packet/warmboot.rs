//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use super::*;

static WARMBOOT_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        // The warmboot message carries the U-bit so older peers skip it.
        vec![
            0x01, 0x00, 0x40, 0x00, 0x05, 0x00, 0x00, 0x00, 0x0a, 0x00, 0x03,
            0x00, 0x01, 0x01,
        ],
        WarmbootMsg {
            msg_id: 10,
            warmboot: TlvWarmboot { restarting: true },
        }
        .into(),
    )
});

#[test]
fn test_encode_warmboot() {
    let (ref bytes, ref msg) = *WARMBOOT_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_warmboot() {
    let (ref bytes, ref msg) = *WARMBOOT_MSG1;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_decode_warmboot_bad_tlv_len() {
    let bytes = [
        0x01, 0x00, 0x40, 0x00, 0x06, 0x00, 0x00, 0x00, 0x0a, 0x00, 0x03,
        0x00, 0x02, 0x01, 0x00,
    ];
    assert_eq!(
        Message::decode(&bytes, &CXT),
        Err(DecodeError::InvalidTlvLength(2))
    );
}
