//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use super::*;

static SYS_CONFIG_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x00, 0x20, 0x00, 0x0b, 0x00, 0x00, 0x00, 0x01, 0x00, 0x10,
            0x00, 0x07, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x00,
        ],
        SysConfigMsg {
            msg_id: 1,
            sys_config: TlvSysConfig {
                sys_mac: MacAddr::from([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
                node_id: 0,
            },
        }
        .into(),
    )
});

#[test]
fn test_encode_sys_config() {
    let (ref bytes, ref msg) = *SYS_CONFIG_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_sys_config() {
    let (ref bytes, ref msg) = *SYS_CONFIG_MSG1;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_decode_sys_config_unspecified_mac() {
    // The all-zeroes system MAC is reserved.
    let bytes = [
        0x00, 0x00, 0x20, 0x00, 0x0b, 0x00, 0x00, 0x00, 0x01, 0x00, 0x10,
        0x00, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    assert_eq!(
        Message::decode(&bytes, &CXT),
        Err(DecodeError::InvalidTlvValue(TlvType::SysConfig))
    );
}

#[test]
fn test_decode_sys_config_bad_tlv_len() {
    let bytes = [
        0x00, 0x00, 0x20, 0x00, 0x0a, 0x00, 0x00, 0x00, 0x01, 0x00, 0x10,
        0x00, 0x06, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55,
    ];
    assert_eq!(
        Message::decode(&bytes, &CXT),
        Err(DecodeError::InvalidTlvLength(6))
    );
}
