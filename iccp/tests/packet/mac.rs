//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use super::*;

static MAC_INFO_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x00, 0x30, 0x00, 0x36, 0x00, 0x00, 0x00, 0x06,
            // First entry.
            0x00, 0x20, 0x00, 0x17, 0x01, 0x00, 0x0a, 0x00, 0xaa, 0xbb, 0xcc,
            0xdd, 0xee, 0x01, 0x0c, 0x50, 0x6f, 0x72, 0x74, 0x43, 0x68, 0x61,
            0x6e, 0x6e, 0x65, 0x6c, 0x31,
            // Second entry.
            0x00, 0x20, 0x00, 0x17, 0x02, 0x00, 0x0a, 0x00, 0xaa, 0xbb, 0xcc,
            0xdd, 0xef, 0x01, 0x0c, 0x50, 0x6f, 0x72, 0x74, 0x43, 0x68, 0x61,
            0x6e, 0x6e, 0x65, 0x6c, 0x32,
        ],
        MacInfoMsg {
            msg_id: 6,
            entries: vec![
                TlvMacEntry {
                    op: TableOp::Add,
                    vlan_id: 10,
                    mac: MacAddr::from([0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0xee]),
                    mac_type: MacType::Dynamic,
                    ifname: "PortChannel1".to_owned(),
                },
                TlvMacEntry {
                    op: TableOp::Del,
                    vlan_id: 10,
                    mac: MacAddr::from([0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0xef]),
                    mac_type: MacType::Dynamic,
                    ifname: "PortChannel2".to_owned(),
                },
            ],
        }
        .into(),
    )
});

#[test]
fn test_encode_mac_info() {
    let (ref bytes, ref msg) = *MAC_INFO_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_mac_info() {
    let (ref bytes, ref msg) = *MAC_INFO_MSG1;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_decode_mac_info_no_entries() {
    // A MAC information message needs at least one entry TLV.
    let bytes = [0x00, 0x00, 0x30, 0x00, 0x00, 0x00, 0x00, 0x00, 0x06];
    assert_eq!(
        Message::decode(&bytes, &CXT),
        Err(DecodeError::MissingMsgTlv(TlvType::MacEntry))
    );
}

#[test]
fn test_decode_mac_info_bad_op() {
    let bytes = [
        0x00, 0x00, 0x30, 0x00, 0x1b, 0x00, 0x00, 0x00, 0x06, 0x00, 0x20,
        0x00, 0x17, 0x05, 0x00, 0x0a, 0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0xee,
        0x01, 0x0c, 0x50, 0x6f, 0x72, 0x74, 0x43, 0x68, 0x61, 0x6e, 0x6e,
        0x65, 0x6c, 0x31,
    ];
    assert_eq!(
        Message::decode(&bytes, &CXT),
        Err(DecodeError::InvalidTlvValue(TlvType::MacEntry))
    );
}
