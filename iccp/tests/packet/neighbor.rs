//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, Ipv6Addr};

use super::*;

static ARP_INFO_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x00, 0x31, 0x00, 0x19, 0x00, 0x00, 0x00, 0x07, 0x00, 0x21,
            0x00, 0x15, 0x01, 0x00, 0x0a, 0x0a, 0x00, 0x00, 0x01, 0x00, 0xaa,
            0xbb, 0xcc, 0xdd, 0xee, 0x01, 0x06, 0x56, 0x6c, 0x61, 0x6e, 0x31,
            0x30,
        ],
        ArpInfoMsg {
            msg_id: 7,
            entries: vec![TlvArpEntry {
                op: TableOp::Add,
                vlan_id: 10,
                ipv4_addr: Ipv4Addr::new(10, 0, 0, 1),
                mac: MacAddr::from([0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0xee]),
                flags: NeighFlags::SELF_IP,
                ifname: "Vlan10".to_owned(),
            }],
        }
        .into(),
    )
});

static NDISC_INFO_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x00, 0x32, 0x00, 0x25, 0x00, 0x00, 0x00, 0x08, 0x00, 0x22,
            0x00, 0x21, 0x01, 0x00, 0x0a, 0x20, 0x01, 0x0d, 0xb8, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00,
            0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x00, 0x06, 0x56, 0x6c, 0x61, 0x6e,
            0x31, 0x30,
        ],
        NdiscInfoMsg {
            msg_id: 8,
            entries: vec![TlvNdiscEntry {
                op: TableOp::Add,
                vlan_id: 10,
                ipv6_addr: Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1),
                mac: MacAddr::from([0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0xee]),
                flags: NeighFlags::empty(),
                ifname: "Vlan10".to_owned(),
            }],
        }
        .into(),
    )
});

#[test]
fn test_encode_arp_info() {
    let (ref bytes, ref msg) = *ARP_INFO_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_arp_info() {
    let (ref bytes, ref msg) = *ARP_INFO_MSG1;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_decode_arp_info_no_entries() {
    let bytes = [0x00, 0x00, 0x31, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07];
    assert_eq!(
        Message::decode(&bytes, &CXT),
        Err(DecodeError::MissingMsgTlv(TlvType::ArpEntry))
    );
}

#[test]
fn test_encode_ndisc_info() {
    let (ref bytes, ref msg) = *NDISC_INFO_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_ndisc_info() {
    let (ref bytes, ref msg) = *NDISC_INFO_MSG1;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_decode_ndisc_info_bad_tlv_len() {
    // ND entry TLV shorter than the fixed part of the entry.
    let bytes = [
        0x00, 0x00, 0x32, 0x00, 0x0e, 0x00, 0x00, 0x00, 0x08, 0x00, 0x22,
        0x00, 0x0a, 0x01, 0x00, 0x0a, 0x20, 0x01, 0x0d, 0xb8, 0x00, 0x00,
        0x00,
    ];
    assert_eq!(
        Message::decode(&bytes, &CXT),
        Err(DecodeError::InvalidTlvLength(10))
    );
}
