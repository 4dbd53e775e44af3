//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use maplit::btreeset;

use super::*;

static PEER_LINK_INFO_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x00, 0x23, 0x00, 0x14, 0x00, 0x00, 0x00, 0x04, 0x00, 0x13,
            0x00, 0x10, 0x02, 0x0e, 0x50, 0x6f, 0x72, 0x74, 0x43, 0x68, 0x61,
            0x6e, 0x6e, 0x65, 0x6c, 0x31, 0x30, 0x30,
        ],
        PeerLinkInfoMsg {
            msg_id: 4,
            peer_link: TlvPeerLinkInfo {
                port_type: PeerLinkType::PortChannel,
                ifname: "PortChannel100".to_owned(),
            },
        }
        .into(),
    )
});

static PORT_CHANNEL_INFO_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x00, 0x24, 0x00, 0x1f, 0x00, 0x00, 0x00, 0x05, 0x00, 0x14,
            0x00, 0x1b, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x0a, 0x00, 0x14, 0x0c, 0x50, 0x6f, 0x72, 0x74, 0x43,
            0x68, 0x61, 0x6e, 0x6e, 0x65, 0x6c, 0x31,
        ],
        PortChannelInfoMsg {
            msg_id: 5,
            port_channel: TlvPortChannelInfo {
                agg_id: 1,
                l3_mode: false,
                ipv4_addr: Ipv4Addr::UNSPECIFIED,
                prefixlen: 0,
                vlan_ids: btreeset![10, 20],
                ifname: "PortChannel1".to_owned(),
            },
        }
        .into(),
    )
});

#[test]
fn test_encode_peer_link_info() {
    let (ref bytes, ref msg) = *PEER_LINK_INFO_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_peer_link_info() {
    let (ref bytes, ref msg) = *PEER_LINK_INFO_MSG1;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_decode_peer_link_info_bad_port_type() {
    let bytes = [
        0x00, 0x00, 0x23, 0x00, 0x0a, 0x00, 0x00, 0x00, 0x04, 0x00, 0x13,
        0x00, 0x06, 0x09, 0x04, 0x65, 0x74, 0x68, 0x30,
    ];
    assert_eq!(
        Message::decode(&bytes, &CXT),
        Err(DecodeError::InvalidTlvValue(TlvType::PeerLinkInfo))
    );
}

#[test]
fn test_encode_port_channel_info() {
    let (ref bytes, ref msg) = *PORT_CHANNEL_INFO_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_port_channel_info() {
    let (ref bytes, ref msg) = *PORT_CHANNEL_INFO_MSG1;
    test_decode_msg(bytes, msg);
}
