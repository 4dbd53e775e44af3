//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use super::*;

static AGG_CONFIG_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x00, 0x21, 0x00, 0x1a, 0x00, 0x00, 0x00, 0x02, 0x00, 0x11,
            0x00, 0x16, 0x00, 0x01, 0x01, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55,
            0x0c, 0x50, 0x6f, 0x72, 0x74, 0x43, 0x68, 0x61, 0x6e, 0x6e, 0x65,
            0x6c, 0x31,
        ],
        AggConfigMsg {
            msg_id: 2,
            agg_config: TlvAggConfig {
                agg_id: 1,
                op: AggOp::Create,
                mac: MacAddr::from([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
                ifname: "PortChannel1".to_owned(),
            },
        }
        .into(),
    )
});

static AGG_STATE_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x00, 0x22, 0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x00, 0x12,
            0x00, 0x03, 0x00, 0x01, 0x01,
        ],
        AggStateMsg {
            msg_id: 3,
            agg_state: TlvAggState {
                agg_id: 1,
                state: PortState::Up,
            },
        }
        .into(),
    )
});

#[test]
fn test_encode_agg_config() {
    let (ref bytes, ref msg) = *AGG_CONFIG_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_agg_config() {
    let (ref bytes, ref msg) = *AGG_CONFIG_MSG1;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_decode_agg_config_bad_op() {
    // Operation 3 isn't a valid aggregate operation.
    let bytes = [
        0x00, 0x00, 0x21, 0x00, 0x1a, 0x00, 0x00, 0x00, 0x02, 0x00, 0x11,
        0x00, 0x16, 0x00, 0x01, 0x03, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55,
        0x0c, 0x50, 0x6f, 0x72, 0x74, 0x43, 0x68, 0x61, 0x6e, 0x6e, 0x65,
        0x6c, 0x31,
    ];
    assert_eq!(
        Message::decode(&bytes, &CXT),
        Err(DecodeError::InvalidTlvValue(TlvType::AggConfig))
    );
}

#[test]
fn test_encode_agg_state() {
    let (ref bytes, ref msg) = *AGG_STATE_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_agg_state() {
    let (ref bytes, ref msg) = *AGG_STATE_MSG1;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_decode_agg_state_bad_state() {
    let bytes = [
        0x00, 0x00, 0x22, 0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x00, 0x12,
        0x00, 0x03, 0x00, 0x01, 0x07,
    ];
    assert_eq!(
        Message::decode(&bytes, &CXT),
        Err(DecodeError::InvalidTlvValue(TlvType::AggState))
    );
}
