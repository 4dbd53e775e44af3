//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use super::*;

static NAK_MSG1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x00, 0x01, 0x00, 0x0c, 0x00, 0x00, 0x00, 0x27, 0x00, 0x01,
            0x00, 0x08, 0x00, 0x01, 0x00, 0x00, 0x00, 0x1f, 0x00, 0x30,
        ],
        NakMsg {
            msg_id: 39,
            status: TlvStatus {
                status: StatusCode::MalformedMessage,
                rej_msg_id: 31,
                rej_msg_type: MessageType::MacInfo as u16,
            },
        }
        .into(),
    )
});

static NAK_MSG2: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x00, 0x01, 0x00, 0x0c, 0x00, 0x00, 0x00, 0x28, 0x00, 0x01,
            0x00, 0x08, 0x00, 0x02, 0x00, 0x00, 0x00, 0x20, 0x0f, 0xff,
        ],
        NakMsg {
            msg_id: 40,
            status: TlvStatus {
                status: StatusCode::UnknownMessage,
                rej_msg_id: 32,
                rej_msg_type: 0x0fff,
            },
        }
        .into(),
    )
});

#[test]
fn test_encode_nak1() {
    let (ref bytes, ref msg) = *NAK_MSG1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_nak1() {
    let (ref bytes, ref msg) = *NAK_MSG1;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_encode_nak2() {
    let (ref bytes, ref msg) = *NAK_MSG2;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_nak2() {
    let (ref bytes, ref msg) = *NAK_MSG2;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_nak_rejected_type() {
    let (_, ref msg) = *NAK_MSG1;
    let Message::Nak(nak) = msg else {
        unreachable!();
    };
    assert_eq!(nak.rejected_type(), Some(MessageType::MacInfo));

    // NAK referring to a message type we don't know about.
    let (_, ref msg) = *NAK_MSG2;
    let Message::Nak(nak) = msg else {
        unreachable!();
    };
    assert_eq!(nak.rejected_type(), None);
}

#[test]
fn test_decode_nak_unknown_status() {
    // Unrecognized status codes are preserved rather than rejected.
    let bytes = [
        0x00, 0x00, 0x01, 0x00, 0x0c, 0x00, 0x00, 0x00, 0x29, 0x00, 0x01,
        0x00, 0x08, 0x00, 0x64, 0x00, 0x00, 0x00, 0x21, 0x00, 0x10,
    ];
    let msg = Message::decode(&bytes, &CXT).unwrap().unwrap();
    let Message::Nak(nak) = msg else {
        unreachable!();
    };
    assert_eq!(nak.status.status, StatusCode::Unknown(100));
}

#[test]
fn test_decode_nak_missing_status_tlv() {
    // NAK whose first TLV isn't the mandatory status TLV.
    let bytes = [
        0x00, 0x00, 0x01, 0x00, 0x05, 0x00, 0x00, 0x00, 0x29, 0x00, 0x02,
        0x00, 0x01, 0x00,
    ];
    assert_eq!(
        Message::decode(&bytes, &CXT),
        Err(DecodeError::MissingMsgTlv(TlvType::Status))
    );
}
