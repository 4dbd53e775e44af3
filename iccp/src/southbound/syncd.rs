//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use iccp_utils::bytes::{BytesExt, BytesMutExt};
use num_traits::FromPrimitive;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{Sender, UnboundedReceiver};

use crate::csm;
use crate::error::IoError;
use crate::packet::messages::MacType;
use crate::southbound::{SyncdEvent, SyncdRequest};
use crate::tasks::messages::input::SyncdEventMsg;

// mclagsyncd IPC TCP port.
pub const SYNCD_PORT: u16 = 2626;

//
// mclagsyncd IPC frame:
//
//     { u8 version, u8 type, u16 len, payload[len] }
//
// `len` counts only the payload.
//
const FRAME_VERSION: u8 = 1;
const FRAME_HDR_LEN: usize = 4;

const FRAME_FDB_ADD: u8 = 1;
const FRAME_FDB_DEL: u8 = 2;
const FRAME_INTF_MAC: u8 = 3;
const FRAME_ISOLATION: u8 = 4;
const FRAME_ICCP_STATE: u8 = 5;
const FRAME_ICCP_ROLE: u8 = 6;
const FRAME_FDB_LEARN: u8 = 16;
const FRAME_FDB_AGE: u8 = 17;

// ===== helper functions =====

fn encode_ifname(buf: &mut BytesMut, ifname: &str) {
    buf.put_u8(ifname.len() as u8);
    buf.put_slice(ifname.as_bytes());
}

fn encode_request(request: &SyncdRequest, buf: &mut BytesMut) {
    let start_pos = buf.len();
    buf.put_u8(FRAME_VERSION);
    match request {
        SyncdRequest::FdbAdd {
            vlan_id,
            mac,
            ifname,
        } => {
            buf.put_u8(FRAME_FDB_ADD);
            buf.put_u16(0);
            buf.put_u16(*vlan_id);
            buf.put_mac(mac);
            encode_ifname(buf, ifname);
        }
        SyncdRequest::FdbDel {
            vlan_id,
            mac,
            ifname,
        } => {
            buf.put_u8(FRAME_FDB_DEL);
            buf.put_u16(0);
            buf.put_u16(*vlan_id);
            buf.put_mac(mac);
            encode_ifname(buf, ifname);
        }
        SyncdRequest::SetIntfMac { ifname, mac } => {
            buf.put_u8(FRAME_INTF_MAC);
            buf.put_u16(0);
            buf.put_mac(mac);
            encode_ifname(buf, ifname);
        }
        SyncdRequest::SetIsolation { ifname, enable } => {
            buf.put_u8(FRAME_ISOLATION);
            buf.put_u16(0);
            buf.put_u8(*enable as u8);
            encode_ifname(buf, ifname);
        }
        SyncdRequest::SetIccpState { domain_id, up } => {
            buf.put_u8(FRAME_ICCP_STATE);
            buf.put_u16(0);
            buf.put_u16(*domain_id);
            buf.put_u8(*up as u8);
        }
        SyncdRequest::SetIccpRole {
            domain_id,
            active,
            sys_mac,
        } => {
            buf.put_u8(FRAME_ICCP_ROLE);
            buf.put_u16(0);
            buf.put_u16(*domain_id);
            buf.put_u8(*active as u8);
            buf.put_mac(sys_mac);
        }
    }

    // Rewrite payload length.
    let payload_len = (buf.len() - start_pos - FRAME_HDR_LEN) as u16;
    buf[start_pos + 2..start_pos + 4]
        .copy_from_slice(&payload_len.to_be_bytes());
}

fn decode_event(frame_type: u8, mut payload: Bytes) -> Option<SyncdEvent> {
    match frame_type {
        FRAME_FDB_LEARN | FRAME_FDB_AGE => {
            let vlan_id = payload.try_get_u16().ok()?;
            let mac = payload.try_get_mac().ok()?;
            let mac_type = MacType::from_u8(payload.try_get_u8().ok()?)?;
            let ifname_len = payload.try_get_u8().ok()?;
            let ifname = payload.try_get_string(ifname_len as usize).ok()?;

            if frame_type == FRAME_FDB_LEARN {
                Some(SyncdEvent::FdbLearn {
                    vlan_id,
                    mac,
                    mac_type,
                    ifname,
                })
            } else {
                Some(SyncdEvent::FdbAge {
                    vlan_id,
                    mac,
                    ifname,
                })
            }
        }
        _ => None,
    }
}

// ===== global functions =====

// mclagsyncd client loop. Forwards requests, delivers learn/age events and
// reconnects with the same rate-limited retry discipline as the peer
// session.
pub(crate) async fn client_loop(
    addr: SocketAddr,
    event_txp: Sender<SyncdEventMsg>,
    mut request_rxc: UnboundedReceiver<SyncdRequest>,
) {
    let retry = Duration::from_secs(csm::CONNECT_INTERVAL_SEC);

    loop {
        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(error) => {
                IoError::SyncdConnectError(error).log();
                tokio::time::sleep(retry).await;
                continue;
            }
        };
        let (mut read_half, mut write_half) = stream.into_split();
        let mut buf = [0; 4096];
        let mut data: Vec<u8> = Vec::new();

        loop {
            tokio::select! {
                result = read_half.read(&mut buf) => {
                    match result {
                        Ok(0) => break,
                        Ok(num_bytes) => {
                            data.extend_from_slice(&buf[0..num_bytes]);
                        }
                        Err(error) => {
                            IoError::SyncdRecvError(error).log();
                            break;
                        }
                    }

                    // Decode complete frame(s).
                    while data.len() >= FRAME_HDR_LEN {
                        let payload_len =
                            u16::from_be_bytes([data[2], data[3]]) as usize;
                        let frame_size = FRAME_HDR_LEN + payload_len;
                        if data.len() < frame_size {
                            break;
                        }

                        let frame_type = data[1];
                        let payload = Bytes::copy_from_slice(
                            &data[FRAME_HDR_LEN..frame_size],
                        );
                        data.drain(0..frame_size);

                        if let Some(event) = decode_event(frame_type, payload)
                        {
                            if event_txp
                                .send(SyncdEventMsg { event })
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                    }
                }
                request = request_rxc.recv() => {
                    let Some(request) = request else {
                        return;
                    };

                    let mut buf = BytesMut::new();
                    encode_request(&request, &mut buf);
                    if let Err(error) = write_half.write_all(&buf).await {
                        IoError::SyncdSendError(error).log();
                        break;
                    }
                }
            }
        }

        // Lost the connection, retry.
        tokio::time::sleep(retry).await;
    }
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use iccp_utils::MacAddr;

    #[test]
    fn frame_roundtrip() {
        let mut buf = BytesMut::new();
        encode_request(
            &SyncdRequest::FdbAdd {
                vlan_id: 100,
                mac: MacAddr::from([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
                ifname: "PortChannel01".to_owned(),
            },
            &mut buf,
        );

        assert_eq!(buf[0], FRAME_VERSION);
        assert_eq!(buf[1], FRAME_FDB_ADD);
        let payload_len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        assert_eq!(buf.len(), FRAME_HDR_LEN + payload_len);
    }

    #[test]
    fn frame_decode_learn() {
        let mut payload = BytesMut::new();
        payload.put_u16(200);
        payload.put_mac(&MacAddr::from([0, 0x11, 0x22, 0x33, 0x44, 0x55]));
        payload.put_u8(1);
        payload.put_u8(10);
        payload.put_slice(b"Ethernet12");

        let event =
            decode_event(FRAME_FDB_LEARN, payload.freeze()).unwrap();
        assert_eq!(
            event,
            SyncdEvent::FdbLearn {
                vlan_id: 200,
                mac: MacAddr::from([0, 0x11, 0x22, 0x33, 0x44, 0x55]),
                mac_type: MacType::Dynamic,
                ifname: "Ethernet12".to_owned(),
            }
        );
    }
}
