//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use iccp_utils::task::TimeoutTask;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::{Sender, UnboundedReceiver};
use tokio::sync::Mutex;

use crate::collections::CsmId;
use crate::error::{Error, IoError};
use crate::network::{self, TcpConnInfo};
use crate::packet::error::DecodeError;
use crate::packet::{DecodeCxt, Message};
use crate::tasks::messages::input::{CsmRxMsg, TcpAcceptMsg};
use crate::tasks::messages::output::CsmTxMsg;

// ===== global functions =====

pub(crate) fn listen_socket(
    addr: Ipv4Addr,
) -> Result<TcpListener, std::io::Error> {
    use tokio::{runtime, task};

    // Create and bind socket.
    let sockaddr = SocketAddr::from((addr, network::ICCP_PORT));
    let socket = task::block_in_place(move || {
        runtime::Handle::current().block_on(TcpListener::bind(sockaddr))
    })?;

    Ok(socket)
}

pub(crate) async fn listen_loop(
    listener: Arc<TcpListener>,
    tcp_acceptp: Sender<TcpAcceptMsg>,
) -> Result<(), SendError<TcpAcceptMsg>> {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => match conn_info(&stream) {
                Ok(conn_info) => {
                    let msg = TcpAcceptMsg { stream, conn_info };
                    tcp_acceptp.send(msg).await?;
                }
                Err(error) => {
                    IoError::TcpInfoError(error).log();
                }
            },
            Err(error) => {
                IoError::TcpAcceptError(error).log();
            }
        }
    }
}

fn connect_socket(local_addr: Ipv4Addr) -> Result<TcpSocket, std::io::Error> {
    let sockaddr = SocketAddr::from((local_addr, 0));
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(sockaddr)?;
    Ok(socket)
}

pub(crate) async fn connect(
    local_addr: Ipv4Addr,
    remote_addr: Ipv4Addr,
) -> Result<(TcpStream, TcpConnInfo), Error> {
    // Create TCP socket bound to the local session address.
    let socket =
        connect_socket(local_addr).map_err(IoError::TcpSocketError)?;

    // Connect to the peer on the ICCP port.
    let sockaddr = SocketAddr::from((remote_addr, network::ICCP_PORT));
    let stream = socket
        .connect(sockaddr)
        .await
        .map_err(IoError::TcpConnectError)?;

    // Obtain TCP connection address/port information.
    let conn_info = conn_info(&stream).map_err(IoError::TcpInfoError)?;

    Ok((stream, conn_info))
}

// Obtains address and port information from a connected stream.
pub(crate) fn conn_info(
    stream: &TcpStream,
) -> Result<TcpConnInfo, std::io::Error> {
    let local = stream.local_addr()?;
    let remote = stream.peer_addr()?;
    let (IpAddr::V4(local_addr), IpAddr::V4(remote_addr)) =
        (local.ip(), remote.ip())
    else {
        return Err(std::io::Error::from(std::io::ErrorKind::Unsupported));
    };

    Ok(TcpConnInfo {
        local_addr,
        local_port: local.port(),
        remote_addr,
        remote_port: remote.port(),
    })
}

async fn csm_send_messages(
    stream: &mut OwnedWriteHalf,
    messages: &mut VecDeque<Message>,
) {
    let mut buf = BytesMut::new();
    for msg in messages.drain(..) {
        msg.encode(&mut buf);
    }
    if let Err(error) = stream.write_all(&buf).await {
        IoError::TcpSendError(error).log();
    }
}

pub(crate) async fn csm_write_loop(
    stream: OwnedWriteHalf,
    mut msg_txc: UnboundedReceiver<CsmTxMsg>,
) {
    let stream_mtx = Arc::new(Mutex::new(stream));
    let messages_mtx = Arc::new(Mutex::new(VecDeque::new()));
    let mut _timeout;

    while let Some(CsmTxMsg { msg, flush, .. }) = msg_txc.recv().await {
        let stream_mtx = stream_mtx.clone();
        let messages_mtx = messages_mtx.clone();

        // Enqueue message.
        messages_mtx.lock().await.push_back(msg);

        // When the `flush` variable is set, send all enqueued messages
        // right away.
        if flush {
            let mut stream = stream_mtx.lock().await;
            let mut messages = messages_mtx.lock().await;
            csm_send_messages(&mut stream, &mut messages).await;
            continue;
        }

        // Schedule the transmission as an attempt to group more messages
        // into the same TCP segment.
        _timeout =
            TimeoutTask::new(Duration::from_millis(100), move || async move {
                let stream_mtx = stream_mtx.clone();
                let messages_mtx = messages_mtx.clone();
                let mut stream = stream_mtx.lock().await;
                let mut messages = messages_mtx.lock().await;

                csm_send_messages(&mut stream, &mut messages).await;
            });
    }
}

pub(crate) async fn csm_read_loop(
    mut stream: OwnedReadHalf,
    csm_id: CsmId,
    peer_addr: Ipv4Addr,
    msg_rxp: Sender<CsmRxMsg>,
) -> Result<(), SendError<CsmRxMsg>> {
    let mut buf = [0; 4096];
    let mut data = Vec::with_capacity(Message::MAX_SIZE);

    // Decode context.
    let cxt = DecodeCxt::default();

    loop {
        // Read data from the network.
        match stream.read(&mut buf).await {
            Ok(0) => {
                // Notify that the connection was closed by the remote end.
                let msg = CsmRxMsg {
                    csm_id,
                    msg: Err(Error::TcpConnClosed(peer_addr)),
                    rejected: None,
                };
                msg_rxp.send(msg).await?;
                return Ok(());
            }
            Ok(num_bytes) => data.extend_from_slice(&buf[0..num_bytes]),
            Err(error) => {
                IoError::TcpRecvError(error).log();
                continue;
            }
        };

        // Decode complete message(s).
        loop {
            let msg_size = match Message::get_size(&data, &cxt) {
                Ok(msg_size) => msg_size,
                // Wait for more data.
                Err(DecodeError::IncompleteMessage) => break,
                Err(error) => {
                    // Unrecoverable framing error. Notify and discard the
                    // buffered data.
                    let msg = CsmRxMsg {
                        csm_id,
                        msg: Err(Error::CsmMsgDecodeError(peer_addr, error)),
                        rejected: rejected_hdr(&data),
                    };
                    msg_rxp.send(msg).await?;
                    data.clear();
                    break;
                }
            };

            let rejected = rejected_hdr(&data);
            let msg = Message::decode(&data[0..msg_size], &cxt);
            data.drain(0..msg_size);

            match msg {
                // Unknown message type with the U-bit set, skip.
                Ok(None) => continue,
                Ok(Some(msg)) => {
                    let msg = CsmRxMsg {
                        csm_id,
                        msg: Ok(msg),
                        rejected: None,
                    };
                    msg_rxp.send(msg).await?;
                }
                Err(error) => {
                    let msg = CsmRxMsg {
                        csm_id,
                        msg: Err(Error::CsmMsgDecodeError(peer_addr, error)),
                        rejected,
                    };
                    msg_rxp.send(msg).await?;
                }
            }
        }
    }
}

// Extracts (message type, message ID) from a raw message header, for NAK
// correlation.
fn rejected_hdr(data: &[u8]) -> Option<(u16, u32)> {
    if data.len() < Message::HDR_SIZE as usize {
        return None;
    }
    let msg_type = u16::from_be_bytes([data[1], data[2]]);
    let msg_id = u32::from_be_bytes([data[5], data[6], data[7], data[8]]);
    Some((msg_type, msg_id))
}
