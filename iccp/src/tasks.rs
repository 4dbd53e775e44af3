//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use iccp_utils::task::{IntervalTask, Task};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{Sender, UnboundedReceiver, UnboundedSender};
use tracing::{debug_span, Instrument};

use crate::csm::Csm;
use crate::network::tcp;
use crate::southbound::{raw, syncd, SyncdRequest};
use crate::tasks::messages::input::{
    CsmRxMsg, SyncdEventMsg, TcpAcceptMsg, TcpConnectMsg, TopologyEventMsg,
    TransitTickMsg,
};
use crate::tasks::messages::output::CsmTxMsg;

//
// ICCP tasks diagram:
//                                     +--------------+
//                                     |  northbound  |
//                                     +--------------+
//                                           | ^
//                                           V |
//                 +--------------+     +--------------+
// tcp_listener -> |              |     |              |
// tcp_connect  -> |              |     |              |
// csm_rx (Nx)  -> |    event     | --> |   instance   |
// netlink      -> |   channels   |     |  event loop  |
// raw_listener -> |              |     |              | -> csm_tx (Nx)
// syncd_client -> |              |     |              | -> syncd requests
// transit (1s) -> |              |     |              | -> netlink commands
//                 +--------------+     +--------------+
//

// ICCP inter-task message definitions.
pub mod messages {
    use serde::{Deserialize, Serialize};
    use tokio::net::TcpStream;

    use crate::collections::CsmId;
    use crate::error::Error;
    use crate::network::TcpConnInfo;
    use crate::packet::Message;
    use crate::southbound::{SyncdEvent, TopologyEvent};

    // Messages sent to the instance event loop.
    pub mod input {
        use super::*;

        #[derive(Debug)]
        pub struct TcpAcceptMsg {
            pub stream: TcpStream,
            pub conn_info: TcpConnInfo,
        }

        #[derive(Debug)]
        pub struct TcpConnectMsg {
            pub csm_id: CsmId,
            pub stream: TcpStream,
            pub conn_info: TcpConnInfo,
        }

        #[derive(Debug)]
        pub struct CsmRxMsg {
            pub csm_id: CsmId,
            pub msg: Result<Message, Error>,
            // Raw (message type, message ID) of a rejected message, kept
            // for NAK correlation.
            pub rejected: Option<(u16, u32)>,
        }

        #[derive(Debug)]
        pub struct TopologyEventMsg {
            pub event: TopologyEvent,
        }

        #[derive(Debug)]
        pub struct SyncdEventMsg {
            pub event: SyncdEvent,
        }

        #[derive(Debug)]
        pub struct TransitTickMsg {}
    }

    // Messages sent by the instance event loop.
    pub mod output {
        use super::*;

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct CsmTxMsg {
            pub msg: Message,
            pub flush: bool,
        }
    }
}

// ===== ICCP tasks =====

// TCP listening task.
pub(crate) fn tcp_listener(
    listener: &Arc<TcpListener>,
    tcp_acceptp: &Sender<TcpAcceptMsg>,
) -> Task<()> {
    let listener = listener.clone();
    let tcp_acceptp = tcp_acceptp.clone();
    let span = debug_span!("listener");
    Task::spawn(
        async move {
            let _ = tcp::listen_loop(listener, tcp_acceptp).await;
        }
        .instrument(span),
    )
}

// One-shot TCP connection task.
pub(crate) fn tcp_connect(
    csm: &Csm,
    tcp_connectp: &Sender<TcpConnectMsg>,
) -> Task<()> {
    let csm_id = csm.id;
    let local_addr = csm.local_addr;
    let remote_addr = csm.peer_addr;
    let tcp_connectp = tcp_connectp.clone();
    let span = debug_span!("session", peer_addr = %remote_addr);
    Task::spawn(
        async move {
            match tcp::connect(local_addr, remote_addr).await {
                Ok((stream, conn_info)) => {
                    let msg = TcpConnectMsg {
                        csm_id,
                        stream,
                        conn_info,
                    };
                    let _ = tcp_connectp.send(msg).await;
                }
                Err(error) => {
                    error.log();
                }
            }
        }
        .instrument(span),
    )
}

// Per-connection rx/tx task pair.
pub(crate) fn csm_session_tasks(
    csm: &Csm,
    read_half: OwnedReadHalf,
    write_half: OwnedWriteHalf,
    msg_rxp: &Sender<CsmRxMsg>,
) -> (Task<()>, Task<()>, UnboundedSender<CsmTxMsg>) {
    let csm_id = csm.id;
    let peer_addr = csm.peer_addr;

    let rx_span = debug_span!("session", %peer_addr);
    let msg_rxp = msg_rxp.clone();
    let tcp_rx = Task::spawn(
        async move {
            let _ = tcp::csm_read_loop(read_half, csm_id, peer_addr, msg_rxp)
                .await;
        }
        .instrument(rx_span),
    );

    let tx_span = debug_span!("session", %peer_addr);
    let (msg_txp, msg_txc) = tokio::sync::mpsc::unbounded_channel();
    let tcp_tx = Task::spawn(
        async move {
            tcp::csm_write_loop(write_half, msg_txc).await;
        }
        .instrument(tx_span),
    );

    (tcp_rx, tcp_tx, msg_txp)
}

// Packet socket task learning neighbors from ARP and ND traffic.
pub(crate) fn raw_listener(
    socket: std::os::fd::OwnedFd,
    neigh_txp: &Sender<TopologyEventMsg>,
) -> Task<()> {
    let neigh_txp = neigh_txp.clone();
    Task::spawn_blocking(move || {
        raw::read_loop(socket, neigh_txp);
    })
}

// mclagsyncd IPC client task.
pub(crate) fn syncd_client(
    addr: SocketAddr,
    event_txp: &Sender<SyncdEventMsg>,
    request_rxc: UnboundedReceiver<SyncdRequest>,
) -> Task<()> {
    let event_txp = event_txp.clone();
    let span = debug_span!("syncd");
    Task::spawn(
        async move {
            syncd::client_loop(addr, event_txp, request_rxc).await;
        }
        .instrument(span),
    )
}

// Periodic transit task driving heartbeats, timeouts and reconnections.
pub(crate) fn transit_interval(
    transit_txp: &Sender<TransitTickMsg>,
) -> IntervalTask {
    let transit_txp = transit_txp.clone();
    IntervalTask::new(Duration::from_secs(1), false, move || {
        let transit_txp = transit_txp.clone();
        async move {
            let _ = transit_txp.send(TransitTickMsg {}).await;
        }
    })
}
