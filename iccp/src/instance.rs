//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use iccp_utils::task::{IntervalTask, Task};
use iccp_utils::MacAddr;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::mpsc::{Receiver, Sender, UnboundedSender};
use tracing::{info_span, Instrument};

use crate::collections::{Csms, Interfaces};
use crate::debug::Debug;
use crate::error::IoError;
use crate::events;
use crate::southbound::netlink::{self, NetlinkHandle};
use crate::southbound::{raw, syncd, SyncdRequest};
use crate::tasks;
use crate::tasks::messages::input::{CsmRxMsg, TcpConnectMsg};

// Engine configuration, deserialized from the daemon's config file.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InstanceCfg {
    // System MAC. When unset, the MAC of the first learned port is used.
    #[serde(default)]
    pub sys_mac: Option<MacAddr>,
    #[serde(default = "default_syncd_addr")]
    pub syncd_addr: SocketAddr,
    #[serde(default)]
    pub domains: Vec<DomainCfg>,
}

// Per-MLAG-domain configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DomainCfg {
    pub domain_id: u16,
    pub local_addr: Ipv4Addr,
    pub peer_addr: Ipv4Addr,
    #[serde(default)]
    pub peer_link: Option<String>,
    // Heartbeat cadence and dead-peer timeout overrides, in seconds.
    #[serde(default)]
    pub keepalive_interval: Option<u64>,
    #[serde(default)]
    pub session_timeout: Option<u64>,
}

// All protocol state, owned by the instance event-loop task.
pub struct Master {
    pub config: InstanceCfg,
    pub sys_mac: MacAddr,
    pub interfaces: Interfaces,
    pub csms: Csms,
    pub netlink: NetlinkHandle,
    pub syncd_txp: UnboundedSender<SyncdRequest>,
    pub tcp_connectp: Sender<TcpConnectMsg>,
    pub msg_rxp: Sender<CsmRxMsg>,
    // Listening sockets, one per configured local session address.
    pub listeners: HashMap<Ipv4Addr, Listener>,
    pub tasks: MasterTasks,
}

pub struct Listener {
    pub socket: Arc<TcpListener>,
    _task: Task<()>,
}

// Long-lived child tasks.
pub struct MasterTasks {
    _netlink_monitor: Task<()>,
    _raw_listener: Option<Task<()>>,
    _syncd_client: Task<()>,
    _transit: IntervalTask,
}

fn default_syncd_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, syncd::SYNCD_PORT))
}

// ===== impl InstanceCfg =====

impl Default for InstanceCfg {
    fn default() -> InstanceCfg {
        InstanceCfg {
            sys_mac: None,
            syncd_addr: default_syncd_addr(),
            domains: Vec::new(),
        }
    }
}

// ===== impl Master =====

impl Master {
    pub(crate) fn new_listener(
        &mut self,
        local_addr: Ipv4Addr,
        socket: Arc<TcpListener>,
        task: Task<()>,
    ) {
        self.listeners.insert(
            local_addr,
            Listener {
                socket,
                _task: task,
            },
        );
    }
}

// ===== global functions =====

// Runs the engine until the shutdown channel fires.
pub async fn run(config: InstanceCfg, mut shutdown_rxc: Receiver<()>) {
    let span = info_span!("iccp-instance");

    async move {
        Debug::InstanceStart.log();

        // Inter-task channels.
        let (tcp_acceptp, mut tcp_accept_rxc) = mpsc::channel(4);
        let (tcp_connectp, mut tcp_connect_rxc) = mpsc::channel(4);
        let (msg_rxp, mut msg_rxc) = mpsc::channel(1024);
        let (topology_txp, mut topology_rxc) = mpsc::channel(1024);
        let (syncd_event_txp, mut syncd_event_rxc) = mpsc::channel(256);
        let (syncd_txp, syncd_rxc) = mpsc::unbounded_channel();
        let (transit_txp, mut transit_rxc) = mpsc::channel(4);

        // Topology sources: netlink dump/monitor plus the raw packet
        // listener.
        let (netlink, netlink_monitor) =
            netlink::init(topology_txp.clone()).await;
        let raw_listener = match raw::listen_socket() {
            Ok(socket) => Some(tasks::raw_listener(socket, &topology_txp)),
            Err(error) => {
                IoError::PacketSocketError(error).log();
                None
            }
        };

        // mclagsyncd IPC client.
        let syncd_client =
            tasks::syncd_client(config.syncd_addr, &syncd_event_txp, syncd_rxc);

        // Periodic transit pass.
        let transit = tasks::transit_interval(&transit_txp);

        let mut master = Master {
            sys_mac: config.sys_mac.unwrap_or(MacAddr::UNSPECIFIED),
            config,
            interfaces: Default::default(),
            csms: Default::default(),
            netlink,
            syncd_txp,
            tcp_connectp,
            msg_rxp,
            listeners: HashMap::new(),
            tasks: MasterTasks {
                _netlink_monitor: netlink_monitor,
                _raw_listener: raw_listener,
                _syncd_client: syncd_client,
                _transit: transit,
            },
        };

        // Instantiate the configured MLAG domains.
        for domain in master.config.domains.clone() {
            events::process_domain_config(&mut master, &domain, &tcp_acceptp);
        }

        // Main event loop.
        loop {
            tokio::select! {
                Some(msg) = tcp_accept_rxc.recv() => {
                    events::process_tcp_accept(&mut master, msg);
                }
                Some(msg) = tcp_connect_rxc.recv() => {
                    events::process_tcp_connect(&mut master, msg);
                }
                Some(msg) = msg_rxc.recv() => {
                    events::process_csm_msg(&mut master, msg).await;
                }
                Some(msg) = topology_rxc.recv() => {
                    events::process_topology_event(&mut master, msg.event)
                        .await;
                }
                Some(msg) = syncd_event_rxc.recv() => {
                    events::process_syncd_event(&mut master, msg.event);
                }
                Some(_) = transit_rxc.recv() => {
                    events::process_transit(&mut master, &tcp_acceptp).await;
                }
                _ = shutdown_rxc.recv() => {
                    events::process_shutdown(&mut master).await;
                    break;
                }
            }
        }
    }
    .instrument(span)
    .await
}
