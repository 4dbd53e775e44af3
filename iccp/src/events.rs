//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use iccp_utils::MacAddr;
use ipnetwork::IpNetwork;
use tokio::sync::mpsc::{Sender, UnboundedSender};

use crate::collections::{CsmIndex, Csms, Interfaces};
use crate::consistency;
use crate::csm::{self, Csm};
use crate::debug::Debug;
use crate::error::{Error, IoError};
use crate::instance::{DomainCfg, Master};
use crate::interface::{InterfaceType, LocalInterface};
use crate::mlacp;
use crate::network::tcp;
use crate::packet::error::DecodeError;
use crate::packet::messages::notification::{NakMsg, StatusCode};
use crate::packet::messages::{
    AggConfigMsg, AggOp, AggStateMsg, ArpInfoMsg, MacInfoMsg, NdiscInfoMsg,
    NeighFlags, PeerLinkInfoMsg, PeerLinkType, PortChannelInfoMsg,
    SysConfigMsg, TableOp, TlvAggConfig, TlvAggState, TlvPeerLinkInfo,
    TlvPortChannelInfo, TlvSysConfig,
};
use crate::packet::{Message, MessageType};
use crate::southbound::netlink::NetlinkHandle;
use crate::southbound::{LinkUpdate, SyncdEvent, SyncdRequest, TopologyEvent};
use crate::sync::arp::ArpAction;
use crate::sync::mac::MacAction;
use crate::sync::ndisc::NdiscAction;
use crate::sync::EgressCxt;
use crate::tasks;
use crate::tasks::messages::input::{
    CsmRxMsg, TcpAcceptMsg, TcpConnectMsg,
};

// Number of table entries grouped into one bulk-sync message.
const BULK_CHUNK: usize = 64;

// ===== configuration events =====

pub(crate) fn process_domain_config(
    master: &mut Master,
    cfg: &DomainCfg,
    tcp_acceptp: &Sender<TcpAcceptMsg>,
) {
    let (csm_idx, csm) =
        master
            .csms
            .insert(cfg.domain_id, cfg.local_addr, cfg.peer_addr);
    csm.peer_link = cfg.peer_link.clone();
    if let Some(secs) = cfg.keepalive_interval {
        csm.heartbeat_interval = Duration::from_secs(secs);
    }
    if let Some(secs) = cfg.session_timeout {
        csm.heartbeat_timeout = Duration::from_secs(secs);
    }
    let csm_id = csm.id;

    // Bind the peer-link when the kernel already reported it.
    if let Some(peer_link) = &cfg.peer_link {
        if let Some((_, iface)) = master.interfaces.get_mut_by_name(peer_link)
        {
            iface.is_peer_link = true;
            iface.csm_id = Some(csm_id);
            Debug::InterfaceBind(peer_link, cfg.domain_id).log();
        }
    }

    csm_startup(master, csm_idx, tcp_acceptp);
}

// Evaluates whether a NonExistent session can start forming, and in which
// direction.
fn csm_startup(
    master: &mut Master,
    csm_idx: CsmIndex,
    tcp_acceptp: &Sender<TcpAcceptMsg>,
) {
    let csm = &master.csms[csm_idx];
    if csm.state != csm::fsm::State::NonExistent
        || !csm.config_complete(&master.interfaces)
    {
        return;
    }

    match csm.is_initiator() {
        Ok(true) => {
            let Master {
                csms, tcp_connectp, ..
            } = master;
            let csm = &mut csms[csm_idx];
            let _ = csm.fsm_event(csm::fsm::Event::StartConnect);
            csm.connect(tcp_connectp);
        }
        Ok(false) => {
            let local_addr = csm.local_addr;
            ensure_listener(master, local_addr, tcp_acceptp);
            let _ =
                master.csms[csm_idx].fsm_event(csm::fsm::Event::StartListen);
        }
        Err(error) => {
            error.log();
        }
    }
}

fn ensure_listener(
    master: &mut Master,
    local_addr: Ipv4Addr,
    tcp_acceptp: &Sender<TcpAcceptMsg>,
) {
    if master.listeners.contains_key(&local_addr) {
        return;
    }
    match tcp::listen_socket(local_addr) {
        Ok(socket) => {
            let socket = Arc::new(socket);
            let task = tasks::tcp_listener(&socket, tcp_acceptp);
            master.new_listener(local_addr, socket, task);
        }
        Err(error) => {
            IoError::TcpSocketError(error).log();
        }
    }
}

// ===== TCP connection events =====

pub(crate) fn process_tcp_accept(master: &mut Master, msg: TcpAcceptMsg) {
    let sys_mac = master.sys_mac;
    let Master { csms, msg_rxp, .. } = master;

    // Only configured peers may connect.
    let remote_addr = msg.conn_info.remote_addr;
    let Some((_, csm)) = csms.get_mut_by_peer_addr(&remote_addr) else {
        Error::TcpInvalidConnRequest(IpAddr::V4(remote_addr)).log();
        return;
    };

    // A session is already forming or formed, drop the new connection.
    if csm.state != csm::fsm::State::Listening {
        return;
    }

    csm.session_up(msg.stream, msg.conn_info, msg_rxp);
    if let Some(csm::fsm::Action::StartSession) =
        csm.fsm_event(csm::fsm::Event::ConnectionUp)
    {
        mlacp_session_start(csm, sys_mac);
    }
}

pub(crate) fn process_tcp_connect(master: &mut Master, msg: TcpConnectMsg) {
    let sys_mac = master.sys_mac;
    let Master { csms, msg_rxp, .. } = master;

    let csm = match csms.get_mut_by_id(msg.csm_id) {
        Ok((_, csm)) => csm,
        Err(error) => {
            error.log();
            return;
        }
    };

    if csm.state != csm::fsm::State::Connecting {
        return;
    }

    csm.session_up(msg.stream, msg.conn_info, msg_rxp);
    if let Some(csm::fsm::Action::StartSession) =
        csm.fsm_event(csm::fsm::Event::ConnectionUp)
    {
        mlacp_session_start(csm, sys_mac);
    }
}

fn mlacp_session_start(csm: &mut Csm, sys_mac: MacAddr) {
    csm.mlacp.advance(mlacp::fsm::State::SysConfigExchange);
    send_sys_config(csm, sys_mac);
}

// ===== peer message events =====

pub(crate) async fn process_csm_msg(master: &mut Master, msg: CsmRxMsg) {
    let csm_idx = match master.csms.get_by_id(msg.csm_id) {
        Ok((csm_idx, _)) => csm_idx,
        Err(error) => {
            error.log();
            return;
        }
    };

    match msg.msg {
        Ok(message) => {
            process_csm_message(master, csm_idx, message).await;
        }
        Err(error) => {
            error.log();
            match error {
                Error::TcpConnClosed(..) => {
                    session_down(
                        master,
                        csm_idx,
                        csm::fsm::Event::ConnectionDown,
                    )
                    .await;
                }
                Error::CsmMsgDecodeError(_, decode_error) => {
                    // Protocol errors are NAKed, never fatal to the session.
                    let status = match decode_error {
                        DecodeError::UnknownMessage(..) => {
                            StatusCode::UnknownMessage
                        }
                        _ => StatusCode::MalformedMessage,
                    };
                    if let Some(rejected) = msg.rejected {
                        master.csms[csm_idx].send_nak(rejected, status);
                    }
                }
                _ => (),
            }
        }
    }
}

async fn process_csm_message(
    master: &mut Master,
    csm_idx: CsmIndex,
    msg: Message,
) {
    {
        let csm = &mut master.csms[csm_idx];
        Debug::CsmMsgRx(&csm.peer_addr, &msg).log();
        // Any message proves peer liveness.
        csm.last_heartbeat_rx = Instant::now();
    }

    match msg {
        Message::Heartbeat(_) => (),
        Message::Nak(msg) => {
            process_nak(master, csm_idx, &msg);
        }
        Message::SysConfig(msg) => {
            process_sys_config(master, csm_idx, &msg.sys_config).await;
        }
        Message::AggConfig(msg) => {
            let csm = &mut master.csms[csm_idx];
            csm.mlacp.process_agg_config(&msg.agg_config);
            consistency_check(
                &master.interfaces,
                &master.csms[csm_idx],
                &msg.agg_config.ifname,
            );
        }
        Message::AggState(msg) => {
            master.csms[csm_idx].mlacp.process_agg_state(&msg.agg_state);
        }
        Message::PortChannelInfo(msg) => {
            let updated = master.csms[csm_idx]
                .mlacp
                .process_port_channel_info(&msg.port_channel);
            if let Some(ifname) = updated {
                consistency_check(
                    &master.interfaces,
                    &master.csms[csm_idx],
                    &ifname,
                );
            }
        }
        Message::PeerLinkInfo(msg) => {
            master.csms[csm_idx]
                .mlacp
                .process_peer_link_info(&msg.peer_link);
        }
        Message::MacInfo(msg) => {
            process_mac_info(master, csm_idx, &msg.entries);
        }
        Message::ArpInfo(msg) => {
            process_arp_info(master, csm_idx, &msg.entries).await;
        }
        Message::NdiscInfo(msg) => {
            process_ndisc_info(master, csm_idx, &msg.entries).await;
        }
        Message::Warmboot(msg) => {
            let csm = &mut master.csms[csm_idx];
            if msg.warmboot.restarting {
                Debug::CsmWarmbootRx(&csm.peer_addr).log();
            }
            csm.mlacp.peer_warmboot = msg.warmboot.restarting;
        }
    }
}

// Correlates a received NAK against the message log and re-routes
// table-sync NAKs to their bulk handlers.
fn process_nak(master: &mut Master, csm_idx: CsmIndex, msg: &NakMsg) {
    let sys_mac = master.sys_mac;
    let csm = &mut master.csms[csm_idx];
    Error::CsmRcvdNak(csm.peer_addr, msg.status.status).log();

    let Some(msg_type) = csm
        .msg_log_find(msg.status.rej_msg_id)
        .or_else(|| msg.rejected_type())
    else {
        return;
    };
    match msg_type {
        MessageType::SysConfig => send_sys_config(csm, sys_mac),
        MessageType::MacInfo => send_mac_bulk(csm),
        MessageType::ArpInfo => send_arp_bulk(csm),
        MessageType::NdiscInfo => send_ndisc_bulk(csm),
        _ => (),
    }
}

async fn process_sys_config(
    master: &mut Master,
    csm_idx: CsmIndex,
    tlv: &TlvSysConfig,
) {
    let sys_mac = master.sys_mac;
    let run_exchange = {
        let csm = &mut master.csms[csm_idx];
        if csm.mlacp.process_sys_config(tlv) {
            // Node ID conflict. Announce the reassigned identity.
            send_sys_config(csm, sys_mac);
        }
        csm.mlacp.state < mlacp::fsm::State::AggSync
    };

    // The first peer system config drives the rest of the exchange.
    if run_exchange {
        mlacp_exchange(master, csm_idx).await;
    }
}

// Aggregate/VLAN configuration sync followed by the bulk table sync. The
// session becomes Operational once everything has been sent.
async fn mlacp_exchange(master: &mut Master, csm_idx: CsmIndex) {
    let sys_mac = master.sys_mac;
    {
        let Master {
            csms,
            interfaces,
            syncd_txp,
            ..
        } = master;
        let csm = &mut csms[csm_idx];
        csm.mlacp.advance(mlacp::fsm::State::AggSync);

        // Announce the peer-link.
        if let Some(peer_link) = csm.peer_link.clone() {
            if let Some((_, iface)) = interfaces.get_by_name(&peer_link) {
                let port_type = match iface.itype {
                    InterfaceType::PortChannel => PeerLinkType::PortChannel,
                    InterfaceType::Vlan => PeerLinkType::Vlan,
                    _ => PeerLinkType::Ethernet,
                };
                let msg_id = csm.get_next_msg_id();
                csm.send_message(
                    PeerLinkInfoMsg::new(
                        msg_id,
                        TlvPeerLinkInfo::new(port_type, peer_link),
                    )
                    .into(),
                    false,
                );
            }
        }

        // Announce every local MLAG port-channel: configuration, full
        // snapshot and current state.
        let csm_id = csm.id;
        for iface in interfaces
            .iter()
            .filter(|iface| is_mlag_agg(iface, csm_id))
        {
            send_agg_config(csm, iface, AggOp::Create);
            send_port_channel_info(csm, iface);
            send_agg_state(csm, iface);
        }

        // Bulk table sync.
        send_mac_bulk(csm);
        send_arp_bulk(csm);
        send_ndisc_bulk(csm);

        csm.mlacp.advance(mlacp::fsm::State::Exchange);
        let _ = csm.fsm_event(csm::fsm::Event::ExchangeDone);

        let _ = syncd_txp.send(SyncdRequest::SetIccpState {
            domain_id: csm.domain_id,
            up: true,
        });
        let _ = syncd_txp.send(SyncdRequest::SetIccpRole {
            domain_id: csm.domain_id,
            active: csm.mlacp.role_active,
            sys_mac: csm.mlacp.effective_sys_mac(sys_mac),
        });

        isolation_update(interfaces, syncd_txp, csm);
    }

    standby_mac_update(master, csm_idx).await;
}

fn process_mac_info(
    master: &mut Master,
    csm_idx: CsmIndex,
    entries: &[crate::packet::messages::TlvMacEntry],
) {
    let Master {
        csms,
        interfaces,
        syncd_txp,
        ..
    } = master;
    let csm = &mut csms[csm_idx];
    let peer_link = csm.peer_link.clone();
    let cxt = EgressCxt {
        interfaces,
        peer_link: peer_link.as_deref(),
    };

    let mut actions = Vec::new();
    for tlv in entries {
        match tlv.op {
            TableOp::Add => {
                actions.extend(csm.mlacp.mac_table.process_peer_add(tlv, &cxt));
            }
            TableOp::Del => {
                actions.extend(
                    csm.mlacp.mac_table.process_peer_del(tlv.vlan_id, tlv.mac),
                );
            }
        }
    }
    apply_mac_actions(csm, syncd_txp, actions);
}

async fn process_arp_info(
    master: &mut Master,
    csm_idx: CsmIndex,
    entries: &[crate::packet::messages::TlvArpEntry],
) {
    let Master {
        csms,
        interfaces,
        netlink,
        ..
    } = master;
    let csm = &mut csms[csm_idx];
    let peer_link = csm.peer_link.clone();
    let cxt = EgressCxt {
        interfaces,
        peer_link: peer_link.as_deref(),
    };

    let mut actions = Vec::new();
    for tlv in entries {
        match tlv.op {
            TableOp::Add => {
                actions.extend(csm.mlacp.arp_table.process_peer_add(tlv, &cxt));
            }
            TableOp::Del => {
                actions.extend(
                    csm.mlacp
                        .arp_table
                        .process_peer_del(tlv.vlan_id, tlv.ipv4_addr),
                );
            }
        }
    }
    apply_arp_actions(csm, interfaces, netlink, actions).await;
}

async fn process_ndisc_info(
    master: &mut Master,
    csm_idx: CsmIndex,
    entries: &[crate::packet::messages::TlvNdiscEntry],
) {
    let Master {
        csms,
        interfaces,
        netlink,
        ..
    } = master;
    let csm = &mut csms[csm_idx];
    let peer_link = csm.peer_link.clone();
    let cxt = EgressCxt {
        interfaces,
        peer_link: peer_link.as_deref(),
    };

    let mut actions = Vec::new();
    for tlv in entries {
        match tlv.op {
            TableOp::Add => {
                actions
                    .extend(csm.mlacp.ndisc_table.process_peer_add(tlv, &cxt));
            }
            TableOp::Del => {
                actions.extend(
                    csm.mlacp
                        .ndisc_table
                        .process_peer_del(tlv.vlan_id, tlv.ipv6_addr),
                );
            }
        }
    }
    apply_ndisc_actions(csm, interfaces, netlink, actions).await;
}

// ===== topology events =====

pub(crate) async fn process_topology_event(
    master: &mut Master,
    event: TopologyEvent,
) {
    match event {
        TopologyEvent::LinkUpsert(link) => {
            process_link_upsert(master, link).await;
        }
        TopologyEvent::LinkDelete { ifindex } => {
            process_link_delete(master, ifindex);
        }
        TopologyEvent::AddrAdd { ifindex, addr } => {
            process_addr(master, ifindex, addr, false).await;
        }
        TopologyEvent::AddrDel { ifindex, addr } => {
            process_addr(master, ifindex, addr, true).await;
        }
        TopologyEvent::NeighUpsert {
            ifindex,
            addr,
            lladdr,
        } => {
            process_neigh_upsert(master, ifindex, addr, lladdr).await;
        }
        TopologyEvent::NeighDelete { ifindex, addr } => {
            process_neigh_delete(master, ifindex, addr).await;
        }
    }
}

async fn process_link_upsert(master: &mut Master, link: LinkUpdate) {
    // The system MAC defaults to the MAC of the first learned port.
    if master.sys_mac.is_unspecified()
        && link.itype == InterfaceType::Port
        && !link.mac.is_unspecified()
    {
        master.sys_mac = link.mac;
        sys_config_replay(&mut master.csms, link.mac);
    }

    let old_state = master
        .interfaces
        .get_by_name(&link.ifname)
        .filter(|(_, iface)| !iface.purged)
        .map(|(_, iface)| iface.is_up());

    {
        let (_, iface) = master.interfaces.insert(&link.ifname, link.itype);
        if old_state.is_none() {
            Debug::InterfaceCreate(&link.ifname).log();
        }
        iface.admin_up = link.admin_up;
        iface.oper_up = link.oper_up;
        if !link.mac.is_unspecified() {
            if iface.orig_mac.is_unspecified() {
                iface.orig_mac = link.mac;
            }
            iface.mac = link.mac;
        }
        iface.master = link.master;
    }
    master
        .interfaces
        .update_ifindex(&link.ifname, Some(link.ifindex));

    bind_interface(master, &link);

    // VLAN membership bookkeeping.
    if link.itype == InterfaceType::Vlan {
        if let Some(vlan_id) = svi_vlan_id(&link.ifname) {
            vlan_membership_add(&mut master.interfaces, vlan_id);
            if let Some((_, iface)) =
                master.interfaces.get_mut_by_name(&link.ifname)
            {
                iface.vlan_ids.insert(vlan_id);
            }
        }
    } else {
        inherit_svi_vlans(&mut master.interfaces, &link.ifname);
    }

    link_sync(master, &link.ifname, old_state);
}

// Attaches a new interface to its owning MLAG domain.
fn bind_interface(master: &mut Master, link: &LinkUpdate) {
    let ifname = &link.ifname;
    match master.interfaces.get_by_name(ifname) {
        Some((_, iface)) if iface.csm_id.is_none() => (),
        _ => return,
    }

    // (CSM id, domain id, peer-link flag).
    let mut bind = None;

    if let Some(domain) = master
        .config
        .domains
        .iter()
        .find(|domain| domain.peer_link.as_deref() == Some(ifname.as_str()))
    {
        if let Some((_, csm)) = master.csms.get_by_domain_id(domain.domain_id)
        {
            bind = Some((csm.id, csm.domain_id, true));
        }
    } else {
        match link.itype {
            // MLAG port-channels belong to the configured domain.
            InterfaceType::PortChannel => {
                if let Some(csm) = master.csms.iter().next() {
                    bind = Some((csm.id, csm.domain_id, false));
                }
            }
            // Member ports bind through their parent aggregate.
            InterfaceType::Port => {
                if let Some(parent_ifindex) = link.master {
                    match master.interfaces.get_by_ifindex(parent_ifindex) {
                        Some((_, parent)) => {
                            if let Some(csm_id) = parent.csm_id {
                                if let Ok((_, csm)) =
                                    master.csms.get_by_id(csm_id)
                                {
                                    bind =
                                        Some((csm.id, csm.domain_id, false));
                                }
                            }
                        }
                        None => {
                            Error::InterfaceParentNotFound(
                                ifname.clone(),
                                parent_ifindex.to_string(),
                            )
                            .log();
                        }
                    }
                }
            }
            _ => (),
        }
    }

    if let Some((csm_id, domain_id, is_peer_link)) = bind {
        if let Some((_, iface)) = master.interfaces.get_mut_by_name(ifname) {
            iface.csm_id = Some(csm_id);
            iface.is_peer_link = is_peer_link;
            Debug::InterfaceBind(ifname, domain_id).log();
        }
    }
}

// Propagates a local link change to the peer and re-resolves the egress of
// the synchronized entries.
fn link_sync(master: &mut Master, ifname: &str, old_state: Option<bool>) {
    let Master {
        csms,
        interfaces,
        syncd_txp,
        ..
    } = master;

    let announce = {
        let Some((_, iface)) = interfaces.get_by_name(ifname) else {
            return;
        };
        let Some(csm_id) = iface.csm_id else {
            return;
        };
        let csm = match csms.get_mut_by_id(csm_id) {
            Ok((_, csm)) => csm,
            Err(error) => {
                error.log();
                return;
            }
        };
        if csm.state != csm::fsm::State::Operational {
            return;
        }

        let state_changed = old_state != Some(iface.is_up());
        if is_mlag_agg(iface, csm_id) {
            if old_state.is_none() {
                send_agg_config(csm, iface, AggOp::Create);
                send_port_channel_info(csm, iface);
            }
            if old_state.is_none() || state_changed {
                send_agg_state(csm, iface);
            }
        }
        state_changed
    };

    if announce {
        refresh_egress(csms, interfaces, syncd_txp);
    }
}

fn process_link_delete(master: &mut Master, ifindex: u32) {
    let Master {
        csms,
        interfaces,
        syncd_txp,
        ..
    } = master;

    let Some((iface_idx, iface)) = interfaces.get_mut_by_ifindex(ifindex)
    else {
        return;
    };
    let ifname = iface.name.clone();
    let itype = iface.itype;
    let is_mlag = is_mlag_agg(iface, iface.csm_id.unwrap_or(0));
    let csm_id = iface.csm_id;
    let mac = iface.mac;
    iface.admin_up = false;
    iface.oper_up = false;

    Debug::InterfaceDelete(&ifname).log();

    // Deferred free: keep the entry reachable by name while the owning CSM
    // is mid-exchange.
    let mut defer = false;
    if let Some(csm_id) = csm_id {
        if let Ok((_, csm)) = csms.get_mut_by_id(csm_id) {
            if csm.state == csm::fsm::State::Operational && is_mlag {
                let msg_id = csm.get_next_msg_id();
                csm.send_message(
                    AggConfigMsg::new(
                        msg_id,
                        TlvAggConfig::new(
                            agg_id(&ifname),
                            AggOp::Remove,
                            mac,
                            ifname.clone(),
                        ),
                    )
                    .into(),
                    true,
                );
            }
            if csm.state >= csm::fsm::State::Established {
                defer = true;
            }
        }
    }

    if defer {
        if let Some((_, iface)) = interfaces.get_mut_by_ifindex(ifindex) {
            iface.purged = true;
        }
    } else {
        if csm_id.is_some() {
            Debug::InterfaceUnbind(&ifname).log();
        }
        interfaces.delete(iface_idx);
    }

    // An SVI going away retracts its VLAN from the membership sets.
    if itype == InterfaceType::Vlan {
        if let Some(vlan_id) = svi_vlan_id(&ifname) {
            vlan_membership_del(interfaces, vlan_id);
        }
    }

    refresh_egress(csms, interfaces, syncd_txp);
}

async fn process_addr(
    master: &mut Master,
    ifindex: u32,
    addr: IpNetwork,
    del: bool,
) {
    let (ifname, itype) = {
        let Some((_, iface)) = master.interfaces.get_mut_by_ifindex(ifindex)
        else {
            return;
        };
        match addr {
            IpNetwork::V4(net) => {
                if del {
                    if iface.ipv4_addr == Some(net.ip()) {
                        iface.ipv4_addr = None;
                        iface.ipv4_prefixlen = 0;
                    }
                } else {
                    iface.ipv4_addr = Some(net.ip());
                    iface.ipv4_prefixlen = net.prefix();
                }
            }
            IpNetwork::V6(net) => {
                if del {
                    if iface.ipv6_addr == Some(net.ip()) {
                        iface.ipv6_addr = None;
                        iface.ipv6_prefixlen = 0;
                    }
                } else {
                    iface.ipv6_addr = Some(net.ip());
                    iface.ipv6_prefixlen = net.prefix();
                }
            }
        }
        (iface.name.clone(), iface.itype)
    };

    match itype {
        // L3 mode and address changes of an MLAG port-channel are part of
        // its configuration snapshot.
        InterfaceType::PortChannel => {
            let Master {
                csms, interfaces, ..
            } = master;
            let Some((_, iface)) = interfaces.get_by_name(&ifname) else {
                return;
            };
            let Some(csm_id) = iface.csm_id else {
                return;
            };
            if let Ok((_, csm)) = csms.get_mut_by_id(csm_id) {
                if csm.state == csm::fsm::State::Operational
                    && is_mlag_agg(iface, csm_id)
                {
                    send_port_channel_info(csm, iface);
                }
            }
        }
        // SVI addresses are announced as self-owned neighbor entries so the
        // peer installs them as permanent neighbors.
        InterfaceType::Vlan => {
            announce_self_addr(master, &ifname, addr, del).await;
        }
        _ => (),
    }
}

async fn announce_self_addr(
    master: &mut Master,
    ifname: &str,
    addr: IpNetwork,
    del: bool,
) {
    let Master {
        csms,
        interfaces,
        netlink,
        ..
    } = master;
    let Some(vlan_id) = svi_vlan_id(ifname) else {
        return;
    };
    let Some((_, iface)) = interfaces.get_by_name(ifname) else {
        return;
    };
    let mac = iface.mac;

    let csm_indexes = csms.indexes().collect::<Vec<_>>();
    for csm_idx in csm_indexes {
        let csm = &mut csms[csm_idx];
        if csm.state != csm::fsm::State::Operational {
            continue;
        }

        match addr {
            IpNetwork::V4(net) => {
                let actions = if del {
                    csm.mlacp.arp_table.process_local_age(vlan_id, net.ip())
                } else {
                    csm.mlacp.arp_table.process_local_learn(
                        vlan_id,
                        net.ip(),
                        mac,
                        NeighFlags::SELF_IP,
                        ifname,
                    )
                };
                apply_arp_actions(csm, interfaces, netlink, actions).await;
            }
            IpNetwork::V6(net) => {
                let flags = if is_link_local(&net.ip()) {
                    NeighFlags::SELF_LL
                } else {
                    NeighFlags::SELF_IP
                };
                let actions = if del {
                    csm.mlacp.ndisc_table.process_local_age(vlan_id, net.ip())
                } else {
                    csm.mlacp.ndisc_table.process_local_learn(
                        vlan_id,
                        net.ip(),
                        mac,
                        flags,
                        ifname,
                    )
                };
                apply_ndisc_actions(csm, interfaces, netlink, actions).await;
            }
        }
    }
}

async fn process_neigh_upsert(
    master: &mut Master,
    ifindex: u32,
    addr: IpAddr,
    lladdr: MacAddr,
) {
    let Master {
        csms,
        interfaces,
        netlink,
        ..
    } = master;

    // Only neighbors learned on an SVI are synchronized.
    let Some((_, iface)) = interfaces.get_by_ifindex(ifindex) else {
        return;
    };
    if iface.itype != InterfaceType::Vlan || iface.purged {
        return;
    }
    let Some(vlan_id) = svi_vlan_id(&iface.name) else {
        return;
    };
    let ifname = iface.name.clone();

    let csm_indexes = csms.indexes().collect::<Vec<_>>();
    for csm_idx in csm_indexes {
        let csm = &mut csms[csm_idx];
        if csm.state != csm::fsm::State::Operational {
            continue;
        }

        match addr {
            IpAddr::V4(addr) => {
                let actions = csm.mlacp.arp_table.process_local_learn(
                    vlan_id,
                    addr,
                    lladdr,
                    NeighFlags::empty(),
                    &ifname,
                );
                apply_arp_actions(csm, interfaces, netlink, actions).await;
            }
            IpAddr::V6(addr) => {
                let actions = csm.mlacp.ndisc_table.process_local_learn(
                    vlan_id,
                    addr,
                    lladdr,
                    NeighFlags::empty(),
                    &ifname,
                );
                apply_ndisc_actions(csm, interfaces, netlink, actions).await;
            }
        }
    }
}

async fn process_neigh_delete(
    master: &mut Master,
    ifindex: u32,
    addr: IpAddr,
) {
    let Master {
        csms,
        interfaces,
        netlink,
        ..
    } = master;

    let Some((_, iface)) = interfaces.get_by_ifindex(ifindex) else {
        return;
    };
    if iface.itype != InterfaceType::Vlan {
        return;
    }
    let Some(vlan_id) = svi_vlan_id(&iface.name) else {
        return;
    };

    let csm_indexes = csms.indexes().collect::<Vec<_>>();
    for csm_idx in csm_indexes {
        let csm = &mut csms[csm_idx];
        match addr {
            IpAddr::V4(addr) => {
                let actions =
                    csm.mlacp.arp_table.process_local_age(vlan_id, addr);
                apply_arp_actions(csm, interfaces, netlink, actions).await;
            }
            IpAddr::V6(addr) => {
                let actions =
                    csm.mlacp.ndisc_table.process_local_age(vlan_id, addr);
                apply_ndisc_actions(csm, interfaces, netlink, actions).await;
            }
        }
    }
}

// ===== syncd events =====

pub(crate) fn process_syncd_event(master: &mut Master, event: SyncdEvent) {
    let Master {
        csms,
        interfaces,
        syncd_txp,
        ..
    } = master;

    let csm_indexes = csms.indexes().collect::<Vec<_>>();
    for csm_idx in csm_indexes {
        let csm = &mut csms[csm_idx];
        if csm.state != csm::fsm::State::Operational {
            continue;
        }

        match &event {
            SyncdEvent::FdbLearn {
                vlan_id,
                mac,
                mac_type,
                ifname,
            } => {
                let actions = csm.mlacp.mac_table.process_local_learn(
                    *vlan_id, *mac, *mac_type, ifname,
                );
                apply_mac_actions(csm, syncd_txp, actions);
            }
            SyncdEvent::FdbAge { vlan_id, mac, .. } => {
                let peer_link = csm.peer_link.clone();
                let cxt = EgressCxt {
                    interfaces,
                    peer_link: peer_link.as_deref(),
                };
                let actions =
                    csm.mlacp.mac_table.process_local_age(*vlan_id, *mac, &cxt);
                apply_mac_actions(csm, syncd_txp, actions);
            }
        }
    }
}

// ===== transit events =====

// Runs one transit pass over every CSM so time-based transitions progress
// when the system is otherwise idle.
pub(crate) async fn process_transit(
    master: &mut Master,
    tcp_acceptp: &Sender<TcpAcceptMsg>,
) {
    let csm_indexes = master.csms.indexes().collect::<Vec<_>>();
    for csm_idx in csm_indexes {
        match master.csms[csm_idx].state {
            csm::fsm::State::NonExistent => {
                csm_startup(master, csm_idx, tcp_acceptp);
            }
            csm::fsm::State::Connecting => {
                let Master {
                    csms, tcp_connectp, ..
                } = master;
                csms[csm_idx].connect(tcp_connectp);
            }
            csm::fsm::State::Listening => (),
            csm::fsm::State::Established | csm::fsm::State::Operational => {
                if master.csms[csm_idx].heartbeat_timed_out() {
                    let peer_addr = master.csms[csm_idx].peer_addr;
                    Error::CsmHeartbeatTimeout(peer_addr).log();
                    session_down(
                        master,
                        csm_idx,
                        csm::fsm::Event::HeartbeatTimeout,
                    )
                    .await;
                } else {
                    master.csms[csm_idx].send_heartbeat();
                }
            }
        }
    }
}

// ===== shutdown =====

// Warm reboot: every Operational session emits a drain notification before
// the event loop exits.
pub(crate) async fn process_shutdown(master: &mut Master) {
    Debug::InstanceStop("shutdown").log();

    let csm_indexes = master.csms.indexes().collect::<Vec<_>>();
    for csm_idx in csm_indexes {
        let csm = &mut master.csms[csm_idx];
        if csm.state == csm::fsm::State::Operational {
            csm.send_warmboot();
        }
    }

    // Give the write tasks a moment to flush before their handles drop.
    tokio::time::sleep(Duration::from_millis(100)).await;
}

// ===== session teardown =====

// Closes the session exactly once: drops the connection tasks, notifies
// syncd, ages out the peer side of the synchronized tables and compacts
// tombstoned interfaces.
async fn session_down(
    master: &mut Master,
    csm_idx: CsmIndex,
    event: csm::fsm::Event,
) {
    let Master {
        csms,
        interfaces,
        netlink,
        syncd_txp,
        ..
    } = master;
    let csm = &mut csms[csm_idx];

    if csm.fsm_event(event) != Some(csm::fsm::Action::Reset) {
        return;
    }

    let _ = syncd_txp.send(SyncdRequest::SetIccpState {
        domain_id: csm.domain_id,
        up: false,
    });

    // A warmbooting peer comes right back; keep the synchronized state and
    // the floating MAC in place.
    if !csm.mlacp.peer_warmboot {
        let (mac_actions, arp_actions, ndisc_actions) =
            csm.mlacp.age_peer_tables();
        apply_mac_actions(csm, syncd_txp, mac_actions);
        apply_arp_actions(csm, interfaces, netlink, arp_actions).await;
        apply_ndisc_actions(csm, interfaces, netlink, ndisc_actions).await;

        // Restore the original port-channel identities on the standby side.
        if !csm.mlacp.role_active {
            let csm_id = csm.id;
            let mut restores = Vec::new();
            for iface in interfaces.iter_mut() {
                if iface.csm_id != Some(csm_id) || iface.is_peer_link {
                    continue;
                }
                if !iface.orig_mac.is_unspecified()
                    && iface.mac != iface.orig_mac
                {
                    iface.mac = iface.orig_mac;
                    if let Some(ifindex) = iface.ifindex {
                        restores.push((
                            ifindex,
                            iface.name.clone(),
                            iface.orig_mac,
                        ));
                    }
                }
            }
            for (ifindex, ifname, mac) in restores {
                netlink.link_set_mac(ifindex, mac).await;
                let _ =
                    syncd_txp.send(SyncdRequest::SetIntfMac { ifname, mac });
            }
        }
    }

    csm.session_down();

    // Compact interfaces tombstoned while the exchange was running.
    interfaces.purge();
}

// ===== helper functions =====

fn is_mlag_agg(iface: &LocalInterface, csm_id: usize) -> bool {
    !iface.purged
        && !iface.is_peer_link
        && iface.itype == InterfaceType::PortChannel
        && iface.csm_id == Some(csm_id)
}

// SONiC port-channel and SVI names carry their numeric IDs.
fn agg_id(ifname: &str) -> u16 {
    ifname
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .parse()
        .unwrap_or(0)
}

fn svi_vlan_id(ifname: &str) -> Option<u16> {
    ifname.strip_prefix("Vlan")?.parse().ok()
}

fn is_link_local(addr: &std::net::Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

// Adds a VLAN to the membership set of every domain-bound interface.
fn vlan_membership_add(interfaces: &mut Interfaces, vlan_id: u16) {
    for iface in interfaces.iter_mut() {
        if iface.is_peer_link || iface.csm_id.is_some() {
            iface.vlan_ids.insert(vlan_id);
        }
    }
}

fn vlan_membership_del(interfaces: &mut Interfaces, vlan_id: u16) {
    for iface in interfaces.iter_mut() {
        iface.vlan_ids.remove(&vlan_id);
    }
}

// A freshly bound interface inherits the VLANs of the existing SVIs.
fn inherit_svi_vlans(interfaces: &mut Interfaces, ifname: &str) {
    let vlans = interfaces
        .iter()
        .filter(|iface| iface.itype == InterfaceType::Vlan && !iface.purged)
        .filter_map(|iface| svi_vlan_id(&iface.name))
        .collect::<BTreeSet<_>>();
    if let Some((_, iface)) = interfaces.get_mut_by_name(ifname) {
        if iface.is_peer_link || iface.csm_id.is_some() {
            iface.vlan_ids.extend(vlans);
        }
    }
}

// Sessions that formed before the system MAC was learned still owe the
// peer their system configuration.
fn sys_config_replay(csms: &mut Csms, sys_mac: MacAddr) {
    for csm_idx in csms.indexes().collect::<Vec<_>>() {
        let csm = &mut csms[csm_idx];
        if csm.mlacp.state == mlacp::fsm::State::SysConfigExchange {
            send_sys_config(csm, sys_mac);
        }
    }
}

fn send_sys_config(csm: &mut Csm, sys_mac: MacAddr) {
    // The system MAC may not be known yet; sys_config_replay() resends
    // once the first port supplies it.
    if sys_mac.is_unspecified() {
        return;
    }
    let msg_id = csm.get_next_msg_id();
    csm.send_message(
        SysConfigMsg::new(
            msg_id,
            TlvSysConfig::new(sys_mac, csm.mlacp.node_id),
        )
        .into(),
        true,
    );
}

fn send_agg_config(csm: &mut Csm, iface: &LocalInterface, op: AggOp) {
    let msg_id = csm.get_next_msg_id();
    csm.send_message(
        AggConfigMsg::new(
            msg_id,
            TlvAggConfig::new(
                agg_id(&iface.name),
                op,
                iface.mac,
                iface.name.clone(),
            ),
        )
        .into(),
        false,
    );
}

fn send_agg_state(csm: &mut Csm, iface: &LocalInterface) {
    let msg_id = csm.get_next_msg_id();
    csm.send_message(
        AggStateMsg::new(
            msg_id,
            TlvAggState::new(agg_id(&iface.name), iface.state()),
        )
        .into(),
        true,
    );
}

fn send_port_channel_info(csm: &mut Csm, iface: &LocalInterface) {
    let msg_id = csm.get_next_msg_id();
    csm.send_message(
        PortChannelInfoMsg::new(
            msg_id,
            TlvPortChannelInfo::new(
                agg_id(&iface.name),
                iface.is_l3_mode(),
                iface.ipv4_addr.unwrap_or(Ipv4Addr::UNSPECIFIED),
                iface.ipv4_prefixlen,
                iface.vlan_ids.clone(),
                iface.name.clone(),
            ),
        )
        .into(),
        false,
    );
}

fn send_mac_bulk(csm: &mut Csm) {
    let entries = csm.mlacp.mac_table.bulk_entries();
    for chunk in entries.chunks(BULK_CHUNK) {
        let msg_id = csm.get_next_msg_id();
        csm.send_message(MacInfoMsg::new(msg_id, chunk.to_vec()).into(), true);
    }
}

fn send_arp_bulk(csm: &mut Csm) {
    let entries = csm.mlacp.arp_table.bulk_entries();
    for chunk in entries.chunks(BULK_CHUNK) {
        let msg_id = csm.get_next_msg_id();
        csm.send_message(ArpInfoMsg::new(msg_id, chunk.to_vec()).into(), true);
    }
}

fn send_ndisc_bulk(csm: &mut Csm) {
    let entries = csm.mlacp.ndisc_table.bulk_entries();
    for chunk in entries.chunks(BULK_CHUNK) {
        let msg_id = csm.get_next_msg_id();
        csm.send_message(
            NdiscInfoMsg::new(msg_id, chunk.to_vec()).into(),
            true,
        );
    }
}

// Runs a consistency diagnostic between a local port-channel and its peer
// mirror.
fn consistency_check(interfaces: &Interfaces, csm: &Csm, ifname: &str) {
    let Some((_, local)) = interfaces.get_by_name(ifname) else {
        return;
    };
    let Some(peer) = csm.mlacp.peer_if_by_name(ifname) else {
        return;
    };
    let result = consistency::check(local, peer);
    Debug::ConsistencyCheck(ifname, &result).log();
}

// Re-resolves the egress of every synchronized entry after a topology
// change, and refreshes the peer-link isolation group.
fn refresh_egress(
    csms: &mut Csms,
    interfaces: &Interfaces,
    syncd_txp: &UnboundedSender<SyncdRequest>,
) {
    let csm_indexes = csms.indexes().collect::<Vec<_>>();
    for csm_idx in csm_indexes {
        let csm = &mut csms[csm_idx];
        let peer_link = csm.peer_link.clone();
        let cxt = EgressCxt {
            interfaces,
            peer_link: peer_link.as_deref(),
        };
        let actions = csm.mlacp.mac_table.refresh_egress(&cxt);
        apply_mac_actions(csm, syncd_txp, actions);
        isolation_update(interfaces, syncd_txp, csm);
    }
}

// The peer-link is isolated from the MLAG ports whenever at least one local
// MLAG port-channel can forward, preventing duplicate deliveries.
fn isolation_update(
    interfaces: &Interfaces,
    syncd_txp: &UnboundedSender<SyncdRequest>,
    csm: &Csm,
) {
    let Some(peer_link) = &csm.peer_link else {
        return;
    };
    let enable = interfaces
        .iter()
        .any(|iface| is_mlag_agg(iface, csm.id) && iface.is_up());
    let _ = syncd_txp.send(SyncdRequest::SetIsolation {
        ifname: peer_link.clone(),
        enable,
    });
}

// ===== floating MAC =====

// On the standby chassis the MLAG port-channels adopt the active peer's
// system MAC so LACP presents a single system to the downstream devices.
async fn standby_mac_update(master: &mut Master, csm_idx: CsmIndex) {
    let sys_mac = master.sys_mac;
    let Master {
        csms,
        interfaces,
        netlink,
        syncd_txp,
        ..
    } = master;
    let csm = &csms[csm_idx];
    if csm.mlacp.role_active {
        return;
    }
    let mac = csm.mlacp.effective_sys_mac(sys_mac);
    if mac.is_unspecified() {
        return;
    }

    let csm_id = csm.id;
    let mut updates = Vec::new();
    for iface in interfaces.iter_mut() {
        if iface.purged
            || iface.is_peer_link
            || iface.csm_id != Some(csm_id)
            || iface.itype != InterfaceType::PortChannel
            || iface.mac == mac
        {
            continue;
        }
        if iface.orig_mac.is_unspecified() {
            iface.orig_mac = iface.mac;
        }
        iface.mac = mac;
        Debug::StandbyMacUpdate(&iface.name, &mac).log();
        if let Some(ifindex) = iface.ifindex {
            updates.push((ifindex, iface.name.clone()));
        }
    }
    for (ifindex, ifname) in updates {
        netlink.link_set_mac(ifindex, mac).await;
        let _ = syncd_txp.send(SyncdRequest::SetIntfMac { ifname, mac });
    }
}

// ===== action application =====

fn apply_mac_actions(
    csm: &mut Csm,
    syncd_txp: &UnboundedSender<SyncdRequest>,
    actions: Vec<MacAction>,
) {
    for action in actions {
        match action {
            MacAction::Install {
                vlan_id,
                mac,
                ifname,
            } => {
                let _ = syncd_txp.send(SyncdRequest::FdbAdd {
                    vlan_id,
                    mac,
                    ifname,
                });
            }
            MacAction::Uninstall {
                vlan_id,
                mac,
                ifname,
            } => {
                let _ = syncd_txp.send(SyncdRequest::FdbDel {
                    vlan_id,
                    mac,
                    ifname,
                });
            }
            MacAction::Announce(tlv) => {
                let msg_id = csm.get_next_msg_id();
                csm.send_message(
                    MacInfoMsg::new(msg_id, vec![tlv]).into(),
                    true,
                );
            }
        }
    }
}

async fn apply_arp_actions(
    csm: &mut Csm,
    interfaces: &Interfaces,
    netlink: &NetlinkHandle,
    actions: Vec<ArpAction>,
) {
    for action in actions {
        match action {
            ArpAction::Install {
                ifname,
                ipv4_addr,
                mac,
                permanent,
            } => {
                if let Some(ifindex) = interfaces
                    .get_by_name(&ifname)
                    .and_then(|(_, iface)| iface.ifindex)
                {
                    netlink
                        .neigh_add(
                            ifindex,
                            IpAddr::V4(ipv4_addr),
                            mac,
                            permanent,
                        )
                        .await;
                }
            }
            ArpAction::Uninstall { ifname, ipv4_addr } => {
                if let Some(ifindex) = interfaces
                    .get_by_name(&ifname)
                    .and_then(|(_, iface)| iface.ifindex)
                {
                    netlink.neigh_del(ifindex, IpAddr::V4(ipv4_addr)).await;
                }
            }
            ArpAction::Announce(tlv) => {
                let msg_id = csm.get_next_msg_id();
                csm.send_message(
                    ArpInfoMsg::new(msg_id, vec![tlv]).into(),
                    true,
                );
            }
        }
    }
}

async fn apply_ndisc_actions(
    csm: &mut Csm,
    interfaces: &Interfaces,
    netlink: &NetlinkHandle,
    actions: Vec<NdiscAction>,
) {
    for action in actions {
        match action {
            NdiscAction::Install {
                ifname,
                ipv6_addr,
                mac,
                permanent,
            } => {
                if let Some(ifindex) = interfaces
                    .get_by_name(&ifname)
                    .and_then(|(_, iface)| iface.ifindex)
                {
                    netlink
                        .neigh_add(
                            ifindex,
                            IpAddr::V6(ipv6_addr),
                            mac,
                            permanent,
                        )
                        .await;
                }
            }
            NdiscAction::Uninstall { ifname, ipv6_addr } => {
                if let Some(ifindex) = interfaces
                    .get_by_name(&ifname)
                    .and_then(|(_, iface)| iface.ifindex)
                {
                    netlink.neigh_del(ifindex, IpAddr::V6(ipv6_addr)).await;
                }
            }
            NdiscAction::Announce(tlv) => {
                let msg_id = csm.get_next_msg_id();
                csm.send_message(
                    NdiscInfoMsg::new(msg_id, vec![tlv]).into(),
                    true,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sys_config_replay_after_session_up() {
        let mut csms = Csms::default();
        let (csm_idx, csm) = csms.insert(
            1,
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
        );
        csm.mlacp.advance(mlacp::fsm::State::SysConfigExchange);
        let (idle_idx, _) = csms.insert(
            2,
            Ipv4Addr::new(10, 0, 1, 1),
            Ipv4Addr::new(10, 0, 1, 2),
        );

        // The session formed before any port supplied the system MAC,
        // so nothing goes out yet.
        send_sys_config(&mut csms[csm_idx], MacAddr::UNSPECIFIED);
        assert!(csms[csm_idx].msg_log.is_empty());

        // Learning the MAC replays the system configuration on every
        // domain still waiting for it.
        let sys_mac = MacAddr::from([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        sys_config_replay(&mut csms, sys_mac);
        assert_eq!(
            csms[csm_idx].msg_log_find(1),
            Some(MessageType::SysConfig)
        );
        assert!(csms[idle_idx].msg_log.is_empty());
    }
}
