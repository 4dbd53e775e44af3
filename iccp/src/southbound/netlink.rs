//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::single_match)]

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use futures::TryStreamExt;
use iccp_utils::task::Task;
use iccp_utils::MacAddr;
use ipnetwork::IpNetwork;
use netlink_packet_core::{NetlinkMessage, NetlinkPayload};
use netlink_packet_route::constants::{
    AF_INET, AF_INET6, IFF_RUNNING, IFF_UP, NUD_FAILED, NUD_NOARP,
    NUD_PERMANENT, NUD_REACHABLE, NUD_STALE, RTNLGRP_IPV4_IFADDR,
    RTNLGRP_IPV6_IFADDR, RTNLGRP_LINK, RTNLGRP_NEIGH,
};
use netlink_packet_route::rtnl::RtnlMessage;
use netlink_packet_route::{AddressMessage, LinkMessage, NeighbourMessage};
use netlink_sys::{AsyncSocket, SocketAddr};
use rtnetlink::new_connection;
use tokio::sync::mpsc::Sender;

use crate::error::IoError;
use crate::interface::InterfaceType;
use crate::southbound::{LinkUpdate, TopologyEvent};
use crate::tasks::messages::input::TopologyEventMsg;

// Netlink command handle.
#[derive(Clone, Debug)]
pub struct NetlinkHandle {
    handle: rtnetlink::Handle,
}

// ===== helper functions =====

// SONiC interface naming conventions.
fn classify_ifname(ifname: &str) -> InterfaceType {
    if ifname.starts_with("PortChannel") {
        InterfaceType::PortChannel
    } else if ifname.starts_with("Vlan") {
        InterfaceType::Vlan
    } else if ifname.starts_with("Bridge") {
        InterfaceType::Bridge
    } else if ifname.starts_with("vtep") || ifname.starts_with("VTEP") {
        InterfaceType::Vxlan
    } else {
        InterfaceType::Port
    }
}

fn process_newlink_msg(msg: LinkMessage) -> Option<TopologyEvent> {
    use netlink_packet_route::link::nlas::Nla;

    // Fetch interface attributes.
    let ifindex = msg.header.index;
    let admin_up = msg.header.flags & IFF_UP != 0;
    let oper_up = msg.header.flags & IFF_RUNNING != 0;
    let mut ifname = None;
    let mut mac = MacAddr::UNSPECIFIED;
    let mut master = None;
    for nla in msg.nlas.into_iter() {
        match nla {
            Nla::IfName(nla_ifname) => ifname = Some(nla_ifname),
            Nla::Address(nla_addr) => {
                if nla_addr.len() == MacAddr::LENGTH {
                    let mut octets = [0; MacAddr::LENGTH];
                    octets.copy_from_slice(&nla_addr);
                    mac = MacAddr::from(octets);
                }
            }
            Nla::Master(nla_master) => master = Some(nla_master),
            _ => (),
        }
    }
    let ifname = ifname?;

    let itype = classify_ifname(&ifname);
    Some(TopologyEvent::LinkUpsert(LinkUpdate {
        ifindex,
        ifname,
        itype,
        admin_up,
        oper_up,
        mac,
        master,
    }))
}

fn process_dellink_msg(msg: LinkMessage) -> Option<TopologyEvent> {
    Some(TopologyEvent::LinkDelete {
        ifindex: msg.header.index,
    })
}

fn process_addr_msg(msg: AddressMessage, del: bool) -> Option<TopologyEvent> {
    use netlink_packet_route::address::nlas::Nla;

    // Fetch address attributes.
    let mut addr = None;
    let ifindex = msg.header.index;
    for nla in msg.nlas.into_iter() {
        match nla {
            Nla::Address(nla_addr) => addr = Some(nla_addr),
            _ => (),
        }
    }
    let addr = addr?;

    // Parse address.
    let addr =
        parse_address(msg.header.family, msg.header.prefix_len, addr)?;

    if del {
        Some(TopologyEvent::AddrDel { ifindex, addr })
    } else {
        Some(TopologyEvent::AddrAdd { ifindex, addr })
    }
}

fn process_neigh_msg(
    msg: NeighbourMessage,
    del: bool,
) -> Option<TopologyEvent> {
    use netlink_packet_route::neighbour::Nla;

    // Fetch neighbor attributes.
    let ifindex = msg.header.ifindex;
    let state = msg.header.state;
    let mut addr = None;
    let mut lladdr = None;
    for nla in msg.nlas.into_iter() {
        match nla {
            Nla::Destination(nla_addr) => {
                addr = parse_raw_address(msg.header.family, nla_addr);
            }
            Nla::LinkLocalAddress(nla_lladdr) => {
                if nla_lladdr.len() == MacAddr::LENGTH {
                    let mut octets = [0; MacAddr::LENGTH];
                    octets.copy_from_slice(&nla_lladdr);
                    lladdr = Some(MacAddr::from(octets));
                }
            }
            _ => (),
        }
    }
    let addr = addr?;

    if del || state == NUD_FAILED {
        return Some(TopologyEvent::NeighDelete { ifindex, addr });
    }

    // Only fully resolved neighbors are synchronized.
    if state & (NUD_REACHABLE | NUD_STALE | NUD_PERMANENT | NUD_NOARP) == 0 {
        return None;
    }

    let lladdr = lladdr?;
    Some(TopologyEvent::NeighUpsert {
        ifindex,
        addr,
        lladdr,
    })
}

fn parse_address(
    family: u8,
    prefixlen: u8,
    bytes: Vec<u8>,
) -> Option<IpNetwork> {
    let addr = parse_raw_address(family, bytes)?;
    IpNetwork::new(addr, prefixlen).ok()
}

fn parse_raw_address(family: u8, bytes: Vec<u8>) -> Option<IpAddr> {
    match family as u16 {
        AF_INET => {
            let mut addr_array: [u8; 4] = [0; 4];
            if bytes.len() != addr_array.len() {
                return None;
            }
            addr_array.copy_from_slice(&bytes);
            Some(Ipv4Addr::from(addr_array).into())
        }
        AF_INET6 => {
            let mut addr_array: [u8; 16] = [0; 16];
            if bytes.len() != addr_array.len() {
                return None;
            }
            addr_array.copy_from_slice(&bytes);
            Some(Ipv6Addr::from(addr_array).into())
        }
        _ => None,
    }
}

// ===== global functions =====

pub(crate) fn process_msg(
    msg: NetlinkMessage<RtnlMessage>,
) -> Option<TopologyEvent> {
    let NetlinkPayload::InnerMessage(msg) = msg.payload else {
        return None;
    };
    match msg {
        RtnlMessage::NewLink(msg) => process_newlink_msg(msg),
        RtnlMessage::DelLink(msg) => process_dellink_msg(msg),
        RtnlMessage::NewAddress(msg) => process_addr_msg(msg, false),
        RtnlMessage::DelAddress(msg) => process_addr_msg(msg, true),
        RtnlMessage::NewNeighbour(msg) => process_neigh_msg(msg, false),
        RtnlMessage::DelNeighbour(msg) => process_neigh_msg(msg, true),
        _ => None,
    }
}

// Initializes the netlink topology source: dumps links, addresses and
// neighbors, then starts a monitor task forwarding kernel notifications as
// topology events.
pub(crate) async fn init(
    topology_txp: Sender<TopologyEventMsg>,
) -> (NetlinkHandle, Task<()>) {
    // Create netlink socket.
    let (conn, handle, _) =
        new_connection().expect("Failed to create netlink socket");
    tokio::spawn(conn);

    // Fetch interface information.
    let mut links = handle.link().get().execute();
    while let Some(msg) = links
        .try_next()
        .await
        .expect("Failed to fetch interface information")
    {
        if let Some(event) = process_newlink_msg(msg) {
            let _ = topology_txp.send(TopologyEventMsg { event }).await;
        }
    }

    // Fetch address information.
    let mut addresses = handle.address().get().execute();
    while let Some(msg) = addresses
        .try_next()
        .await
        .expect("Failed to fetch interface address information")
    {
        if let Some(event) = process_addr_msg(msg, false) {
            let _ = topology_txp.send(TopologyEventMsg { event }).await;
        }
    }

    // Fetch neighbor information.
    let mut neighbours = handle.neighbours().get().execute();
    while let Some(msg) = neighbours
        .try_next()
        .await
        .expect("Failed to fetch neighbor information")
    {
        if let Some(event) = process_neigh_msg(msg, false) {
            let _ = topology_txp.send(TopologyEventMsg { event }).await;
        }
    }

    // Start netlink monitor.
    let (mut conn, _, mut monitor) =
        new_connection().expect("Failed to create netlink socket");
    let groups = [
        RTNLGRP_LINK,
        RTNLGRP_IPV4_IFADDR,
        RTNLGRP_IPV6_IFADDR,
        RTNLGRP_NEIGH,
    ]
    .iter()
    .map(|group| 1 << (group - 1))
    .fold(0, std::ops::BitOr::bitor);
    let addr = SocketAddr::new(0, groups);
    conn.socket_mut()
        .socket_mut()
        .bind(&addr)
        .expect("Failed to bind netlink socket");
    tokio::spawn(conn);

    let monitor_task = Task::spawn(async move {
        use futures::StreamExt;

        while let Some((msg, _)) = monitor.next().await {
            if let Some(event) = process_msg(msg) {
                if topology_txp.send(TopologyEventMsg { event }).await.is_err()
                {
                    return;
                }
            }
        }
    });

    (NetlinkHandle { handle }, monitor_task)
}

// ===== impl NetlinkHandle =====

impl NetlinkHandle {
    // Updates an interface's link-layer address.
    pub(crate) async fn link_set_mac(&self, ifindex: u32, mac: MacAddr) {
        if let Err(error) = self
            .handle
            .link()
            .set(ifindex)
            .address(mac.as_slice().to_vec())
            .execute()
            .await
        {
            IoError::NetlinkError(std::io::Error::new(
                std::io::ErrorKind::Other,
                error.to_string(),
            ))
            .log();
        }
    }

    // Installs a kernel neighbor entry, replacing any existing one.
    pub(crate) async fn neigh_add(
        &self,
        ifindex: u32,
        addr: IpAddr,
        lladdr: MacAddr,
        permanent: bool,
    ) {
        let state = if permanent {
            NUD_PERMANENT
        } else {
            NUD_REACHABLE
        };
        if let Err(error) = self
            .handle
            .neighbours()
            .add(ifindex, addr)
            .link_local_address(lladdr.as_slice())
            .state(state)
            .replace()
            .execute()
            .await
        {
            IoError::NetlinkError(std::io::Error::new(
                std::io::ErrorKind::Other,
                error.to_string(),
            ))
            .log();
        }
    }

    // Removes a kernel neighbor entry.
    pub(crate) async fn neigh_del(&self, ifindex: u32, addr: IpAddr) {
        use netlink_packet_route::neighbour::Nla;

        let mut msg = NeighbourMessage::default();
        msg.header.ifindex = ifindex;
        match addr {
            IpAddr::V4(addr) => {
                msg.header.family = AF_INET as u8;
                msg.nlas.push(Nla::Destination(addr.octets().to_vec()));
            }
            IpAddr::V6(addr) => {
                msg.header.family = AF_INET6 as u8;
                msg.nlas.push(Nla::Destination(addr.octets().to_vec()));
            }
        }

        if let Err(error) = self.handle.neighbours().del(msg).execute().await {
            IoError::NetlinkError(std::io::Error::new(
                std::io::ErrorKind::Other,
                error.to_string(),
            ))
            .log();
        }
    }
}
