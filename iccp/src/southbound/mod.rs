//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod netlink;
pub mod raw;
pub mod syncd;

use std::net::IpAddr;

use iccp_utils::MacAddr;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::interface::InterfaceType;
use crate::packet::messages::MacType;

// Topology change notification, normalized from the netlink dump/monitor
// and the raw ARP/ND listeners. Tests inject these directly.
#[derive(Clone, Debug)]
pub enum TopologyEvent {
    LinkUpsert(LinkUpdate),
    LinkDelete { ifindex: u32 },
    AddrAdd { ifindex: u32, addr: IpNetwork },
    AddrDel { ifindex: u32, addr: IpNetwork },
    NeighUpsert { ifindex: u32, addr: IpAddr, lladdr: MacAddr },
    NeighDelete { ifindex: u32, addr: IpAddr },
}

#[derive(Clone, Debug)]
pub struct LinkUpdate {
    pub ifindex: u32,
    pub ifname: String,
    pub itype: InterfaceType,
    pub admin_up: bool,
    pub oper_up: bool,
    pub mac: MacAddr,
    // Parent aggregate ifindex for port-channel members.
    pub master: Option<u32>,
}

// Request sent to mclagsyncd.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum SyncdRequest {
    FdbAdd {
        vlan_id: u16,
        mac: MacAddr,
        ifname: String,
    },
    FdbDel {
        vlan_id: u16,
        mac: MacAddr,
        ifname: String,
    },
    SetIntfMac {
        ifname: String,
        mac: MacAddr,
    },
    SetIsolation {
        ifname: String,
        enable: bool,
    },
    SetIccpState {
        domain_id: u16,
        up: bool,
    },
    SetIccpRole {
        domain_id: u16,
        active: bool,
        sys_mac: MacAddr,
    },
}

// Event received from mclagsyncd.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum SyncdEvent {
    FdbLearn {
        vlan_id: u16,
        mac: MacAddr,
        mac_type: MacType,
        ifname: String,
    },
    FdbAge {
        vlan_id: u16,
        mac: MacAddr,
        ifname: String,
    },
}
