//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod arp;
pub mod mac;
pub mod ndisc;

pub use arp::ArpTable;
pub use mac::MacTable;
pub use ndisc::NdiscTable;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::collections::Interfaces;

bitflags! {
    // Two-phase aging state of a reconciled table entry. A set bit means
    // the entry is absent (aged out) on that side; the entry is removed
    // only once both bits are set.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct AgeFlags: u8 {
        const LOCAL = 0x01;
        const PEER = 0x02;
    }
}

// Where traffic for a peer-learned entry should egress.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EgressDecision {
    // Program the entry via this interface.
    Program(String),
    // Keep the entry in the table without programming it.
    Unprogrammed,
    // Drop the entry entirely.
    Discard,
}

// Read-only view of the local topology used to resolve effective egress
// interfaces.
pub struct EgressCxt<'a> {
    pub interfaces: &'a Interfaces,
    pub peer_link: Option<&'a str>,
}

// ===== impl EgressCxt =====

impl EgressCxt<'_> {
    // Peer-link interface name when it's usable as a fallback egress.
    pub(crate) fn peer_link_up(&self) -> Option<&str> {
        let peer_link = self.peer_link?;
        let (_, iface) = self.interfaces.get_by_name(peer_link)?;
        if iface.purged || !iface.is_up() {
            return None;
        }
        Some(peer_link)
    }

    // Resolves the effective egress for an entry learned from the peer.
    //
    // When the origin is a shared MLAG port-channel whose local copy is UP,
    // traffic short-cuts through it. Otherwise it falls back to the
    // peer-link. An MLAG origin with no usable egress stays in the table
    // unprogrammed (the port may come back); an orphan origin is discarded.
    pub(crate) fn resolve(&self, origin_ifname: &str) -> EgressDecision {
        let mclag_origin = match self.interfaces.get_by_name(origin_ifname) {
            Some((_, iface)) if !iface.purged && iface.csm_id.is_some() => {
                if iface.is_up() {
                    return EgressDecision::Program(origin_ifname.to_owned());
                }
                true
            }
            _ => false,
        };

        if let Some(peer_link) = self.peer_link_up() {
            return EgressDecision::Program(peer_link.to_owned());
        }

        if mclag_origin {
            EgressDecision::Unprogrammed
        } else {
            EgressDecision::Discard
        }
    }

    // Checks whether the given VLAN is reachable from this chassis, either
    // over the peer-link or over an MLAG port-channel.
    pub(crate) fn vlan_reachable(&self, vlan_id: u16) -> bool {
        if vlan_id == 0 {
            return true;
        }
        self.interfaces.iter().any(|iface| {
            !iface.purged
                && (iface.is_peer_link || iface.csm_id.is_some())
                && iface.vlan_ids.contains(&vlan_id)
        })
    }

    // Checks whether the given IPv4/IPv6 address is owned by a local
    // interface.
    pub(crate) fn is_self_addr(&self, addr: &std::net::IpAddr) -> bool {
        self.interfaces.iter().any(|iface| {
            !iface.purged
                && match addr {
                    std::net::IpAddr::V4(addr) => {
                        iface.ipv4_addr.as_ref() == Some(addr)
                    }
                    std::net::IpAddr::V6(addr) => {
                        iface.ipv6_addr.as_ref() == Some(addr)
                    }
                }
        })
    }

    // Name of the SVI a neighbor entry for the given VLAN should be
    // installed on.
    pub(crate) fn svi_ifname(&self, vlan_id: u16) -> Option<String> {
        if vlan_id == 0 {
            return None;
        }
        let svi = format!("Vlan{vlan_id}");
        let (_, iface) = self.interfaces.get_by_name(&svi)?;
        if iface.purged {
            return None;
        }
        Some(svi)
    }
}
