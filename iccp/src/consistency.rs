//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use crate::interface::{LocalInterface, PeerInterface};

// Result of comparing a local MLAG port-channel against the peer's mirror
// of it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigConsistency {
    Consistent,
    InterfaceModeAsync,
    PeerIpAsync,
    PeerVlanAsync,
}

// ===== impl ConfigConsistency =====

impl std::fmt::Display for ConfigConsistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigConsistency::Consistent => {
                write!(f, "consistent")
            }
            ConfigConsistency::InterfaceModeAsync => {
                write!(f, "interface mode mismatch")
            }
            ConfigConsistency::PeerIpAsync => {
                write!(f, "IPv4 address mismatch")
            }
            ConfigConsistency::PeerVlanAsync => {
                write!(f, "VLAN membership mismatch")
            }
        }
    }
}

// ===== global functions =====

// Compares both sides of a shared port-channel, returning the first
// divergence found. Checks run in a fixed order: interface mode first, then
// the IPv4 address when both sides are L3, then symmetric VLAN membership.
//
// Diagnostic only. The result is logged but never acted upon.
pub(crate) fn check(
    local: &LocalInterface,
    peer: &PeerInterface,
) -> ConfigConsistency {
    // Interface mode.
    if local.is_l3_mode() != peer.l3_mode {
        return ConfigConsistency::InterfaceModeAsync;
    }

    // IPv4 address, L3 port-channels only.
    if local.is_l3_mode() && local.ipv4_addr != peer.ipv4_addr {
        return ConfigConsistency::PeerIpAsync;
    }

    // Symmetric VLAN membership.
    if local.vlan_ids.len() != peer.vlan_ids.len()
        || !local
            .vlan_ids
            .iter()
            .all(|vlan_id| peer.contains_vlan(*vlan_id))
    {
        return ConfigConsistency::PeerVlanAsync;
    }

    ConfigConsistency::Consistent
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use iccp_utils::MacAddr;

    use super::*;
    use crate::interface::InterfaceType;
    use crate::packet::messages::TlvPortChannelInfo;

    fn test_local(
        ipv4_addr: Option<Ipv4Addr>,
        vlan_ids: &[u16],
    ) -> LocalInterface {
        let mut local = LocalInterface::new(
            1,
            "PortChannel1".to_owned(),
            InterfaceType::PortChannel,
        );
        local.ipv4_addr = ipv4_addr;
        local.vlan_ids = vlan_ids.iter().copied().collect();
        local
    }

    fn test_peer(
        ipv4_addr: Ipv4Addr,
        vlan_ids: &[u16],
    ) -> PeerInterface {
        let mut peer = PeerInterface::new(
            "PortChannel1".to_owned(),
            1,
            MacAddr::UNSPECIFIED,
        );
        peer.apply_config(&TlvPortChannelInfo::new(
            1,
            !ipv4_addr.is_unspecified(),
            ipv4_addr,
            24,
            vlan_ids.iter().copied().collect(),
            "PortChannel1".to_owned(),
        ));
        peer
    }

    #[test]
    fn test_consistent() {
        let local = test_local(None, &[10, 20]);
        let peer = test_peer(Ipv4Addr::UNSPECIFIED, &[10, 20]);
        assert_eq!(check(&local, &peer), ConfigConsistency::Consistent);
    }

    #[test]
    fn test_interface_mode_async() {
        let local = test_local(Some(Ipv4Addr::new(10, 0, 0, 1)), &[]);
        let peer = test_peer(Ipv4Addr::UNSPECIFIED, &[]);
        assert_eq!(
            check(&local, &peer),
            ConfigConsistency::InterfaceModeAsync
        );
    }

    #[test]
    fn test_peer_ip_async() {
        let local = test_local(Some(Ipv4Addr::new(10, 0, 0, 1)), &[]);
        let peer = test_peer(Ipv4Addr::new(10, 0, 0, 2), &[]);
        assert_eq!(check(&local, &peer), ConfigConsistency::PeerIpAsync);
    }

    #[test]
    fn test_peer_vlan_async() {
        let local = test_local(None, &[10, 20]);
        let peer = test_peer(Ipv4Addr::UNSPECIFIED, &[10, 30]);
        assert_eq!(check(&local, &peer), ConfigConsistency::PeerVlanAsync);

        let peer = test_peer(Ipv4Addr::UNSPECIFIED, &[10]);
        assert_eq!(check(&local, &peer), ConfigConsistency::PeerVlanAsync);
    }
}
