//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::{Ipv4Addr, Ipv6Addr};

use iccp_utils::MacAddr;

use crate::collections::{CsmId, InterfaceId};
use crate::packet::messages::{PortState, TlvPortChannelInfo};

// Kernel interface types relevant to MLAG operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InterfaceType {
    Port,
    PortChannel,
    Vlan,
    Vxlan,
    Bridge,
}

// Local interface as learned from the kernel.
#[derive(Debug)]
pub struct LocalInterface {
    pub id: InterfaceId,
    pub name: String,
    pub itype: InterfaceType,
    pub ifindex: Option<u32>,
    pub admin_up: bool,
    pub oper_up: bool,
    // Current MAC and the MAC the interface had before any floating-MAC
    // update, kept so the original identity can be restored.
    pub mac: MacAddr,
    pub orig_mac: MacAddr,
    pub ipv4_addr: Option<Ipv4Addr>,
    pub ipv4_prefixlen: u8,
    pub ipv6_addr: Option<Ipv6Addr>,
    pub ipv6_prefixlen: u8,
    // Parent aggregate ifindex for port-channel members.
    pub master: Option<u32>,
    pub is_peer_link: bool,
    pub vlan_ids: BTreeSet<u16>,
    // MLAG domain this interface is bound to.
    pub csm_id: Option<CsmId>,
    // Deferred-free mark. Set when the interface vanished from the kernel
    // while its CSM was mid-exchange; compacted by Interfaces::purge().
    pub purged: bool,
}

// Peer's mirror of a shared port-channel, built from received
// AggConfig/PortChannelInfo messages.
#[derive(Debug)]
pub struct PeerInterface {
    pub name: String,
    pub agg_id: u16,
    pub mac: MacAddr,
    pub l3_mode: bool,
    pub ipv4_addr: Option<Ipv4Addr>,
    pub ipv4_prefixlen: u8,
    pub state: PortState,
    // VLAN membership. The value is the mark-then-prune tombstone: entries
    // still marked after an update are pruned.
    pub vlan_ids: BTreeMap<u16, bool>,
}

// ===== impl LocalInterface =====

impl LocalInterface {
    pub(crate) fn new(
        id: InterfaceId,
        name: String,
        itype: InterfaceType,
    ) -> LocalInterface {
        LocalInterface {
            id,
            name,
            itype,
            ifindex: None,
            admin_up: false,
            oper_up: false,
            mac: MacAddr::UNSPECIFIED,
            orig_mac: MacAddr::UNSPECIFIED,
            ipv4_addr: None,
            ipv4_prefixlen: 0,
            ipv6_addr: None,
            ipv6_prefixlen: 0,
            master: None,
            is_peer_link: false,
            vlan_ids: BTreeSet::new(),
            csm_id: None,
            purged: false,
        }
    }

    pub(crate) fn is_up(&self) -> bool {
        self.admin_up && self.oper_up
    }

    // A port-channel with an IPv4 address operates in L3 mode.
    pub(crate) fn is_l3_mode(&self) -> bool {
        self.ipv4_addr.is_some()
    }

    pub(crate) fn state(&self) -> PortState {
        if self.is_up() {
            PortState::Up
        } else {
            PortState::Down
        }
    }
}

// ===== impl PeerInterface =====

impl PeerInterface {
    pub(crate) fn new(
        name: String,
        agg_id: u16,
        mac: MacAddr,
    ) -> PeerInterface {
        PeerInterface {
            name,
            agg_id,
            mac,
            l3_mode: false,
            ipv4_addr: None,
            ipv4_prefixlen: 0,
            state: PortState::Down,
            vlan_ids: BTreeMap::new(),
        }
    }

    pub(crate) fn is_up(&self) -> bool {
        self.state == PortState::Up
    }

    // Applies a full VLAN membership snapshot with mark-then-prune
    // semantics: mark everything for removal, clear the mark for VLANs the
    // snapshot re-affirms, then prune what stayed marked. Repeating the same
    // snapshot is a no-op.
    pub(crate) fn apply_config(&mut self, info: &TlvPortChannelInfo) {
        self.l3_mode = info.l3_mode;
        self.ipv4_addr = if info.ipv4_addr.is_unspecified() {
            None
        } else {
            Some(info.ipv4_addr)
        };
        self.ipv4_prefixlen = info.prefixlen;

        for marked in self.vlan_ids.values_mut() {
            *marked = true;
        }
        for vlan_id in &info.vlan_ids {
            self.vlan_ids.insert(*vlan_id, false);
        }
        self.vlan_ids.retain(|_, marked| !*marked);
    }

    pub(crate) fn contains_vlan(&self, vlan_id: u16) -> bool {
        self.vlan_ids.contains_key(&vlan_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreeset;

    fn test_info(
        ipv4_addr: Ipv4Addr,
        vlan_ids: std::collections::BTreeSet<u16>,
    ) -> TlvPortChannelInfo {
        TlvPortChannelInfo::new(
            1,
            !ipv4_addr.is_unspecified(),
            ipv4_addr,
            24,
            vlan_ids,
            "PortChannel1".to_owned(),
        )
    }

    #[test]
    fn test_apply_config_mark_then_prune() {
        let mut peer_if = PeerInterface::new(
            "PortChannel1".to_owned(),
            1,
            MacAddr::UNSPECIFIED,
        );

        peer_if.apply_config(&test_info(
            Ipv4Addr::UNSPECIFIED,
            btreeset![10, 20],
        ));
        assert!(peer_if.contains_vlan(10));
        assert!(peer_if.contains_vlan(20));

        // VLANs absent from the new snapshot are pruned.
        peer_if.apply_config(&test_info(
            Ipv4Addr::UNSPECIFIED,
            btreeset![20, 30],
        ));
        assert!(!peer_if.contains_vlan(10));
        assert!(peer_if.contains_vlan(20));
        assert!(peer_if.contains_vlan(30));

        // Reapplying the same snapshot is a no-op.
        peer_if.apply_config(&test_info(
            Ipv4Addr::UNSPECIFIED,
            btreeset![20, 30],
        ));
        assert_eq!(peer_if.vlan_ids.len(), 2);
    }

    #[test]
    fn test_apply_config_l3_mode() {
        let mut peer_if = PeerInterface::new(
            "PortChannel1".to_owned(),
            1,
            MacAddr::UNSPECIFIED,
        );

        peer_if.apply_config(&test_info(
            Ipv4Addr::new(10, 0, 0, 1),
            btreeset![],
        ));
        assert!(peer_if.l3_mode);
        assert_eq!(peer_if.ipv4_addr, Some(Ipv4Addr::new(10, 0, 0, 1)));

        // The unspecified address clears the L3 configuration.
        peer_if.apply_config(&test_info(Ipv4Addr::UNSPECIFIED, btreeset![]));
        assert!(!peer_if.l3_mode);
        assert_eq!(peer_if.ipv4_addr, None);
    }
}
