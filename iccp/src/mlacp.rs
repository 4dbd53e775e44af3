//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use iccp_utils::MacAddr;

use crate::debug::Debug;
use crate::interface::PeerInterface;
use crate::packet::messages::{
    AggOp, TlvAggConfig, TlvAggState, TlvPeerLinkInfo, TlvPortChannelInfo,
    TlvSysConfig,
};
use crate::sync::arp::ArpAction;
use crate::sync::mac::MacAction;
use crate::sync::ndisc::NdiscAction;
use crate::sync::{ArpTable, MacTable, NdiscTable};

// Per-domain MLACP application state, nested inside the connection state
// machine.
#[derive(Debug)]
pub struct Mlacp {
    pub state: fsm::State,
    // The chassis with the numerically lower session address takes the
    // active role.
    pub role_active: bool,
    pub node_id: u8,
    pub peer_node_id: Option<u8>,
    pub peer_sys_mac: Option<MacAddr>,
    pub peer_link_info: Option<TlvPeerLinkInfo>,
    // Peer's MLAG port-channels, keyed by interface name.
    pub peer_ifs: BTreeMap<String, PeerInterface>,
    pub mac_table: MacTable,
    pub arp_table: ArpTable,
    pub ndisc_table: NdiscTable,
    // Set once the peer announced a planned restart. Suppresses teardown
    // of synchronized state when the session drops.
    pub peer_warmboot: bool,
    peer_addr: Ipv4Addr,
}

// MLACP exchange states.
pub mod fsm {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        Init,
        SysConfigExchange,
        AggSync,
        Exchange,
    }
}

// ===== impl Mlacp =====

impl Mlacp {
    pub(crate) fn new(local_addr: Ipv4Addr, peer_addr: Ipv4Addr) -> Mlacp {
        let role_active = local_addr < peer_addr;

        Mlacp {
            state: fsm::State::Init,
            role_active,
            // Initial node IDs derive from the role. Conflicts are resolved
            // during the system configuration exchange.
            node_id: if role_active { 0 } else { 1 },
            peer_node_id: None,
            peer_sys_mac: None,
            peer_link_info: None,
            peer_ifs: BTreeMap::new(),
            mac_table: Default::default(),
            arp_table: Default::default(),
            ndisc_table: Default::default(),
            peer_warmboot: false,
            peer_addr,
        }
    }

    // Advances the exchange state, logging the transition.
    pub(crate) fn advance(&mut self, new_state: fsm::State) {
        if new_state == self.state {
            return;
        }
        Debug::MlacpFsmTransition(&self.peer_addr, &self.state, &new_state)
            .log();
        self.state = new_state;
    }

    // Drops all peer-derived exchange state. The synchronized tables are
    // aged separately so their egress updates can be applied.
    pub(crate) fn reset(&mut self) {
        self.advance(fsm::State::Init);
        self.peer_node_id = None;
        self.peer_sys_mac = None;
        self.peer_link_info = None;
        for name in self.peer_ifs.keys() {
            Debug::PeerInterfaceDelete(&self.peer_addr, name).log();
        }
        self.peer_ifs.clear();
        self.peer_warmboot = false;
    }

    // Ages out all synchronized tables on the peer side, returning the
    // pending egress updates.
    pub(crate) fn age_peer_tables(
        &mut self,
    ) -> (Vec<MacAction>, Vec<ArpAction>, Vec<NdiscAction>) {
        (
            self.mac_table.process_peer_down(),
            self.arp_table.process_peer_down(),
            self.ndisc_table.process_peer_down(),
        )
    }

    // MAC the MLAG port-channels should carry: the standby chassis adopts
    // the active peer's system MAC so LACP presents a single system to the
    // downstream devices.
    pub(crate) fn effective_sys_mac(&self, sys_mac: MacAddr) -> MacAddr {
        if self.role_active {
            return sys_mac;
        }
        self.peer_sys_mac.unwrap_or(sys_mac)
    }

    // Processes the peer's system configuration. Returns `true` when the
    // local node ID had to be reassigned due to a conflict.
    pub(crate) fn process_sys_config(&mut self, tlv: &TlvSysConfig) -> bool {
        self.peer_sys_mac = Some(tlv.sys_mac);
        self.peer_node_id = Some(tlv.node_id);

        // On a node ID conflict the standby side yields.
        if tlv.node_id == self.node_id && !self.role_active {
            self.node_id = tlv.node_id.wrapping_add(1);
            return true;
        }
        false
    }

    // Processes an aggregate creation or removal announced by the peer.
    pub(crate) fn process_agg_config(&mut self, tlv: &TlvAggConfig) {
        match tlv.op {
            AggOp::Create => {
                Debug::PeerInterfaceCreate(&self.peer_addr, &tlv.ifname)
                    .log();
                self.peer_ifs.insert(
                    tlv.ifname.clone(),
                    PeerInterface::new(tlv.ifname.clone(), tlv.agg_id, tlv.mac),
                );
            }
            AggOp::Remove => {
                if self.peer_ifs.remove(&tlv.ifname).is_some() {
                    Debug::PeerInterfaceDelete(&self.peer_addr, &tlv.ifname)
                        .log();
                }
            }
        }
    }

    // Processes an UP/DOWN transition of one of the peer's port-channels.
    pub(crate) fn process_agg_state(&mut self, tlv: &TlvAggState) {
        if let Some(peer_if) = self
            .peer_ifs
            .values_mut()
            .find(|peer_if| peer_if.agg_id == tlv.agg_id)
        {
            peer_if.state = tlv.state;
        }
    }

    // Processes a full configuration snapshot of one of the peer's
    // port-channels. Returns the updated interface name when the snapshot
    // matched a known aggregate.
    pub(crate) fn process_port_channel_info(
        &mut self,
        tlv: &TlvPortChannelInfo,
    ) -> Option<String> {
        let peer_if = self.peer_ifs.get_mut(&tlv.ifname)?;
        peer_if.apply_config(tlv);
        Some(peer_if.name.clone())
    }

    pub(crate) fn process_peer_link_info(&mut self, tlv: &TlvPeerLinkInfo) {
        self.peer_link_info = Some(tlv.clone());
    }

    pub(crate) fn peer_if_by_name(
        &self,
        ifname: &str,
    ) -> Option<&PeerInterface> {
        self.peer_ifs.get(ifname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::messages::PortState;

    const ACTIVE: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const STANDBY: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    fn test_mac(last: u8) -> MacAddr {
        MacAddr::from([0x00, 0x11, 0x22, 0x33, 0x44, last])
    }

    #[test]
    fn test_role_election() {
        let mlacp = Mlacp::new(ACTIVE, STANDBY);
        assert!(mlacp.role_active);
        assert_eq!(mlacp.node_id, 0);

        let mlacp = Mlacp::new(STANDBY, ACTIVE);
        assert!(!mlacp.role_active);
        assert_eq!(mlacp.node_id, 1);
    }

    #[test]
    fn test_node_id_conflict() {
        // The standby side yields on a node ID conflict.
        let mut mlacp = Mlacp::new(STANDBY, ACTIVE);
        let tlv = TlvSysConfig::new(test_mac(0x55), 1);
        assert!(mlacp.process_sys_config(&tlv));
        assert_eq!(mlacp.node_id, 2);

        // The active side keeps its ID.
        let mut mlacp = Mlacp::new(ACTIVE, STANDBY);
        let tlv = TlvSysConfig::new(test_mac(0x55), 0);
        assert!(!mlacp.process_sys_config(&tlv));
        assert_eq!(mlacp.node_id, 0);
    }

    #[test]
    fn test_effective_sys_mac() {
        let local_mac = test_mac(0x01);
        let peer_mac = test_mac(0x02);

        // The active chassis keeps its own system MAC.
        let mut mlacp = Mlacp::new(ACTIVE, STANDBY);
        mlacp.process_sys_config(&TlvSysConfig::new(peer_mac, 1));
        assert_eq!(mlacp.effective_sys_mac(local_mac), local_mac);

        // The standby chassis adopts the active peer's system MAC.
        let mut mlacp = Mlacp::new(STANDBY, ACTIVE);
        mlacp.process_sys_config(&TlvSysConfig::new(peer_mac, 0));
        assert_eq!(mlacp.effective_sys_mac(local_mac), peer_mac);

        // Until it's known, the local MAC stands in.
        let mlacp = Mlacp::new(STANDBY, ACTIVE);
        assert_eq!(mlacp.effective_sys_mac(local_mac), local_mac);
    }

    #[test]
    fn test_agg_config_and_state() {
        let mut mlacp = Mlacp::new(ACTIVE, STANDBY);

        let tlv = TlvAggConfig::new(
            1,
            AggOp::Create,
            test_mac(0x55),
            "PortChannel1".to_owned(),
        );
        mlacp.process_agg_config(&tlv);
        let peer_if = mlacp.peer_if_by_name("PortChannel1").unwrap();
        assert_eq!(peer_if.agg_id, 1);
        assert_eq!(peer_if.state, PortState::Down);

        // State transitions are matched by aggregate ID.
        mlacp.process_agg_state(&TlvAggState::new(1, PortState::Up));
        let peer_if = mlacp.peer_if_by_name("PortChannel1").unwrap();
        assert!(peer_if.is_up());

        let tlv = TlvAggConfig::new(
            1,
            AggOp::Remove,
            test_mac(0x55),
            "PortChannel1".to_owned(),
        );
        mlacp.process_agg_config(&tlv);
        assert!(mlacp.peer_if_by_name("PortChannel1").is_none());
    }

    #[test]
    fn test_reset() {
        let mut mlacp = Mlacp::new(ACTIVE, STANDBY);
        mlacp.advance(fsm::State::Exchange);
        mlacp.process_sys_config(&TlvSysConfig::new(test_mac(0x55), 1));
        mlacp.process_agg_config(&TlvAggConfig::new(
            1,
            AggOp::Create,
            test_mac(0x55),
            "PortChannel1".to_owned(),
        ));
        mlacp.peer_warmboot = true;

        mlacp.reset();
        assert_eq!(mlacp.state, fsm::State::Init);
        assert_eq!(mlacp.peer_node_id, None);
        assert_eq!(mlacp.peer_sys_mac, None);
        assert!(mlacp.peer_ifs.is_empty());
        assert!(!mlacp.peer_warmboot);
    }
}
