//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;

use iccp_utils::MacAddr;

use crate::packet::messages::{MacType, TableOp, TlvMacEntry};
use crate::sync::{AgeFlags, EgressCxt, EgressDecision};

// Reconciled FDB, keyed by (VLAN, MAC).
#[derive(Debug, Default)]
pub struct MacTable {
    entries: BTreeMap<(u16, MacAddr), MacEntry>,
}

#[derive(Debug)]
pub struct MacEntry {
    pub vlan_id: u16,
    pub mac: MacAddr,
    pub mac_type: MacType,
    // Interface the entry was learned on.
    pub origin_ifname: String,
    // Interface currently programmed in the ASIC, when any.
    pub ifname: Option<String>,
    pub flags: AgeFlags,
}

// Side effects of a table update, applied by the caller.
#[derive(Debug, Eq, PartialEq)]
pub enum MacAction {
    // Program the entry in the ASIC via syncd.
    Install {
        vlan_id: u16,
        mac: MacAddr,
        ifname: String,
    },
    // Remove the entry from the ASIC.
    Uninstall {
        vlan_id: u16,
        mac: MacAddr,
        ifname: String,
    },
    // Announce the entry to the peer.
    Announce(TlvMacEntry),
}

// ===== impl MacTable =====

impl MacTable {
    // Processes an FDB entry advertised by the peer.
    pub(crate) fn process_peer_add(
        &mut self,
        tlv: &TlvMacEntry,
        cxt: &EgressCxt<'_>,
    ) -> Vec<MacAction> {
        let mut actions = Vec::new();
        let key = (tlv.vlan_id, tlv.mac);

        let existing = self.entries.contains_key(&key);
        let entry = self.entries.entry(key).or_insert_with(|| MacEntry {
            vlan_id: tlv.vlan_id,
            mac: tlv.mac,
            mac_type: tlv.mac_type,
            origin_ifname: tlv.ifname.clone(),
            ifname: None,
            // Not yet learned locally.
            flags: AgeFlags::LOCAL,
        });

        if existing {
            entry.flags.remove(AgeFlags::PEER);

            // The entry already aged out locally but the peer still carries
            // it. Re-announce the deletion so the peer ages it too.
            if entry.flags.contains(AgeFlags::LOCAL) {
                actions.push(MacAction::Announce(TlvMacEntry::new(
                    TableOp::Del,
                    entry.vlan_id,
                    entry.mac,
                    entry.mac_type,
                    entry.origin_ifname.clone(),
                )));
            }
        }

        actions.extend(Self::reprogram(&mut self.entries, key, cxt));
        actions
    }

    // Processes an FDB entry withdrawn by the peer.
    pub(crate) fn process_peer_del(
        &mut self,
        vlan_id: u16,
        mac: MacAddr,
    ) -> Vec<MacAction> {
        let key = (vlan_id, mac);
        let Some(entry) = self.entries.get_mut(&key) else {
            return Vec::new();
        };

        entry.flags.insert(AgeFlags::PEER);
        if !entry.flags.contains(AgeFlags::LOCAL) {
            return Vec::new();
        }

        // Aged out on both sides.
        let entry = self.entries.remove(&key).unwrap();
        match entry.ifname {
            Some(ifname) => vec![MacAction::Uninstall {
                vlan_id,
                mac,
                ifname,
            }],
            None => Vec::new(),
        }
    }

    // Ages out every entry on the peer side after the session went down.
    pub(crate) fn process_peer_down(&mut self) -> Vec<MacAction> {
        let keys = self.entries.keys().copied().collect::<Vec<_>>();
        let mut actions = Vec::new();
        for (vlan_id, mac) in keys {
            actions.extend(self.process_peer_del(vlan_id, mac));
        }
        actions
    }

    // Processes a local FDB learn event (from syncd or the kernel).
    pub(crate) fn process_local_learn(
        &mut self,
        vlan_id: u16,
        mac: MacAddr,
        mac_type: MacType,
        ifname: &str,
    ) -> Vec<MacAction> {
        let key = (vlan_id, mac);
        let entry = self.entries.entry(key).or_insert_with(|| MacEntry {
            vlan_id,
            mac,
            mac_type,
            origin_ifname: ifname.to_owned(),
            ifname: None,
            // Not yet advertised by the peer.
            flags: AgeFlags::PEER,
        });

        entry.flags.remove(AgeFlags::LOCAL);
        entry.mac_type = mac_type;
        entry.origin_ifname = ifname.to_owned();
        // The ASIC already holds the locally learned copy.
        entry.ifname = Some(ifname.to_owned());

        vec![MacAction::Announce(TlvMacEntry::new(
            TableOp::Add,
            vlan_id,
            mac,
            mac_type,
            ifname.to_owned(),
        ))]
    }

    // Processes a local FDB age-out event.
    pub(crate) fn process_local_age(
        &mut self,
        vlan_id: u16,
        mac: MacAddr,
        cxt: &EgressCxt<'_>,
    ) -> Vec<MacAction> {
        let key = (vlan_id, mac);
        let Some(entry) = self.entries.get_mut(&key) else {
            return Vec::new();
        };

        entry.flags.insert(AgeFlags::LOCAL);
        if entry.flags.contains(AgeFlags::PEER) {
            // Aged out on both sides.
            let entry = self.entries.remove(&key).unwrap();
            let mut actions = Vec::new();
            if let Some(ifname) = entry.ifname {
                actions.push(MacAction::Uninstall {
                    vlan_id,
                    mac,
                    ifname,
                });
            }
            actions.push(MacAction::Announce(TlvMacEntry::new(
                TableOp::Del,
                vlan_id,
                mac,
                entry.mac_type,
                entry.origin_ifname,
            )));
            return actions;
        }

        // The peer still holds the address. Redirect traffic over the
        // peer-link instead of flushing the entry.
        match cxt.peer_link_up() {
            Some(peer_link) => {
                if entry.ifname.as_deref() == Some(peer_link) {
                    return Vec::new();
                }
                entry.ifname = Some(peer_link.to_owned());
                vec![MacAction::Install {
                    vlan_id,
                    mac,
                    ifname: peer_link.to_owned(),
                }]
            }
            None => match entry.ifname.take() {
                Some(ifname) => vec![MacAction::Uninstall {
                    vlan_id,
                    mac,
                    ifname,
                }],
                None => Vec::new(),
            },
        }
    }

    // Re-resolves the effective egress of every peer-dependent entry after
    // a port state change.
    pub(crate) fn refresh_egress(
        &mut self,
        cxt: &EgressCxt<'_>,
    ) -> Vec<MacAction> {
        let mut actions = Vec::new();
        let keys = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.flags.contains(AgeFlags::LOCAL))
            .map(|(key, _)| *key)
            .collect::<Vec<_>>();
        for key in keys {
            actions.extend(Self::reprogram(&mut self.entries, key, cxt));
        }
        actions
    }

    // Full snapshot of the locally held entries, for bulk synchronization.
    pub(crate) fn bulk_entries(&self) -> Vec<TlvMacEntry> {
        self.entries
            .values()
            .filter(|entry| !entry.flags.contains(AgeFlags::LOCAL))
            .map(|entry| {
                TlvMacEntry::new(
                    TableOp::Add,
                    entry.vlan_id,
                    entry.mac,
                    entry.mac_type,
                    entry.origin_ifname.clone(),
                )
            })
            .collect()
    }

    pub(crate) fn get(&self, vlan_id: u16, mac: MacAddr) -> Option<&MacEntry> {
        self.entries.get(&(vlan_id, mac))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    // Resolves the entry's effective egress and pushes ASIC updates only
    // when the resolved interface changed.
    fn reprogram(
        entries: &mut BTreeMap<(u16, MacAddr), MacEntry>,
        key: (u16, MacAddr),
        cxt: &EgressCxt<'_>,
    ) -> Vec<MacAction> {
        let Some(entry) = entries.get_mut(&key) else {
            return Vec::new();
        };

        match cxt.resolve(&entry.origin_ifname) {
            EgressDecision::Program(ifname) => {
                if entry.ifname.as_deref() == Some(&ifname) {
                    return Vec::new();
                }
                entry.ifname = Some(ifname.clone());
                vec![MacAction::Install {
                    vlan_id: key.0,
                    mac: key.1,
                    ifname,
                }]
            }
            EgressDecision::Unprogrammed => match entry.ifname.take() {
                Some(ifname) => vec![MacAction::Uninstall {
                    vlan_id: key.0,
                    mac: key.1,
                    ifname,
                }],
                None => Vec::new(),
            },
            EgressDecision::Discard => {
                let entry = entries.remove(&key).unwrap();
                match entry.ifname {
                    Some(ifname) => vec![MacAction::Uninstall {
                        vlan_id: key.0,
                        mac: key.1,
                        ifname,
                    }],
                    None => Vec::new(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::Interfaces;
    use crate::interface::InterfaceType;

    const PEER_LINK: &str = "PortChannel100";
    const MLAG_AGG: &str = "PortChannel1";

    fn test_interfaces(agg_up: bool, peer_link_up: bool) -> Interfaces {
        let mut interfaces = Interfaces::default();

        let (_, iface) =
            interfaces.insert(PEER_LINK, InterfaceType::PortChannel);
        iface.is_peer_link = true;
        iface.admin_up = true;
        iface.oper_up = peer_link_up;
        iface.vlan_ids.insert(10);

        let (_, iface) =
            interfaces.insert(MLAG_AGG, InterfaceType::PortChannel);
        iface.csm_id = Some(1);
        iface.admin_up = true;
        iface.oper_up = agg_up;
        iface.vlan_ids.insert(10);

        interfaces
    }

    fn test_mac(last: u8) -> MacAddr {
        MacAddr::from([0x00, 0xaa, 0xbb, 0xcc, 0xdd, last])
    }

    fn peer_entry(mac: MacAddr) -> TlvMacEntry {
        TlvMacEntry::new(
            TableOp::Add,
            10,
            mac,
            MacType::Dynamic,
            MLAG_AGG.to_owned(),
        )
    }

    #[test]
    fn test_peer_add_programs_origin() {
        let interfaces = test_interfaces(true, true);
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        let mut table = MacTable::default();

        let mac = test_mac(0x01);
        let actions = table.process_peer_add(&peer_entry(mac), &cxt);
        assert_eq!(
            actions,
            vec![MacAction::Install {
                vlan_id: 10,
                mac,
                ifname: MLAG_AGG.to_owned(),
            }]
        );
    }

    #[test]
    fn test_peer_add_falls_back_to_peer_link() {
        let interfaces = test_interfaces(false, true);
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        let mut table = MacTable::default();

        let mac = test_mac(0x01);
        let actions = table.process_peer_add(&peer_entry(mac), &cxt);
        assert_eq!(
            actions,
            vec![MacAction::Install {
                vlan_id: 10,
                mac,
                ifname: PEER_LINK.to_owned(),
            }]
        );
    }

    #[test]
    fn test_peer_add_unprogrammed_when_no_egress() {
        // MLAG origin with no usable egress stays in the table, waiting for
        // the port to come back.
        let interfaces = test_interfaces(false, false);
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        let mut table = MacTable::default();

        let mac = test_mac(0x01);
        let actions = table.process_peer_add(&peer_entry(mac), &cxt);
        assert_eq!(actions, vec![]);
        let entry = table.get(10, mac).unwrap();
        assert_eq!(entry.ifname, None);
    }

    #[test]
    fn test_peer_add_orphan_discarded() {
        // Orphan origin with no usable egress is dropped entirely.
        let interfaces = test_interfaces(false, false);
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        let mut table = MacTable::default();

        let mac = test_mac(0x01);
        let tlv = TlvMacEntry::new(
            TableOp::Add,
            10,
            mac,
            MacType::Dynamic,
            "Ethernet4".to_owned(),
        );
        let actions = table.process_peer_add(&tlv, &cxt);
        assert_eq!(actions, vec![]);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_local_age_redirects_to_peer_link() {
        let interfaces = test_interfaces(true, true);
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        let mut table = MacTable::default();
        let mac = test_mac(0x01);

        // Learned on both sides.
        table.process_local_learn(10, mac, MacType::Dynamic, MLAG_AGG);
        table.process_peer_add(&peer_entry(mac), &cxt);

        // Local age-out with the peer still holding the address redirects
        // traffic over the peer-link.
        let actions = table.process_local_age(10, mac, &cxt);
        assert_eq!(
            actions,
            vec![MacAction::Install {
                vlan_id: 10,
                mac,
                ifname: PEER_LINK.to_owned(),
            }]
        );

        // Repeating the age-out is a no-op.
        let actions = table.process_local_age(10, mac, &cxt);
        assert_eq!(actions, vec![]);
    }

    #[test]
    fn test_peer_add_reannounces_del_on_aged_entry() {
        let interfaces = test_interfaces(true, true);
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        let mut table = MacTable::default();
        let mac = test_mac(0x01);

        table.process_local_learn(10, mac, MacType::Dynamic, MLAG_AGG);
        table.process_peer_add(&peer_entry(mac), &cxt);
        table.process_local_age(10, mac, &cxt);

        // A peer ADD for an entry that already aged out locally triggers a
        // corrective DEL announcement.
        let actions = table.process_peer_add(&peer_entry(mac), &cxt);
        assert!(actions.contains(&MacAction::Announce(TlvMacEntry::new(
            TableOp::Del,
            10,
            mac,
            MacType::Dynamic,
            MLAG_AGG.to_owned(),
        ))));
    }

    #[test]
    fn test_local_age_both_sides_removes() {
        let interfaces = test_interfaces(true, true);
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        let mut table = MacTable::default();
        let mac = test_mac(0x01);

        // Learned locally only; the first age-out removes the entry.
        table.process_local_learn(10, mac, MacType::Dynamic, MLAG_AGG);
        let actions = table.process_local_age(10, mac, &cxt);
        assert_eq!(
            actions,
            vec![
                MacAction::Uninstall {
                    vlan_id: 10,
                    mac,
                    ifname: MLAG_AGG.to_owned(),
                },
                MacAction::Announce(TlvMacEntry::new(
                    TableOp::Del,
                    10,
                    mac,
                    MacType::Dynamic,
                    MLAG_AGG.to_owned(),
                )),
            ]
        );
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_peer_down_ages_all_entries() {
        let interfaces = test_interfaces(true, true);
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        let mut table = MacTable::default();

        table.process_peer_add(&peer_entry(test_mac(0x01)), &cxt);
        table.process_peer_add(&peer_entry(test_mac(0x02)), &cxt);
        assert_eq!(table.len(), 2);

        let actions = table.process_peer_down();
        assert_eq!(actions.len(), 2);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_refresh_egress() {
        let mut table = MacTable::default();
        let mac = test_mac(0x01);

        let interfaces = test_interfaces(true, true);
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        table.process_peer_add(&peer_entry(mac), &cxt);

        // The MLAG port-channel went down; traffic moves to the peer-link.
        let interfaces = test_interfaces(false, true);
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        let actions = table.refresh_egress(&cxt);
        assert_eq!(
            actions,
            vec![MacAction::Install {
                vlan_id: 10,
                mac,
                ifname: PEER_LINK.to_owned(),
            }]
        );

        // Refreshing again with an unchanged topology is a no-op.
        let actions = table.refresh_egress(&cxt);
        assert_eq!(actions, vec![]);
    }

    #[test]
    fn test_bulk_entries() {
        let interfaces = test_interfaces(true, true);
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        let mut table = MacTable::default();

        // Only locally held entries are included in the bulk snapshot.
        table.process_local_learn(
            10,
            test_mac(0x01),
            MacType::Dynamic,
            MLAG_AGG,
        );
        table.process_peer_add(&peer_entry(test_mac(0x02)), &cxt);

        let entries = table.bulk_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].mac, test_mac(0x01));
    }
}
