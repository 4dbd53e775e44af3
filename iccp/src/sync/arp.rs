//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use iccp_utils::MacAddr;

use crate::packet::messages::{NeighFlags, TableOp, TlvArpEntry};
use crate::sync::{AgeFlags, EgressCxt};

// Reconciled IPv4 neighbor table, keyed by (VLAN, address).
#[derive(Debug, Default)]
pub struct ArpTable {
    entries: BTreeMap<(u16, Ipv4Addr), ArpEntry>,
}

#[derive(Debug)]
pub struct ArpEntry {
    pub vlan_id: u16,
    pub ipv4_addr: Ipv4Addr,
    pub mac: MacAddr,
    pub neigh_flags: NeighFlags,
    // Interface the entry was learned on.
    pub origin_ifname: String,
    // SVI the kernel neighbor is installed on, when any.
    pub ifname: Option<String>,
    pub flags: AgeFlags,
}

// Side effects of a table update, applied by the caller.
#[derive(Debug, Eq, PartialEq)]
pub enum ArpAction {
    // Install a kernel neighbor via netlink. Addresses the sending chassis
    // owns itself are installed as permanent entries.
    Install {
        ifname: String,
        ipv4_addr: Ipv4Addr,
        mac: MacAddr,
        permanent: bool,
    },
    // Remove the kernel neighbor.
    Uninstall {
        ifname: String,
        ipv4_addr: Ipv4Addr,
    },
    // Announce the entry to the peer.
    Announce(TlvArpEntry),
}

// ===== impl ArpTable =====

impl ArpTable {
    // Processes an ARP entry advertised by the peer.
    pub(crate) fn process_peer_add(
        &mut self,
        tlv: &TlvArpEntry,
        cxt: &EgressCxt<'_>,
    ) -> Vec<ArpAction> {
        // Our own addresses don't take the peer's copy.
        if cxt.is_self_addr(&IpAddr::V4(tlv.ipv4_addr)) {
            return Vec::new();
        }

        // The VLAN must be reachable over the peer-link or an MLAG
        // port-channel.
        if !cxt.vlan_reachable(tlv.vlan_id) {
            return Vec::new();
        }

        let key = (tlv.vlan_id, tlv.ipv4_addr);
        let existing = self.entries.contains_key(&key);
        let entry = self.entries.entry(key).or_insert_with(|| ArpEntry {
            vlan_id: tlv.vlan_id,
            ipv4_addr: tlv.ipv4_addr,
            mac: tlv.mac,
            neigh_flags: tlv.flags,
            origin_ifname: tlv.ifname.clone(),
            ifname: None,
            // Not yet learned locally.
            flags: AgeFlags::LOCAL,
        });

        let mut actions = Vec::new();
        if existing {
            entry.flags.remove(AgeFlags::PEER);

            // The entry already aged out locally but the peer still carries
            // it. Re-announce the deletion so the peer ages it too.
            if entry.flags.contains(AgeFlags::LOCAL) {
                actions.push(ArpAction::Announce(TlvArpEntry::new(
                    TableOp::Del,
                    entry.vlan_id,
                    entry.ipv4_addr,
                    entry.mac,
                    entry.neigh_flags,
                    entry.origin_ifname.clone(),
                )));
            }
        }
        entry.mac = tlv.mac;
        entry.neigh_flags = tlv.flags;

        // Install the kernel neighbor on the SVI, idempotently.
        let permanent = entry
            .neigh_flags
            .intersects(NeighFlags::SELF_IP | NeighFlags::SELF_LL);
        match cxt.svi_ifname(tlv.vlan_id) {
            Some(svi) => {
                if entry.ifname.as_deref() != Some(&svi) || !existing {
                    entry.ifname = Some(svi.clone());
                    actions.push(ArpAction::Install {
                        ifname: svi,
                        ipv4_addr: tlv.ipv4_addr,
                        mac: tlv.mac,
                        permanent,
                    });
                }
            }
            None => {
                if let Some(ifname) = entry.ifname.take() {
                    actions.push(ArpAction::Uninstall {
                        ifname,
                        ipv4_addr: tlv.ipv4_addr,
                    });
                }
            }
        }

        actions
    }

    // Processes an ARP entry withdrawn by the peer.
    pub(crate) fn process_peer_del(
        &mut self,
        vlan_id: u16,
        ipv4_addr: Ipv4Addr,
    ) -> Vec<ArpAction> {
        let key = (vlan_id, ipv4_addr);
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
            Some(ifname) => vec![ArpAction::Uninstall {
                ifname,
                ipv4_addr,
            }],
            None => Vec::new(),
        }
    }

    // Ages out every entry on the peer side after the session went down.
    pub(crate) fn process_peer_down(&mut self) -> Vec<ArpAction> {
        let keys = self.entries.keys().copied().collect::<Vec<_>>();
        let mut actions = Vec::new();
        for (vlan_id, ipv4_addr) in keys {
            actions.extend(self.process_peer_del(vlan_id, ipv4_addr));
        }
        actions
    }

    // Processes a locally learned ARP entry (kernel neighbor table or raw
    // ARP listener).
    pub(crate) fn process_local_learn(
        &mut self,
        vlan_id: u16,
        ipv4_addr: Ipv4Addr,
        mac: MacAddr,
        neigh_flags: NeighFlags,
        ifname: &str,
    ) -> Vec<ArpAction> {
        let key = (vlan_id, ipv4_addr);
        let entry = self.entries.entry(key).or_insert_with(|| ArpEntry {
            vlan_id,
            ipv4_addr,
            mac,
            neigh_flags,
            origin_ifname: ifname.to_owned(),
            ifname: None,
            // Not yet advertised by the peer.
            flags: AgeFlags::PEER,
        });

        entry.flags.remove(AgeFlags::LOCAL);
        entry.mac = mac;
        entry.neigh_flags = neigh_flags;
        entry.origin_ifname = ifname.to_owned();

        vec![ArpAction::Announce(TlvArpEntry::new(
            TableOp::Add,
            vlan_id,
            ipv4_addr,
            mac,
            neigh_flags,
            ifname.to_owned(),
        ))]
    }

    // Processes a local neighbor age-out event.
    pub(crate) fn process_local_age(
        &mut self,
        vlan_id: u16,
        ipv4_addr: Ipv4Addr,
    ) -> Vec<ArpAction> {
        let key = (vlan_id, ipv4_addr);
        let Some(entry) = self.entries.get_mut(&key) else {
            return Vec::new();
        };

        entry.flags.insert(AgeFlags::LOCAL);
        if !entry.flags.contains(AgeFlags::PEER) {
            // The peer still holds the address, keep the entry.
            return Vec::new();
        }

        // Aged out on both sides.
        let entry = self.entries.remove(&key).unwrap();
        let mut actions = Vec::new();
        if let Some(ifname) = entry.ifname {
            actions.push(ArpAction::Uninstall {
                ifname,
                ipv4_addr,
            });
        }
        actions.push(ArpAction::Announce(TlvArpEntry::new(
            TableOp::Del,
            vlan_id,
            ipv4_addr,
            entry.mac,
            entry.neigh_flags,
            entry.origin_ifname,
        )));
        actions
    }

    // Full snapshot of the locally held entries, for bulk synchronization.
    pub(crate) fn bulk_entries(&self) -> Vec<TlvArpEntry> {
        self.entries
            .values()
            .filter(|entry| !entry.flags.contains(AgeFlags::LOCAL))
            .map(|entry| {
                TlvArpEntry::new(
                    TableOp::Add,
                    entry.vlan_id,
                    entry.ipv4_addr,
                    entry.mac,
                    entry.neigh_flags,
                    entry.origin_ifname.clone(),
                )
            })
            .collect()
    }

    pub(crate) fn get(
        &self,
        vlan_id: u16,
        ipv4_addr: Ipv4Addr,
    ) -> Option<&ArpEntry> {
        self.entries.get(&(vlan_id, ipv4_addr))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::Interfaces;
    use crate::interface::InterfaceType;

    const PEER_LINK: &str = "PortChannel100";
    const SVI: &str = "Vlan10";

    fn test_interfaces() -> Interfaces {
        let mut interfaces = Interfaces::default();

        let (_, iface) =
            interfaces.insert(PEER_LINK, InterfaceType::PortChannel);
        iface.is_peer_link = true;
        iface.admin_up = true;
        iface.oper_up = true;
        iface.vlan_ids.insert(10);

        let (_, iface) = interfaces.insert(SVI, InterfaceType::Vlan);
        iface.admin_up = true;
        iface.oper_up = true;
        iface.ipv4_addr = Some(Ipv4Addr::new(10, 0, 0, 1));
        iface.ipv4_prefixlen = 24;
        iface.vlan_ids.insert(10);

        interfaces
    }

    fn test_mac() -> MacAddr {
        MacAddr::from([0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0xee])
    }

    fn peer_entry(ipv4_addr: Ipv4Addr, flags: NeighFlags) -> TlvArpEntry {
        TlvArpEntry::new(
            TableOp::Add,
            10,
            ipv4_addr,
            test_mac(),
            flags,
            SVI.to_owned(),
        )
    }

    #[test]
    fn test_peer_add_installs_on_svi() {
        let interfaces = test_interfaces();
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        let mut table = ArpTable::default();

        let addr = Ipv4Addr::new(10, 0, 0, 2);
        let actions =
            table.process_peer_add(&peer_entry(addr, NeighFlags::SELF_IP), &cxt);
        assert_eq!(
            actions,
            vec![ArpAction::Install {
                ifname: SVI.to_owned(),
                ipv4_addr: addr,
                mac: test_mac(),
                // Addresses the peer owns itself are pinned.
                permanent: true,
            }]
        );
    }

    #[test]
    fn test_peer_add_self_addr_skipped() {
        let interfaces = test_interfaces();
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        let mut table = ArpTable::default();

        // 10.0.0.1 is our own SVI address.
        let addr = Ipv4Addr::new(10, 0, 0, 1);
        let actions =
            table.process_peer_add(&peer_entry(addr, NeighFlags::empty()), &cxt);
        assert_eq!(actions, vec![]);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_peer_add_vlan_unreachable() {
        let interfaces = test_interfaces();
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        let mut table = ArpTable::default();

        let tlv = TlvArpEntry::new(
            TableOp::Add,
            20,
            Ipv4Addr::new(20, 0, 0, 2),
            test_mac(),
            NeighFlags::empty(),
            "Vlan20".to_owned(),
        );
        let actions = table.process_peer_add(&tlv, &cxt);
        assert_eq!(actions, vec![]);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_local_age_kept_while_peer_holds() {
        let interfaces = test_interfaces();
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        let mut table = ArpTable::default();
        let addr = Ipv4Addr::new(10, 0, 0, 2);

        // Learned on both sides.
        table.process_local_learn(
            10,
            addr,
            test_mac(),
            NeighFlags::empty(),
            SVI,
        );
        table.process_peer_add(&peer_entry(addr, NeighFlags::empty()), &cxt);

        // Local age-out alone doesn't remove the entry.
        let actions = table.process_local_age(10, addr);
        assert_eq!(actions, vec![]);
        assert!(table.get(10, addr).is_some());

        // Peer withdrawal completes the removal.
        let actions = table.process_peer_del(10, addr);
        assert_eq!(
            actions,
            vec![ArpAction::Uninstall {
                ifname: SVI.to_owned(),
                ipv4_addr: addr,
            }]
        );
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_peer_del_unknown_entry() {
        let mut table = ArpTable::default();
        let actions = table.process_peer_del(10, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(actions, vec![]);
    }

    #[test]
    fn test_bulk_entries() {
        let interfaces = test_interfaces();
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        let mut table = ArpTable::default();

        // Only locally held entries are included in the bulk snapshot.
        table.process_local_learn(
            10,
            Ipv4Addr::new(10, 0, 0, 2),
            test_mac(),
            NeighFlags::empty(),
            SVI,
        );
        table.process_peer_add(
            &peer_entry(Ipv4Addr::new(10, 0, 0, 3), NeighFlags::empty()),
            &cxt,
        );

        let entries = table.bulk_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ipv4_addr, Ipv4Addr::new(10, 0, 0, 2));
    }
}
