//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv6Addr};

use iccp_utils::MacAddr;

use crate::packet::messages::{NeighFlags, TableOp, TlvNdiscEntry};
use crate::sync::{AgeFlags, EgressCxt};

// Reconciled IPv6 neighbor table, keyed by (VLAN, address).
#[derive(Debug, Default)]
pub struct NdiscTable {
    entries: BTreeMap<(u16, Ipv6Addr), NdiscEntry>,
}

#[derive(Debug)]
pub struct NdiscEntry {
    pub vlan_id: u16,
    pub ipv6_addr: Ipv6Addr,
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
pub enum NdiscAction {
    // Install a kernel neighbor via netlink. The peer's own addresses and
    // link-local addresses are installed as permanent entries.
    Install {
        ifname: String,
        ipv6_addr: Ipv6Addr,
        mac: MacAddr,
        permanent: bool,
    },
    // Remove the kernel neighbor.
    Uninstall {
        ifname: String,
        ipv6_addr: Ipv6Addr,
    },
    // Announce the entry to the peer.
    Announce(TlvNdiscEntry),
}

// ===== impl NdiscTable =====

impl NdiscTable {
    // Processes an ND entry advertised by the peer.
    pub(crate) fn process_peer_add(
        &mut self,
        tlv: &TlvNdiscEntry,
        cxt: &EgressCxt<'_>,
    ) -> Vec<NdiscAction> {
        // Our own addresses don't take the peer's copy.
        if cxt.is_self_addr(&IpAddr::V6(tlv.ipv6_addr)) {
            return Vec::new();
        }

        // The VLAN must be reachable over the peer-link or an MLAG
        // port-channel.
        if !cxt.vlan_reachable(tlv.vlan_id) {
            return Vec::new();
        }

        let key = (tlv.vlan_id, tlv.ipv6_addr);
        let existing = self.entries.contains_key(&key);
        let entry = self.entries.entry(key).or_insert_with(|| NdiscEntry {
            vlan_id: tlv.vlan_id,
            ipv6_addr: tlv.ipv6_addr,
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
                actions.push(NdiscAction::Announce(TlvNdiscEntry::new(
                    TableOp::Del,
                    entry.vlan_id,
                    entry.ipv6_addr,
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
                    actions.push(NdiscAction::Install {
                        ifname: svi,
                        ipv6_addr: tlv.ipv6_addr,
                        mac: tlv.mac,
                        permanent,
                    });
                }
            }
            None => {
                if let Some(ifname) = entry.ifname.take() {
                    actions.push(NdiscAction::Uninstall {
                        ifname,
                        ipv6_addr: tlv.ipv6_addr,
                    });
                }
            }
        }

        actions
    }

    // Processes an ND entry withdrawn by the peer.
    pub(crate) fn process_peer_del(
        &mut self,
        vlan_id: u16,
        ipv6_addr: Ipv6Addr,
    ) -> Vec<NdiscAction> {
        let key = (vlan_id, ipv6_addr);
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
            Some(ifname) => vec![NdiscAction::Uninstall {
                ifname,
                ipv6_addr,
            }],
            None => Vec::new(),
        }
    }

    // Ages out every entry on the peer side after the session went down.
    pub(crate) fn process_peer_down(&mut self) -> Vec<NdiscAction> {
        let keys = self.entries.keys().copied().collect::<Vec<_>>();
        let mut actions = Vec::new();
        for (vlan_id, ipv6_addr) in keys {
            actions.extend(self.process_peer_del(vlan_id, ipv6_addr));
        }
        actions
    }

    // Processes a locally learned ND entry (kernel neighbor table or raw
    // neighbor-advertisement listener).
    pub(crate) fn process_local_learn(
        &mut self,
        vlan_id: u16,
        ipv6_addr: Ipv6Addr,
        mac: MacAddr,
        neigh_flags: NeighFlags,
        ifname: &str,
    ) -> Vec<NdiscAction> {
        let key = (vlan_id, ipv6_addr);
        let entry = self.entries.entry(key).or_insert_with(|| NdiscEntry {
            vlan_id,
            ipv6_addr,
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

        vec![NdiscAction::Announce(TlvNdiscEntry::new(
            TableOp::Add,
            vlan_id,
            ipv6_addr,
            mac,
            neigh_flags,
            ifname.to_owned(),
        ))]
    }

    // Processes a local neighbor age-out event.
    pub(crate) fn process_local_age(
        &mut self,
        vlan_id: u16,
        ipv6_addr: Ipv6Addr,
    ) -> Vec<NdiscAction> {
        let key = (vlan_id, ipv6_addr);
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
            actions.push(NdiscAction::Uninstall {
                ifname,
                ipv6_addr,
            });
        }
        actions.push(NdiscAction::Announce(TlvNdiscEntry::new(
            TableOp::Del,
            vlan_id,
            ipv6_addr,
            entry.mac,
            entry.neigh_flags,
            entry.origin_ifname,
        )));
        actions
    }

    // Full snapshot of the locally held entries, for bulk synchronization.
    pub(crate) fn bulk_entries(&self) -> Vec<TlvNdiscEntry> {
        self.entries
            .values()
            .filter(|entry| !entry.flags.contains(AgeFlags::LOCAL))
            .map(|entry| {
                TlvNdiscEntry::new(
                    TableOp::Add,
                    entry.vlan_id,
                    entry.ipv6_addr,
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
        ipv6_addr: Ipv6Addr,
    ) -> Option<&NdiscEntry> {
        self.entries.get(&(vlan_id, ipv6_addr))
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
        iface.ipv6_addr = Some(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1));
        iface.ipv6_prefixlen = 64;
        iface.vlan_ids.insert(10);

        interfaces
    }

    fn test_mac() -> MacAddr {
        MacAddr::from([0x00, 0xaa, 0xbb, 0xcc, 0xdd, 0xee])
    }

    #[test]
    fn test_peer_add_link_local_pinned() {
        let interfaces = test_interfaces();
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        let mut table = NdiscTable::default();

        // The peer's link-local address is installed as a permanent entry.
        let addr = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 2);
        let tlv = TlvNdiscEntry::new(
            TableOp::Add,
            10,
            addr,
            test_mac(),
            NeighFlags::SELF_LL,
            SVI.to_owned(),
        );
        let actions = table.process_peer_add(&tlv, &cxt);
        assert_eq!(
            actions,
            vec![NdiscAction::Install {
                ifname: SVI.to_owned(),
                ipv6_addr: addr,
                mac: test_mac(),
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
        let mut table = NdiscTable::default();

        // 2001:db8::1 is our own SVI address.
        let addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);
        let tlv = TlvNdiscEntry::new(
            TableOp::Add,
            10,
            addr,
            test_mac(),
            NeighFlags::empty(),
            SVI.to_owned(),
        );
        let actions = table.process_peer_add(&tlv, &cxt);
        assert_eq!(actions, vec![]);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_two_phase_aging() {
        let interfaces = test_interfaces();
        let cxt = EgressCxt {
            interfaces: &interfaces,
            peer_link: Some(PEER_LINK),
        };
        let mut table = NdiscTable::default();
        let addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 2);

        // Learned on both sides.
        table.process_local_learn(
            10,
            addr,
            test_mac(),
            NeighFlags::empty(),
            SVI,
        );
        let tlv = TlvNdiscEntry::new(
            TableOp::Add,
            10,
            addr,
            test_mac(),
            NeighFlags::empty(),
            SVI.to_owned(),
        );
        table.process_peer_add(&tlv, &cxt);

        // One-sided aging keeps the entry alive.
        assert_eq!(table.process_local_age(10, addr), vec![]);
        assert!(table.get(10, addr).is_some());

        // Aging on the second side removes it.
        let actions = table.process_peer_del(10, addr);
        assert_eq!(
            actions,
            vec![NdiscAction::Uninstall {
                ifname: SVI.to_owned(),
                ipv6_addr: addr,
            }]
        );
        assert_eq!(table.len(), 0);
    }
}
