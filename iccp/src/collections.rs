//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use generational_arena::{Arena, Index};

use crate::csm::Csm;
use crate::error::Error;
use crate::interface::{InterfaceType, LocalInterface};

pub type InterfaceId = usize;
pub type InterfaceIndex = Index;
pub type CsmId = usize;
pub type CsmIndex = Index;

#[derive(Debug, Default)]
pub struct Interfaces {
    // Interface arena.
    arena: Arena<LocalInterface>,
    // Interface hash table keyed by ID (1:1).
    id_tree: HashMap<InterfaceId, InterfaceIndex>,
    // Interface binary tree keyed by name (1:1).
    name_tree: BTreeMap<String, InterfaceIndex>,
    // Interface hash table keyed by ifindex (1:1).
    ifindex_tree: HashMap<u32, InterfaceIndex>,
    // Next available ID.
    next_id: InterfaceId,
}

#[derive(Debug, Default)]
pub struct Csms {
    // CSM arena.
    arena: Arena<Csm>,
    // CSM hash table keyed by ID (1:1).
    id_tree: HashMap<CsmId, CsmIndex>,
    // CSM binary tree keyed by MLAG domain ID (1:1).
    domain_tree: BTreeMap<u16, CsmIndex>,
    // CSM binary tree keyed by peer address (1:1).
    peer_addr_tree: BTreeMap<Ipv4Addr, CsmIndex>,
    // Next available ID.
    next_id: CsmId,
}

// ===== impl Interfaces =====

impl Interfaces {
    pub(crate) fn insert(
        &mut self,
        ifname: &str,
        itype: InterfaceType,
    ) -> (InterfaceIndex, &mut LocalInterface) {
        // Check for existing entry first.
        if let Some(iface_idx) = self.name_tree.get(ifname).copied() {
            let iface = &mut self.arena[iface_idx];
            iface.purged = false;
            return (iface_idx, iface);
        }

        // Create and insert interface into the arena.
        let id = self.next_id();
        let iface = LocalInterface::new(id, ifname.to_owned(), itype);
        let iface_idx = self.arena.insert(iface);

        // Link interface to different collections.
        let iface = &mut self.arena[iface_idx];
        self.id_tree.insert(iface.id, iface_idx);
        self.name_tree.insert(iface.name.clone(), iface_idx);

        (iface_idx, iface)
    }

    pub(crate) fn delete(&mut self, iface_idx: InterfaceIndex) {
        let iface = &mut self.arena[iface_idx];

        // Unlink interface from different collections.
        self.id_tree.remove(&iface.id);
        self.name_tree.remove(&iface.name);
        if let Some(ifindex) = iface.ifindex {
            self.ifindex_tree.remove(&ifindex);
        }

        // Remove interface from the arena.
        self.arena.remove(iface_idx);
    }

    // Compacts entries that were tombstoned while their CSM was
    // mid-exchange.
    pub(crate) fn purge(&mut self) {
        let purged = self
            .arena
            .iter()
            .filter(|(_, iface)| iface.purged)
            .map(|(iface_idx, _)| iface_idx)
            .collect::<Vec<_>>();
        for iface_idx in purged {
            self.delete(iface_idx);
        }
    }

    pub(crate) fn update_ifindex(
        &mut self,
        ifname: &str,
        ifindex: Option<u32>,
    ) -> Option<(InterfaceIndex, &mut LocalInterface)> {
        let iface_idx = self.name_tree.get(ifname).copied()?;
        let iface = &mut self.arena[iface_idx];

        // Update interface ifindex.
        if let Some(ifindex) = iface.ifindex {
            self.ifindex_tree.remove(&ifindex);
        }
        iface.ifindex = ifindex;
        if let Some(ifindex) = ifindex {
            self.ifindex_tree.insert(ifindex, iface_idx);
        }

        Some((iface_idx, iface))
    }

    // Returns a reference to the interface corresponding to the given ID.
    pub(crate) fn get_by_id(
        &self,
        id: InterfaceId,
    ) -> Result<(InterfaceIndex, &LocalInterface), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(|iface_idx| (iface_idx, &self.arena[iface_idx]))
            .ok_or(Error::InterfaceIdNotFound(id))
    }

    // Returns a reference to the interface corresponding to the given name.
    pub(crate) fn get_by_name(
        &self,
        ifname: &str,
    ) -> Option<(InterfaceIndex, &LocalInterface)> {
        self.name_tree
            .get(ifname)
            .copied()
            .map(|iface_idx| (iface_idx, &self.arena[iface_idx]))
    }

    // Returns a mutable reference to the interface corresponding to the
    // given name.
    pub(crate) fn get_mut_by_name(
        &mut self,
        ifname: &str,
    ) -> Option<(InterfaceIndex, &mut LocalInterface)> {
        self.name_tree
            .get(ifname)
            .copied()
            .map(move |iface_idx| (iface_idx, &mut self.arena[iface_idx]))
    }

    // Returns a reference to the interface corresponding to the given
    // ifindex.
    pub(crate) fn get_by_ifindex(
        &self,
        ifindex: u32,
    ) -> Option<(InterfaceIndex, &LocalInterface)> {
        self.ifindex_tree
            .get(&ifindex)
            .copied()
            .map(|iface_idx| (iface_idx, &self.arena[iface_idx]))
    }

    // Returns a mutable reference to the interface corresponding to the
    // given ifindex.
    pub(crate) fn get_mut_by_ifindex(
        &mut self,
        ifindex: u32,
    ) -> Option<(InterfaceIndex, &mut LocalInterface)> {
        self.ifindex_tree
            .get(&ifindex)
            .copied()
            .map(move |iface_idx| (iface_idx, &mut self.arena[iface_idx]))
    }

    // Returns an iterator visiting all interfaces.
    //
    // Interfaces are ordered by their names.
    pub(crate) fn iter(
        &self,
    ) -> impl Iterator<Item = &'_ LocalInterface> + '_ {
        self.name_tree
            .values()
            .map(|iface_idx| &self.arena[*iface_idx])
    }

    // Returns an iterator visiting all interfaces with mutable references.
    //
    // Order of iteration is not defined.
    pub(crate) fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = &'_ mut LocalInterface> + '_ {
        self.arena.iter_mut().map(|(_, iface)| iface)
    }

    fn next_id(&mut self) -> InterfaceId {
        self.next_id += 1;
        self.next_id
    }
}

// ===== impl Csms =====

impl Csms {
    pub(crate) fn insert(
        &mut self,
        domain_id: u16,
        local_addr: Ipv4Addr,
        peer_addr: Ipv4Addr,
    ) -> (CsmIndex, &mut Csm) {
        // Check for existing entry first.
        if let Some(csm_idx) = self.domain_tree.get(&domain_id).copied() {
            let csm = &mut self.arena[csm_idx];
            return (csm_idx, csm);
        }

        // Create and insert CSM into the arena.
        let id = self.next_id();
        let csm = Csm::new(id, domain_id, local_addr, peer_addr);
        let csm_idx = self.arena.insert(csm);

        // Link CSM to different collections.
        let csm = &mut self.arena[csm_idx];
        self.id_tree.insert(csm.id, csm_idx);
        self.domain_tree.insert(csm.domain_id, csm_idx);
        self.peer_addr_tree.insert(csm.peer_addr, csm_idx);

        (csm_idx, csm)
    }

    pub(crate) fn delete(&mut self, csm_idx: CsmIndex) {
        let csm = &mut self.arena[csm_idx];

        // Unlink CSM from different collections.
        self.id_tree.remove(&csm.id);
        self.domain_tree.remove(&csm.domain_id);
        self.peer_addr_tree.remove(&csm.peer_addr);

        // Remove CSM from the arena.
        self.arena.remove(csm_idx);
    }

    // Returns a reference to the CSM corresponding to the given ID.
    pub(crate) fn get_by_id(
        &self,
        id: CsmId,
    ) -> Result<(CsmIndex, &Csm), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(|csm_idx| (csm_idx, &self.arena[csm_idx]))
            .ok_or(Error::CsmIdNotFound(id))
    }

    // Returns a mutable reference to the CSM corresponding to the given ID.
    pub(crate) fn get_mut_by_id(
        &mut self,
        id: CsmId,
    ) -> Result<(CsmIndex, &mut Csm), Error> {
        self.id_tree
            .get(&id)
            .copied()
            .map(move |csm_idx| (csm_idx, &mut self.arena[csm_idx]))
            .ok_or(Error::CsmIdNotFound(id))
    }

    // Returns a reference to the CSM corresponding to the given MLAG domain
    // ID.
    pub(crate) fn get_by_domain_id(
        &self,
        domain_id: u16,
    ) -> Option<(CsmIndex, &Csm)> {
        self.domain_tree
            .get(&domain_id)
            .copied()
            .map(|csm_idx| (csm_idx, &self.arena[csm_idx]))
    }

    // Returns a mutable reference to the CSM corresponding to the given
    // peer address.
    pub(crate) fn get_mut_by_peer_addr(
        &mut self,
        peer_addr: &Ipv4Addr,
    ) -> Option<(CsmIndex, &mut Csm)> {
        self.peer_addr_tree
            .get(peer_addr)
            .copied()
            .map(move |csm_idx| (csm_idx, &mut self.arena[csm_idx]))
    }

    // Returns an iterator visiting all CSMs.
    //
    // CSMs are ordered by their MLAG domain IDs.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &'_ Csm> + '_ {
        self.domain_tree.values().map(|csm_idx| &self.arena[*csm_idx])
    }

    pub(crate) fn indexes(&self) -> impl Iterator<Item = CsmIndex> + '_ {
        self.domain_tree.values().copied()
    }

    fn next_id(&mut self) -> CsmId {
        self.next_id += 1;
        self.next_id
    }
}

impl std::ops::Index<CsmIndex> for Csms {
    type Output = Csm;

    fn index(&self, index: CsmIndex) -> &Self::Output {
        &self.arena[index]
    }
}

impl std::ops::IndexMut<CsmIndex> for Csms {
    fn index_mut(&mut self, index: CsmIndex) -> &mut Self::Output {
        &mut self.arena[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interfaces_insert_is_idempotent() {
        let mut interfaces = Interfaces::default();

        let (idx1, iface) =
            interfaces.insert("PortChannel1", InterfaceType::PortChannel);
        let id1 = iface.id;
        iface.purged = true;

        // Reinserting an existing name returns the same entry and clears
        // the tombstone.
        let (idx2, iface) =
            interfaces.insert("PortChannel1", InterfaceType::PortChannel);
        assert_eq!(idx1, idx2);
        assert_eq!(iface.id, id1);
        assert!(!iface.purged);
    }

    #[test]
    fn test_interfaces_lookups() {
        let mut interfaces = Interfaces::default();
        interfaces.insert("Ethernet0", InterfaceType::Port);
        let (_, iface) =
            interfaces.insert("PortChannel1", InterfaceType::PortChannel);
        let id = iface.id;

        assert!(interfaces.update_ifindex("PortChannel1", Some(100)).is_some());
        assert!(interfaces.get_by_ifindex(100).is_some());
        assert!(interfaces.get_by_name("PortChannel1").is_some());
        assert!(interfaces.get_by_id(id).is_ok());
        assert!(matches!(
            interfaces.get_by_id(1000),
            Err(Error::InterfaceIdNotFound(1000))
        ));

        // Iteration is ordered by name.
        let names = interfaces
            .iter()
            .map(|iface| iface.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Ethernet0", "PortChannel1"]);

        // Reassigning the ifindex drops the old mapping.
        assert!(interfaces.update_ifindex("PortChannel1", Some(200)).is_some());
        assert!(interfaces.get_by_ifindex(100).is_none());
        assert!(interfaces.get_by_ifindex(200).is_some());
    }

    #[test]
    fn test_interfaces_purge() {
        let mut interfaces = Interfaces::default();
        interfaces.insert("PortChannel1", InterfaceType::PortChannel);
        let (_, iface) =
            interfaces.insert("PortChannel2", InterfaceType::PortChannel);
        iface.purged = true;

        interfaces.purge();
        assert!(interfaces.get_by_name("PortChannel1").is_some());
        assert!(interfaces.get_by_name("PortChannel2").is_none());
    }

    #[test]
    fn test_csms_lookups() {
        let mut csms = Csms::default();
        let local_addr = Ipv4Addr::new(10, 0, 0, 1);
        let peer_addr = Ipv4Addr::new(10, 0, 0, 2);

        let (csm_idx, csm) = csms.insert(1, local_addr, peer_addr);
        let id = csm.id;

        // Reinserting the same domain returns the existing entry.
        let (csm_idx2, _) = csms.insert(1, local_addr, peer_addr);
        assert_eq!(csm_idx, csm_idx2);

        assert!(csms.get_by_id(id).is_ok());
        assert!(csms.get_by_domain_id(1).is_some());
        assert!(csms.get_mut_by_peer_addr(&peer_addr).is_some());
        assert_eq!(csms.indexes().count(), 1);

        csms.delete(csm_idx);
        assert!(matches!(csms.get_by_id(id), Err(Error::CsmIdNotFound(_))));
        assert!(csms.get_by_domain_id(1).is_none());
    }
}
