//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::os::fd::{AsRawFd, OwnedFd};

use iccp_utils::MacAddr;
use nix::sys::socket::{
    recvfrom, socket, AddressFamily, LinkAddr, SockFlag, SockProtocol,
    SockType,
};
use tokio::sync::mpsc::Sender;

use crate::error::IoError;
use crate::southbound::TopologyEvent;
use crate::tasks::messages::input::TopologyEventMsg;

const ETH_HDR_LEN: usize = 14;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_ARP: u16 = 0x0806;
const ETHERTYPE_IPV6: u16 = 0x86dd;
const ARP_OP_REPLY: u16 = 2;
const IPV6_HDR_LEN: usize = 40;
const IPPROTO_ICMPV6: u8 = 58;
const ICMPV6_NEIGH_ADV: u8 = 136;
const ND_OPT_TARGET_LLADDR: u8 = 2;

// ===== helper functions =====

fn get_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn get_mac(data: &[u8], offset: usize) -> Option<MacAddr> {
    let bytes = data.get(offset..offset + MacAddr::LENGTH)?;
    let mut octets = [0; MacAddr::LENGTH];
    octets.copy_from_slice(bytes);
    Some(MacAddr::from(octets))
}

// Parses an ARP reply, returning the sender's address pair.
fn parse_arp(data: &[u8]) -> Option<(IpAddr, MacAddr)> {
    let opcode = get_u16(data, 6)?;
    if opcode != ARP_OP_REPLY {
        return None;
    }

    let sender_mac = get_mac(data, 8)?;
    let sender_ip = data.get(14..18)?;
    let mut octets = [0; 4];
    octets.copy_from_slice(sender_ip);
    let sender_ip = Ipv4Addr::from(octets);
    if sender_ip.is_unspecified() {
        return None;
    }

    Some((IpAddr::V4(sender_ip), sender_mac))
}

// Parses an ICMPv6 neighbor advertisement, returning the target address and
// its link-layer address option.
fn parse_neigh_adv(data: &[u8]) -> Option<(IpAddr, MacAddr)> {
    if *data.get(6)? != IPPROTO_ICMPV6 {
        return None;
    }
    let icmp = data.get(IPV6_HDR_LEN..)?;
    if *icmp.first()? != ICMPV6_NEIGH_ADV {
        return None;
    }

    let target = icmp.get(8..24)?;
    let mut octets = [0; 16];
    octets.copy_from_slice(target);
    let target = Ipv6Addr::from(octets);

    // Walk the options looking for the target link-layer address.
    let mut options = icmp.get(24..)?;
    while options.len() >= 2 {
        let opt_type = options[0];
        let opt_len = options[1] as usize * 8;
        if opt_len == 0 || options.len() < opt_len {
            return None;
        }
        if opt_type == ND_OPT_TARGET_LLADDR {
            let lladdr = get_mac(options, 2)?;
            return Some((IpAddr::V6(target), lladdr));
        }
        options = &options[opt_len..];
    }

    None
}

// Parses an Ethernet frame, returning the learned neighbor when it carries
// an ARP reply or an IPv6 neighbor advertisement.
fn parse_frame(data: &[u8]) -> Option<(IpAddr, MacAddr)> {
    let mut ethertype = get_u16(data, 12)?;
    let mut payload = data.get(ETH_HDR_LEN..)?;

    // Skip over a 802.1Q tag.
    if ethertype == ETHERTYPE_VLAN {
        ethertype = get_u16(data, 16)?;
        payload = data.get(ETH_HDR_LEN + 4..)?;
    }

    match ethertype {
        ETHERTYPE_ARP => parse_arp(payload),
        ETHERTYPE_IPV6 => parse_neigh_adv(payload),
        _ => None,
    }
}

// ===== global functions =====

pub(crate) fn listen_socket() -> Result<OwnedFd, std::io::Error> {
    socket(
        AddressFamily::Packet,
        SockType::Raw,
        SockFlag::empty(),
        SockProtocol::EthAll,
    )
    .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
}

// Blocking read loop learning addresses from ARP replies and IPv6 neighbor
// advertisements ahead of the kernel neighbor table.
pub(crate) fn read_loop(
    socket: OwnedFd,
    neigh_txp: Sender<TopologyEventMsg>,
) {
    let mut buf = [0; 2048];

    loop {
        let (num_bytes, saddr) =
            match recvfrom::<LinkAddr>(socket.as_raw_fd(), &mut buf) {
                Ok((num_bytes, saddr)) => (num_bytes, saddr),
                Err(errno) => {
                    IoError::PacketRecvError(
                        std::io::Error::from_raw_os_error(errno as i32),
                    )
                    .log();
                    continue;
                }
            };
        let Some(saddr) = saddr else {
            continue;
        };
        let ifindex = saddr.ifindex() as u32;

        if let Some((addr, lladdr)) = parse_frame(&buf[0..num_bytes]) {
            let event = TopologyEvent::NeighUpsert {
                ifindex,
                addr,
                lladdr,
            };
            if neigh_txp.blocking_send(TopologyEventMsg { event }).is_err() {
                return;
            }
        }
    }
}
