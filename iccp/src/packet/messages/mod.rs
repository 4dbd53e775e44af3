//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod aggregate;
pub mod arp;
pub mod heartbeat;
pub mod mac;
pub mod ndisc;
pub mod notification;
pub mod portchannel;
pub mod system;
pub mod warmboot;

pub use aggregate::*;
pub use arp::*;
pub use heartbeat::*;
pub use mac::*;
pub use ndisc::*;
pub use notification::*;
pub use portchannel::*;
pub use system::*;
pub use warmboot::*;

use bitflags::bitflags;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};

// Table entry operation carried by the MAC/ARP/ND info messages.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum TableOp {
    Add = 1,
    Del = 2,
}

// FDB entry type.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum MacType {
    Dynamic = 1,
    Static = 2,
}

// Administrative/operational port state.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PortState {
    Up = 1,
    Down = 2,
}

bitflags! {
    // Neighbor entry flags carried by the ARP/ND info messages.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct NeighFlags: u8 {
        // The address belongs to the sending chassis itself.
        const SELF_IP = 0x01;
        // Link-local address owned by the sending chassis.
        const SELF_LL = 0x02;
    }
}

// ===== impl TableOp =====

impl std::fmt::Display for TableOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableOp::Add => write!(f, "add"),
            TableOp::Del => write!(f, "del"),
        }
    }
}

// ===== impl PortState =====

impl std::fmt::Display for PortState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortState::Up => write!(f, "up"),
            PortState::Down => write!(f, "down"),
        }
    }
}
