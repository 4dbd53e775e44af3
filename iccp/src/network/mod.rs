//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod tcp;

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

// ICCP session TCP port.
pub const ICCP_PORT: u16 = 8888;

// TCP connection address/port information.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct TcpConnInfo {
    pub local_addr: Ipv4Addr,
    pub local_port: u16,
    pub remote_addr: Ipv4Addr,
    pub remote_port: u16,
}
