//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod bytes;
pub mod mac_addr;
pub mod task;

pub use mac_addr::MacAddr;
