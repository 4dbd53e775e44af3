//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![allow(clippy::too_many_arguments)]

pub mod collections;
pub mod consistency;
pub mod csm;
pub mod debug;
pub mod error;
pub mod events;
pub mod instance;
pub mod interface;
pub mod mlacp;
pub mod network;
pub mod packet;
pub mod southbound;
pub mod sync;
pub mod tasks;
