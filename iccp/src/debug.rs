//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use iccp_utils::MacAddr;
use tracing::{debug, debug_span};

use crate::consistency::ConfigConsistency;
use crate::csm;
use crate::mlacp;
use crate::packet::Message;

// ICCP debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    InstanceStart,
    InstanceStop(&'a str),
    CsmCreate(&'a Ipv4Addr),
    CsmDelete(&'a Ipv4Addr),
    CsmFsmTransition(
        &'a Ipv4Addr,
        &'a csm::fsm::Event,
        &'a csm::fsm::State,
        &'a csm::fsm::State,
    ),
    MlacpFsmTransition(
        &'a Ipv4Addr,
        &'a mlacp::fsm::State,
        &'a mlacp::fsm::State,
    ),
    CsmMsgRx(&'a Ipv4Addr, &'a Message),
    CsmMsgTx(&'a Ipv4Addr, &'a Message),
    CsmWarmbootRx(&'a Ipv4Addr),
    InterfaceCreate(&'a str),
    InterfaceDelete(&'a str),
    InterfaceBind(&'a str, u16),
    InterfaceUnbind(&'a str),
    PeerInterfaceCreate(&'a Ipv4Addr, &'a str),
    PeerInterfaceDelete(&'a Ipv4Addr, &'a str),
    ConsistencyCheck(&'a str, &'a ConfigConsistency),
    StandbyMacUpdate(&'a str, &'a MacAddr),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::InstanceStart => {
                // Parent span(s): iccp-instance
                debug!("{}", self);
            }
            Debug::InstanceStop(reason) => {
                // Parent span(s): iccp-instance
                debug!(%reason, "{}", self);
            }
            Debug::CsmCreate(peer_addr)
            | Debug::CsmDelete(peer_addr)
            | Debug::CsmWarmbootRx(peer_addr) => {
                // Parent span(s): iccp-instance
                debug_span!("session", %peer_addr).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::CsmFsmTransition(peer_addr, event, old_state, new_state) => {
                // Parent span(s): iccp-instance
                debug_span!("session", %peer_addr).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?event, ?old_state, ?new_state, "{}", self);
                    })
                });
            }
            Debug::MlacpFsmTransition(peer_addr, old_state, new_state) => {
                // Parent span(s): iccp-instance
                debug_span!("session", %peer_addr).in_scope(|| {
                    debug_span!("mlacp").in_scope(|| {
                        debug!(?old_state, ?new_state, "{}", self);
                    })
                });
            }
            Debug::CsmMsgRx(peer_addr, msg) => {
                // Parent span(s): iccp-instance
                debug_span!("session", %peer_addr).in_scope(|| {
                    debug_span!("input").in_scope(|| {
                        let data = serde_json::to_string(&msg).unwrap();
                        debug!(r#type = %msg.msg_type(), %data, "{}", self);
                    })
                });
            }
            Debug::CsmMsgTx(peer_addr, msg) => {
                // Parent span(s): iccp-instance
                debug_span!("session", %peer_addr).in_scope(|| {
                    debug_span!("output").in_scope(|| {
                        let data = serde_json::to_string(&msg).unwrap();
                        debug!(r#type = %msg.msg_type(), %data, "{}", self);
                    })
                });
            }
            Debug::InterfaceCreate(name)
            | Debug::InterfaceDelete(name)
            | Debug::InterfaceUnbind(name) => {
                // Parent span(s): iccp-instance
                debug_span!("interface", %name).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::InterfaceBind(name, domain_id) => {
                // Parent span(s): iccp-instance
                debug_span!("interface", %name).in_scope(|| {
                    debug!(%domain_id, "{}", self);
                });
            }
            Debug::PeerInterfaceCreate(peer_addr, name)
            | Debug::PeerInterfaceDelete(peer_addr, name) => {
                // Parent span(s): iccp-instance
                debug_span!("session", %peer_addr).in_scope(|| {
                    debug!(%name, "{}", self);
                });
            }
            Debug::ConsistencyCheck(name, result) => {
                // Parent span(s): iccp-instance
                debug_span!("interface", %name).in_scope(|| {
                    debug!(%result, "{}", self);
                });
            }
            Debug::StandbyMacUpdate(name, mac) => {
                // Parent span(s): iccp-instance
                debug_span!("interface", %name).in_scope(|| {
                    debug!(%mac, "{}", self);
                });
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::InstanceStart => {
                write!(f, "starting instance")
            }
            Debug::InstanceStop(..) => {
                write!(f, "stopping instance")
            }
            Debug::CsmCreate(..) => {
                write!(f, "session created")
            }
            Debug::CsmDelete(..) => {
                write!(f, "session deleted")
            }
            Debug::CsmFsmTransition(..) | Debug::MlacpFsmTransition(..) => {
                write!(f, "state transition")
            }
            Debug::CsmMsgRx(..) | Debug::CsmMsgTx(..) => {
                write!(f, "message")
            }
            Debug::CsmWarmbootRx(..) => {
                write!(f, "peer entered warmboot")
            }
            Debug::InterfaceCreate(..) => {
                write!(f, "interface created")
            }
            Debug::InterfaceDelete(..) => {
                write!(f, "interface deleted")
            }
            Debug::InterfaceBind(..) => {
                write!(f, "interface bound to MLAG domain")
            }
            Debug::InterfaceUnbind(..) => {
                write!(f, "interface unbound from MLAG domain")
            }
            Debug::PeerInterfaceCreate(..) => {
                write!(f, "peer interface created")
            }
            Debug::PeerInterfaceDelete(..) => {
                write!(f, "peer interface deleted")
            }
            Debug::ConsistencyCheck(..) => {
                write!(f, "configuration consistency check")
            }
            Debug::StandbyMacUpdate(..) => {
                write!(f, "updating port-channel MAC to peer system MAC")
            }
        }
    }
}
