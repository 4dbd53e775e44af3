//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};
use tracing::{warn, warn_span};

use crate::collections::{CsmId, InterfaceId};
use crate::csm;
use crate::packet::error::DecodeError;
use crate::packet::messages::notification::StatusCode;

// ICCP errors.
#[derive(Debug, Deserialize, Serialize)]
pub enum Error {
    // I/O errors
    #[serde(skip)]
    IoError(IoError),
    // Inter-task communication
    CsmIdNotFound(CsmId),
    InterfaceIdNotFound(InterfaceId),
    // Other
    CsmMsgDecodeError(Ipv4Addr, DecodeError),
    CsmRcvdNak(Ipv4Addr, StatusCode),
    CsmSentNak(Ipv4Addr, StatusCode),
    CsmFsmUnexpectedEvent(Ipv4Addr, csm::fsm::State, csm::fsm::Event),
    CsmHeartbeatTimeout(Ipv4Addr),
    CsmEqualPeerAddr(Ipv4Addr),
    TcpConnClosed(Ipv4Addr),
    TcpInvalidConnRequest(IpAddr),
    InterfaceParentNotFound(String, String),
}

// ICCP I/O errors.
#[derive(Debug)]
pub enum IoError {
    TcpSocketError(std::io::Error),
    TcpAcceptError(std::io::Error),
    TcpConnectError(std::io::Error),
    TcpInfoError(std::io::Error),
    TcpRecvError(std::io::Error),
    TcpSendError(std::io::Error),
    PacketSocketError(std::io::Error),
    PacketRecvError(std::io::Error),
    SyncdConnectError(std::io::Error),
    SyncdRecvError(std::io::Error),
    SyncdSendError(std::io::Error),
    NetlinkError(std::io::Error),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::IoError(error) => {
                error.log();
            }
            Error::CsmIdNotFound(csm_id) => {
                warn!(?csm_id, "{}", self);
            }
            Error::InterfaceIdNotFound(iface_id) => {
                warn!(?iface_id, "{}", self);
            }
            Error::CsmMsgDecodeError(peer_addr, error) => {
                warn_span!("session", %peer_addr).in_scope(|| {
                    warn!(error = %with_source(error), "{}", self);
                });
            }
            Error::CsmRcvdNak(peer_addr, status)
            | Error::CsmSentNak(peer_addr, status) => {
                warn_span!("session", %peer_addr).in_scope(|| {
                    warn!(%status, "{}", self);
                });
            }
            Error::CsmFsmUnexpectedEvent(peer_addr, state, event) => {
                warn_span!("session", %peer_addr).in_scope(|| {
                    warn_span!("fsm").in_scope(|| {
                        warn!(?state, ?event, "{}", self);
                    });
                });
            }
            Error::CsmHeartbeatTimeout(peer_addr)
            | Error::TcpConnClosed(peer_addr)
            | Error::CsmEqualPeerAddr(peer_addr) => {
                warn_span!("session", %peer_addr).in_scope(|| {
                    warn!("{}", self);
                });
            }
            Error::TcpInvalidConnRequest(addr) => {
                warn!(address = %addr, "{}", self);
            }
            Error::InterfaceParentNotFound(member, parent) => {
                warn!(%member, %parent, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(error) => error.fmt(f),
            Error::CsmIdNotFound(..) => {
                write!(f, "CSM ID not found")
            }
            Error::InterfaceIdNotFound(..) => {
                write!(f, "interface ID not found")
            }
            Error::CsmMsgDecodeError(..) => {
                write!(f, "failed to decode message")
            }
            Error::CsmRcvdNak(..) => {
                write!(f, "received NAK message")
            }
            Error::CsmSentNak(..) => {
                write!(f, "sent NAK message")
            }
            Error::CsmFsmUnexpectedEvent(..) => {
                write!(f, "unexpected event")
            }
            Error::CsmHeartbeatTimeout(..) => {
                write!(f, "peer heartbeat timed out")
            }
            Error::CsmEqualPeerAddr(..) => {
                write!(f, "local and peer addresses are equal")
            }
            Error::TcpConnClosed(..) => {
                write!(f, "connection closed by remote end")
            }
            Error::TcpInvalidConnRequest(..) => {
                write!(f, "connection request from unknown peer")
            }
            Error::InterfaceParentNotFound(..) => {
                write!(f, "parent aggregate interface not found")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(error) => Some(error),
            Error::CsmMsgDecodeError(_, error) => Some(error),
            _ => None,
        }
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::IoError(error)
    }
}

// ===== impl IoError =====

impl IoError {
    pub(crate) fn log(&self) {
        match self {
            IoError::TcpSocketError(error)
            | IoError::TcpAcceptError(error)
            | IoError::TcpConnectError(error)
            | IoError::TcpInfoError(error)
            | IoError::TcpRecvError(error)
            | IoError::TcpSendError(error)
            | IoError::PacketSocketError(error)
            | IoError::PacketRecvError(error)
            | IoError::SyncdConnectError(error)
            | IoError::SyncdRecvError(error)
            | IoError::SyncdSendError(error)
            | IoError::NetlinkError(error) => {
                warn!(error = %with_source(error), "{}", self);
            }
        }
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::TcpSocketError(..) => {
                write!(f, "failed to create TCP socket")
            }
            IoError::TcpAcceptError(..) => {
                write!(f, "failed to accept connection request")
            }
            IoError::TcpConnectError(..) => {
                write!(f, "failed to establish TCP connection")
            }
            IoError::TcpInfoError(..) => {
                write!(
                    f,
                    "failed to fetch address and port information from the socket"
                )
            }
            IoError::TcpRecvError(..) => {
                write!(f, "failed to read TCP data")
            }
            IoError::TcpSendError(..) => {
                write!(f, "failed to send TCP data")
            }
            IoError::PacketSocketError(..) => {
                write!(f, "failed to create packet socket")
            }
            IoError::PacketRecvError(..) => {
                write!(f, "failed to receive packet data")
            }
            IoError::SyncdConnectError(..) => {
                write!(f, "failed to connect to the MCLAG syncd socket")
            }
            IoError::SyncdRecvError(..) => {
                write!(f, "failed to read data from MCLAG syncd")
            }
            IoError::SyncdSendError(..) => {
                write!(f, "failed to send data to MCLAG syncd")
            }
            IoError::NetlinkError(..) => {
                write!(f, "netlink request failed")
            }
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoError::TcpSocketError(error)
            | IoError::TcpAcceptError(error)
            | IoError::TcpConnectError(error)
            | IoError::TcpInfoError(error)
            | IoError::TcpRecvError(error)
            | IoError::TcpSendError(error)
            | IoError::PacketSocketError(error)
            | IoError::PacketRecvError(error)
            | IoError::SyncdConnectError(error)
            | IoError::SyncdRecvError(error)
            | IoError::SyncdSendError(error)
            | IoError::NetlinkError(error) => Some(error),
        }
    }
}

// ===== global functions =====

fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}
