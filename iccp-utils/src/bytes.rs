//
// Copyright (c) The iccpd-rs Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cell::RefCell;
use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mac_addr::MacAddr;

thread_local!(
    pub static TLS_BUF: RefCell<BytesMut> =
        RefCell::new(BytesMut::with_capacity(4096))
);

/// Error returned when a fallible read runs past the end of the buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TryGetError;

impl std::fmt::Display for TryGetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unexpected end of buffer")
    }
}

impl std::error::Error for TryGetError {}

// Extension methods for Bytes.
//
// The `try_get_*` family checks the remaining length before advancing, so
// malformed input surfaces as an error instead of a panic.
pub trait BytesExt {
    fn try_get_u8(&mut self) -> Result<u8, TryGetError>;
    fn try_get_u16(&mut self) -> Result<u16, TryGetError>;
    fn try_get_u32(&mut self) -> Result<u32, TryGetError>;
    fn try_get_ipv4(&mut self) -> Result<Ipv4Addr, TryGetError>;
    fn try_get_ipv6(&mut self) -> Result<Ipv6Addr, TryGetError>;
    fn try_get_mac(&mut self) -> Result<MacAddr, TryGetError>;
    fn try_get_string(&mut self, len: usize) -> Result<String, TryGetError>;
}

// Extension methods for BytesMut.
pub trait BytesMutExt {
    /// Writes an IPv4 addr to `self` in big-endian byte order.
    fn put_ipv4(&mut self, addr: &Ipv4Addr);

    /// Writes an IPv6 addr to `self` in big-endian byte order.
    fn put_ipv6(&mut self, addr: &Ipv6Addr);

    /// Writes a MAC address to `self`.
    fn put_mac(&mut self, addr: &MacAddr);
}

// ===== impl Bytes =====

impl BytesExt for Bytes {
    fn try_get_u8(&mut self) -> Result<u8, TryGetError> {
        if self.remaining() < 1 {
            return Err(TryGetError);
        }
        Ok(self.get_u8())
    }

    fn try_get_u16(&mut self) -> Result<u16, TryGetError> {
        if self.remaining() < 2 {
            return Err(TryGetError);
        }
        Ok(self.get_u16())
    }

    fn try_get_u32(&mut self) -> Result<u32, TryGetError> {
        if self.remaining() < 4 {
            return Err(TryGetError);
        }
        Ok(self.get_u32())
    }

    fn try_get_ipv4(&mut self) -> Result<Ipv4Addr, TryGetError> {
        Ok(Ipv4Addr::from(self.try_get_u32()?))
    }

    fn try_get_ipv6(&mut self) -> Result<Ipv6Addr, TryGetError> {
        if self.remaining() < 16 {
            return Err(TryGetError);
        }
        let mut octets = [0; 16];
        self.copy_to_slice(&mut octets);
        Ok(Ipv6Addr::from(octets))
    }

    fn try_get_mac(&mut self) -> Result<MacAddr, TryGetError> {
        if self.remaining() < MacAddr::LENGTH {
            return Err(TryGetError);
        }
        let mut octets = [0; MacAddr::LENGTH];
        self.copy_to_slice(&mut octets);
        Ok(MacAddr::from(octets))
    }

    fn try_get_string(&mut self, len: usize) -> Result<String, TryGetError> {
        if self.remaining() < len {
            return Err(TryGetError);
        }
        let mut bytes = vec![0; len];
        self.copy_to_slice(&mut bytes);
        String::from_utf8(bytes).map_err(|_| TryGetError)
    }
}

// ===== impl BytesMut =====

impl BytesMutExt for BytesMut {
    fn put_ipv4(&mut self, addr: &Ipv4Addr) {
        self.put_u32((*addr).into())
    }

    fn put_ipv6(&mut self, addr: &Ipv6Addr) {
        self.put_slice(&addr.octets())
    }

    fn put_mac(&mut self, addr: &MacAddr) {
        self.put_slice(addr.as_slice())
    }
}
