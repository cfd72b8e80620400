//! IPv4 and IPv6 route prefixes as stored in the cache.
//!
//! A prefix is the address octets plus a prefix length, with all host bits
//! beyond the length cleared. Mirrors hand out non-canonical prefixes now
//! and then, so parsing and snapshot decoding both repair the value and
//! report the discrepancy.
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use ipnet::{Ipv4Net, Ipv6Net};
use log::warn;

use crate::error::IRRError;

/// An IPv4 prefix: 4 address octets and a length in [0,32].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prefix4 {
    pub addr: Ipv4Addr,
    pub len: u8,
}

impl Default for Prefix4 {
    fn default() -> Self {
        Prefix4 {
            addr: Ipv4Addr::new(0, 0, 0, 0),
            len: 0,
        }
    }
}

/// An IPv6 prefix: 16 address octets and a length in [0,128].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prefix6 {
    pub addr: Ipv6Addr,
    pub len: u8,
}

/// Either family, discriminated at parse time by the presence of `:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    V4(Prefix4),
    V6(Prefix6),
}

impl Prefix4 {
    pub fn new(addr: Ipv4Addr, len: u8) -> Self {
        let mut p = Prefix4 { addr, len };
        p.repair();
        p
    }

    /// Clear all host bits beyond the prefix length. Returns whether the
    /// value was altered, so callers can report the repair.
    pub fn repair(&mut self) -> bool {
        let net = match Ipv4Net::new(self.addr, self.len) {
            Ok(net) => net,
            Err(_) => return false,
        };
        if net.addr() == net.network() {
            return false;
        }
        self.addr = net.network();
        true
    }

    /// The 5-byte value stored in buckets and snapshots.
    pub fn to_bytes(&self) -> [u8; 5] {
        let o = self.addr.octets();
        [o[0], o[1], o[2], o[3], self.len]
    }

    pub fn from_bytes(b: &[u8; 5]) -> Self {
        Prefix4 {
            addr: Ipv4Addr::new(b[0], b[1], b[2], b[3]),
            len: b[4],
        }
    }
}

impl Prefix6 {
    pub fn new(addr: Ipv6Addr, len: u8) -> Self {
        let mut p = Prefix6 { addr, len };
        p.repair();
        p
    }

    /// Clear all host bits beyond the prefix length. Returns whether the
    /// value was altered.
    pub fn repair(&mut self) -> bool {
        let net = match Ipv6Net::new(self.addr, self.len) {
            Ok(net) => net,
            Err(_) => return false,
        };
        if net.addr() == net.network() {
            return false;
        }
        self.addr = net.network();
        true
    }

    /// The 17-byte value stored in buckets and snapshots.
    pub fn to_bytes(&self) -> [u8; 17] {
        let mut b = [0u8; 17];
        b[..16].copy_from_slice(&self.addr.octets());
        b[16] = self.len;
        b
    }

    pub fn from_bytes(b: &[u8; 17]) -> Self {
        let mut o = [0u8; 16];
        o.copy_from_slice(&b[..16]);
        Prefix6 {
            addr: Ipv6Addr::from(o),
            len: b[16],
        }
    }
}

impl Default for Prefix6 {
    fn default() -> Self {
        Prefix6 {
            addr: Ipv6Addr::UNSPECIFIED,
            len: 0,
        }
    }
}

/// ```
/// use irrlib::prefix::Prefix4;
///
/// let p = Prefix4::try_from("192.0.2.0/24").unwrap();
/// assert_eq!(p.to_string(), "192.0.2.0/24");
/// ```
impl TryFrom<&str> for Prefix4 {
    type Error = IRRError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let net: Ipv4Net = s
            .trim()
            .parse()
            .map_err(|_| IRRError::Parse(format!("bad IPv4 prefix: {}", s)))?;
        let mut p = Prefix4 {
            addr: net.addr(),
            len: net.prefix_len(),
        };
        if p.repair() {
            warn!("repaired non-canonical prefix {} -> {}", s, p);
        }
        Ok(p)
    }
}

impl TryFrom<&str> for Prefix6 {
    type Error = IRRError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let net: Ipv6Net = s
            .trim()
            .parse()
            .map_err(|_| IRRError::Parse(format!("bad IPv6 prefix: {}", s)))?;
        let mut p = Prefix6 {
            addr: net.addr(),
            len: net.prefix_len(),
        };
        if p.repair() {
            warn!("repaired non-canonical prefix {} -> {}", s, p);
        }
        Ok(p)
    }
}

impl TryFrom<&str> for Prefix {
    type Error = IRRError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        if s.contains(':') {
            Ok(Prefix::V6(Prefix6::try_from(s)?))
        } else {
            Ok(Prefix::V4(Prefix4::try_from(s)?))
        }
    }
}

impl fmt::Display for Prefix4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

// The fully expanded form: eight 4-hex-digit groups. Chosen over RFC5952
// compression so that equal values always render to the same string and
// clients can deduplicate lexically.
impl fmt::Display for Prefix6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seg = self.addr.segments();
        write!(
            f,
            "{:04x}:{:04x}:{:04x}:{:04x}:{:04x}:{:04x}:{:04x}:{:04x}/{}",
            seg[0], seg[1], seg[2], seg[3], seg[4], seg[5], seg[6], seg[7], self.len
        )
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::V4(p) => write!(f, "{}", p),
            Prefix::V6(p) => write!(f, "{}", p),
        }
    }
}

// Prefixes travel through the HTTP surface as their canonical text
impl serde::Serialize for Prefix4 {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl serde::Serialize for Prefix6 {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
