//! In-memory store for one registry: the macro table, the per-family
//! origin buckets, and the mirror serial the contents correspond to.
use std::collections::HashMap;

use log::warn;
use serde::Serialize;

use crate::prefix::{Prefix, Prefix4, Prefix6};
use crate::rpsl::RpslObject;

/// Which prefix family a query or bucket refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct RegistryIndex {
    pub serial: u32,
    pub macros: HashMap<String, Vec<String>>,
    pub asnv4: HashMap<u32, Vec<Prefix4>>,
    pub asnv6: HashMap<u32, Vec<Prefix6>>,
}

impl RegistryIndex {
    pub fn new(serial: u32) -> Self {
        RegistryIndex {
            serial,
            ..Default::default()
        }
    }

    /// Dispatch one parsed object into the index. `remove` is set when the
    /// object arrived under an NRTM DEL.
    pub fn apply(&mut self, obj: RpslObject, remove: bool) {
        match obj {
            RpslObject::MacroDef { name, members } => self.apply_macro(name, members, remove),
            RpslObject::RouteV4 { prefix, origin } => {
                self.apply_route(Prefix::V4(prefix), origin, remove)
            }
            RpslObject::RouteV6 { prefix, origin } => {
                self.apply_route(Prefix::V6(prefix), origin, remove)
            }
        }
    }

    pub fn apply_macro(&mut self, name: String, members: Vec<String>, remove: bool) {
        if remove {
            if self.macros.remove(&name).is_none() {
                warn!("delete of unknown macro {}", name);
            }
        } else {
            self.macros.insert(name, members);
        }
    }

    /// Add or remove one prefix under its origin bucket. Additions append
    /// without deduplication; removal deletes the first entry equal to the
    /// target and reports a miss without touching the list.
    pub fn apply_route(&mut self, prefix: Prefix, origin: u32, remove: bool) {
        match prefix {
            Prefix::V4(p) => apply_bucket(&mut self.asnv4, origin, p, remove),
            Prefix::V6(p) => apply_bucket(&mut self.asnv6, origin, p, remove),
        }
    }

    pub fn v4_bucket(&self, origin: u32) -> &[Prefix4] {
        self.asnv4.get(&origin).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn v6_bucket(&self, origin: u32) -> &[Prefix6] {
        self.asnv6.get(&origin).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn members_of(&self, name: &str) -> Option<&Vec<String>> {
        self.macros.get(name)
    }
}

fn apply_bucket<P>(table: &mut HashMap<u32, Vec<P>>, origin: u32, prefix: P, remove: bool)
where
    P: PartialEq + std::fmt::Display + Copy,
{
    if remove {
        match table.get_mut(&origin) {
            Some(list) => match list.iter().position(|p| *p == prefix) {
                Some(pos) => {
                    list.remove(pos);
                }
                None => warn!("delete of absent prefix {} under AS{}", prefix, origin),
            },
            None => warn!("delete of prefix {} under unknown AS{}", prefix, origin),
        }
    } else {
        table.entry(origin).or_insert_with(Vec::new).push(prefix);
    }
}
