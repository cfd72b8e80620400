//! Expansion of a name into the prefixes authorized under it.
//!
//! A name is either `AS<digits>`, answered straight from the origin bucket,
//! or a macro, expanded depth-first through nested macros. Expansion runs
//! on an explicit work stack with a visited set so that macro cycles in a
//! registry cannot recurse forever or overflow the call stack.
use std::collections::HashSet;

use crate::index::{Family, RegistryIndex};
use crate::rpsl::parse_asn;

/// The result of one expansion: the accumulated prefixes in traversal
/// order (duplicates preserved) and the transitively visited sub-macros.
#[derive(Debug, Default, PartialEq)]
pub struct Expansion {
    pub prefixes: Vec<String>,
    pub macros: Vec<String>,
}

/// Expand `name` against one registry for one family.
pub fn expand(index: &RegistryIndex, name: &str, family: Family) -> Expansion {
    let name = name.to_uppercase();

    // direct ASN: the bucket is the answer
    if let Some(asn) = parse_asn(&name) {
        return Expansion {
            prefixes: bucket_strings(index, asn, family),
            macros: Vec::new(),
        };
    }

    let mut out = Expansion::default();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(name.clone());

    // members are pushed in reverse so popping preserves member order
    let mut stack: Vec<String> = Vec::new();
    if let Some(members) = index.members_of(&name) {
        stack.extend(members.iter().rev().cloned());
    }

    while let Some(token) = stack.pop() {
        if let Some(asn) = parse_asn(&token) {
            out.prefixes.extend(bucket_strings(index, asn, family));
        } else if visited.insert(token.clone()) {
            out.macros.push(token.clone());
            if let Some(members) = index.members_of(&token) {
                stack.extend(members.iter().rev().cloned());
            }
        }
    }

    out
}

fn bucket_strings(index: &RegistryIndex, asn: u32, family: Family) -> Vec<String> {
    match family {
        Family::V4 => index.v4_bucket(asn).iter().map(|p| p.to_string()).collect(),
        Family::V6 => index.v6_bucket(asn).iter().map(|p| p.to_string()).collect(),
    }
}
