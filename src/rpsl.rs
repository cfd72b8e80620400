//! Parser for RPSL objects as streamed by IRR mirrors.
//!
//! An object ("packet") is a run of non-empty `attribute: value` lines,
//! terminated by a blank line in the source stream. Lines that do not match
//! the attribute pattern are continuations and inherit the previous key.
//! Only `as-set`, `route`, `route6`, `members` and `origin` are interpreted;
//! everything else is carried by the mirrors but irrelevant to the cache.
use log::warn;

use crate::prefix::{Prefix4, Prefix6};

/// The classification of one RPSL packet.
#[derive(Debug, Clone, PartialEq)]
pub enum RpslObject {
    MacroDef { name: String, members: Vec<String> },
    RouteV4 { prefix: Prefix4, origin: u32 },
    RouteV6 { prefix: Prefix6, origin: u32 },
}

// which of the three interpreted classes the first attribute announced
#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Macro,
    Route4,
    Route6,
}

/// Strict `AS<digits>` token match, as used for macro members and lookups.
///
/// ```
/// use irrlib::rpsl::parse_asn;
///
/// assert_eq!(parse_asn("AS64500"), Some(64500));
/// assert_eq!(parse_asn("as64500"), Some(64500));
/// assert_eq!(parse_asn("AS-FOO"), None);
/// assert_eq!(parse_asn("64500"), None);
/// ```
pub fn parse_asn(token: &str) -> Option<u32> {
    let rest = token
        .strip_prefix("AS")
        .or_else(|| token.strip_prefix("as"))
        .or_else(|| token.strip_prefix("As"))
        .or_else(|| token.strip_prefix("aS"))?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

// origin: values are "AS<digits>" in the wild, but a bare number is accepted
fn parse_origin(value: &str) -> Option<u32> {
    let t = value.trim().to_uppercase();
    let digits = t.strip_prefix("AS").unwrap_or(&t);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

// Split an attribute line into (key, value), or None for a continuation
// line. A key is the text before the first ':', non-empty, made of
// alphanumerics and dashes only.
fn split_attribute(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
        return None;
    }
    Some((key, value))
}

/// Classify one packet. Returns `None` for packets whose first attribute is
/// not one of the interpreted classes, or whose interpreted attributes are
/// incomplete or unparseable.
pub fn parse_packet<S: AsRef<str>>(lines: &[S]) -> Option<RpslObject> {
    let mut kind: Option<Kind> = None;
    let mut name = String::new();
    let mut prefix_text = String::new();
    let mut members: Vec<String> = Vec::new();
    let mut origin: Option<u32> = None;
    let mut prev_key: Option<String> = None;

    for raw in lines {
        // strip trailing comment
        let line = raw.as_ref().split('#').next().unwrap_or("");
        if line.trim().is_empty() {
            continue;
        }

        let (key, value) = match split_attribute(line) {
            Some((k, v)) => (k.to_lowercase(), v.to_string()),
            // continuation: inherit the previous key, value is the trimmed line
            None => match &prev_key {
                Some(k) => (k.clone(), line.trim().to_string()),
                None => continue,
            },
        };

        // the first attribute decides what the object is
        if kind.is_none() && prev_key.is_none() {
            match key.as_str() {
                "as-set" => {
                    kind = Some(Kind::Macro);
                    name = value.trim().to_uppercase();
                }
                "route" => {
                    kind = Some(Kind::Route4);
                    prefix_text = value.trim().to_string();
                }
                "route6" => {
                    kind = Some(Kind::Route6);
                    prefix_text = value.trim().to_string();
                }
                _ => return None,
            }
            prev_key = Some(key);
            continue;
        }

        match key.as_str() {
            "members" => {
                members.extend(
                    value
                        .split(',')
                        .map(|m| m.trim().to_uppercase())
                        .filter(|m| !m.is_empty()),
                );
            }
            "origin" => match parse_origin(&value) {
                Some(asn) => origin = Some(asn),
                None => warn!("unparseable origin attribute: {:?}", value.trim()),
            },
            _ => (),
        }
        prev_key = Some(key);
    }

    match kind? {
        Kind::Macro => {
            if name.is_empty() {
                warn!("as-set object with empty name, skipped");
                return None;
            }
            Some(RpslObject::MacroDef { name, members })
        }
        Kind::Route4 => {
            let origin = origin?;
            match Prefix4::try_from(prefix_text.as_str()) {
                Ok(prefix) => Some(RpslObject::RouteV4 { prefix, origin }),
                Err(e) => {
                    warn!("bad route prefix {:?}: {:?}", prefix_text, e);
                    None
                }
            }
        }
        Kind::Route6 => {
            let origin = origin?;
            match Prefix6::try_from(prefix_text.as_str()) {
                Ok(prefix) => Some(RpslObject::RouteV6 { prefix, origin }),
                Err(e) => {
                    warn!("bad route6 prefix {:?}: {:?}", prefix_text, e);
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_object() {
        let lines = [
            "route: 10.0.0.0/8",
            "descr: test route",
            "origin: AS64500",
            "mnt-by: TEST-MNT",
        ];
        let obj = parse_packet(&lines).unwrap();
        assert_eq!(
            obj,
            RpslObject::RouteV4 {
                prefix: Prefix4::try_from("10.0.0.0/8").unwrap(),
                origin: 64500,
            }
        );
    }

    #[test]
    fn route6_object() {
        let lines = ["route6: 2001:db8::/32", "origin: AS64501"];
        let obj = parse_packet(&lines).unwrap();
        assert_eq!(
            obj,
            RpslObject::RouteV6 {
                prefix: Prefix6::try_from("2001:db8::/32").unwrap(),
                origin: 64501,
            }
        );
    }

    #[test]
    fn as_set_object() {
        let lines = [
            "as-set: as-chaos",
            "descr: chaotic peers",
            "members: AS64500, as64501",
            "members: AS-NESTED",
        ];
        let obj = parse_packet(&lines).unwrap();
        assert_eq!(
            obj,
            RpslObject::MacroDef {
                name: "AS-CHAOS".to_string(),
                members: vec![
                    "AS64500".to_string(),
                    "AS64501".to_string(),
                    "AS-NESTED".to_string(),
                ],
            }
        );
    }

    #[test]
    fn members_continuation_lines() {
        let lines = [
            "as-set: AS-BIG",
            "members: AS1, AS2,",
            "         AS3, AS-SUB",
        ];
        let obj = parse_packet(&lines).unwrap();
        assert_eq!(
            obj,
            RpslObject::MacroDef {
                name: "AS-BIG".to_string(),
                members: vec![
                    "AS1".to_string(),
                    "AS2".to_string(),
                    "AS3".to_string(),
                    "AS-SUB".to_string(),
                ],
            }
        );
    }

    #[test]
    fn comments_are_stripped() {
        let lines = ["route: 192.0.2.0/24 # documentation prefix", "origin: AS64500 # tail"];
        let obj = parse_packet(&lines).unwrap();
        assert_eq!(
            obj,
            RpslObject::RouteV4 {
                prefix: Prefix4::try_from("192.0.2.0/24").unwrap(),
                origin: 64500,
            }
        );
    }

    #[test]
    fn interpreted_keys_only_matter_first() {
        // a person object mentioning route: later is still nothing
        let lines = ["person: Some Body", "route: 10.0.0.0/8", "origin: AS1"];
        assert!(parse_packet(&lines).is_none());
    }

    #[test]
    fn route_without_origin_is_nothing() {
        let lines = ["route: 10.0.0.0/8", "descr: no origin here"];
        assert!(parse_packet(&lines).is_none());
    }

    #[test]
    fn bad_origin_attribute_is_skipped() {
        let lines = ["route: 10.0.0.0/8", "origin: ASXYZ", "origin: AS64500"];
        let obj = parse_packet(&lines).unwrap();
        assert_eq!(
            obj,
            RpslObject::RouteV4 {
                prefix: Prefix4::try_from("10.0.0.0/8").unwrap(),
                origin: 64500,
            }
        );
    }

    #[test]
    fn asn_token_matching() {
        assert_eq!(parse_asn("AS0"), Some(0));
        assert_eq!(parse_asn("AS4294967295"), Some(4294967295));
        assert_eq!(parse_asn("AS4294967296"), None); // overflows u32
        assert_eq!(parse_asn("AS-SET"), None);
        assert_eq!(parse_asn(""), None);
        assert_eq!(parse_asn("AS"), None);
    }
}
