//! Binary snapshot of a registry index, one framed file per registry.
//!
//! Layout, network byte order throughout:
//!
//! ```text
//! offset  field                       width
//! 0       magic "ECXD"                4 bytes
//! 4       serial                      u32
//! 8       records...
//!         each record:
//!           length                    u32  (length of payload after this field)
//!           type                      u8
//!           payload                   <length-1 bytes>
//!         terminated by length==0     u32
//! ```
//!
//! Record payloads: type 1 (macro) is `u16 nameLen | name | u32 jsonLen |
//! json` with the members as a JSON string array; type 2 (IPv4 bucket) is
//! `u32 asn | u32 count | count x 5 bytes`; type 3 (IPv6 bucket) the same
//! with 17-byte values.
use std::fs;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::warn;

use crate::error::{IRRError, IRRResult};
use crate::index::RegistryIndex;
use crate::prefix::{Prefix4, Prefix6};

const MAGIC: &[u8; 4] = b"ECXD";

const REC_MACRO: u8 = 1;
const REC_V4: u8 = 2;
const REC_V6: u8 = 3;

// a record larger than this is corruption, not data
const MAX_RECORD: u32 = 1 << 26;

/// `<dbName>.tiny` under the cache directory.
pub fn snapshot_path(dir: &Path, db_name: &str) -> PathBuf {
    dir.join(format!("{}.tiny", db_name))
}

/// Encode the whole index into a growable buffer.
pub fn encode(index: &RegistryIndex) -> IRRResult<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.write_u32::<BigEndian>(index.serial)?;

    for (name, members) in &index.macros {
        let json = serde_json::to_vec(members)?;
        let mut payload: Vec<u8> = Vec::with_capacity(6 + name.len() + json.len());
        payload.write_u16::<BigEndian>(name.len() as u16)?;
        payload.extend_from_slice(name.as_bytes());
        payload.write_u32::<BigEndian>(json.len() as u32)?;
        payload.extend_from_slice(&json);
        write_record(&mut buf, REC_MACRO, &payload)?;
    }

    for (asn, list) in &index.asnv4 {
        let mut payload: Vec<u8> = Vec::with_capacity(8 + list.len() * 5);
        payload.write_u32::<BigEndian>(*asn)?;
        payload.write_u32::<BigEndian>(list.len() as u32)?;
        for p in list {
            payload.extend_from_slice(&p.to_bytes());
        }
        write_record(&mut buf, REC_V4, &payload)?;
    }

    for (asn, list) in &index.asnv6 {
        let mut payload: Vec<u8> = Vec::with_capacity(8 + list.len() * 17);
        payload.write_u32::<BigEndian>(*asn)?;
        payload.write_u32::<BigEndian>(list.len() as u32)?;
        for p in list {
            payload.extend_from_slice(&p.to_bytes());
        }
        write_record(&mut buf, REC_V6, &payload)?;
    }

    buf.write_u32::<BigEndian>(0)?;
    Ok(buf)
}

fn write_record(buf: &mut Vec<u8>, rec_type: u8, payload: &[u8]) -> IRRResult<()> {
    buf.write_u32::<BigEndian>(payload.len() as u32 + 1)?;
    buf.write_u8(rec_type)?;
    buf.extend_from_slice(payload);
    Ok(())
}

/// Decode a snapshot stream back into an index. Every prefix is
/// re-canonicalized on the way in: legacy snapshots are known to contain
/// non-canonical values and the repair is an observation, not an error.
pub fn decode<R: Read>(reader: &mut R) -> IRRResult<RegistryIndex> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(IRRError::Snapshot(format!(
            "bad snapshot magic {:02X?}",
            magic
        )));
    }

    let serial = reader.read_u32::<BigEndian>()?;
    let mut index = RegistryIndex::new(serial);

    loop {
        let length = reader.read_u32::<BigEndian>()?;
        if length == 0 {
            break;
        }
        if length > MAX_RECORD {
            return Err(IRRError::Snapshot(format!(
                "oversized snapshot record ({} bytes)",
                length
            )));
        }
        let rec_type = reader.read_u8()?;
        let mut payload = vec![0u8; length as usize - 1];
        reader.read_exact(&mut payload)?;

        let mut cursor = Cursor::new(payload.as_slice());
        match rec_type {
            REC_MACRO => decode_macro(&mut cursor, &mut index)?,
            REC_V4 => decode_v4(&mut cursor, &mut index)?,
            REC_V6 => decode_v6(&mut cursor, &mut index)?,
            t => {
                return Err(IRRError::Snapshot(format!(
                    "unknown snapshot record type {}",
                    t
                )))
            }
        }
    }

    Ok(index)
}

fn decode_macro(cursor: &mut Cursor<&[u8]>, index: &mut RegistryIndex) -> IRRResult<()> {
    let name_len = cursor.read_u16::<BigEndian>()? as usize;
    let mut name = vec![0u8; name_len];
    cursor.read_exact(&mut name)?;
    let name = String::from_utf8(name)?;

    let json_len = cursor.read_u32::<BigEndian>()? as usize;
    let mut json = vec![0u8; json_len];
    cursor.read_exact(&mut json)?;
    let members: Vec<String> = serde_json::from_slice(&json)?;

    index.macros.insert(name, members);
    Ok(())
}

fn decode_v4(cursor: &mut Cursor<&[u8]>, index: &mut RegistryIndex) -> IRRResult<()> {
    let asn = cursor.read_u32::<BigEndian>()?;
    let count = cursor.read_u32::<BigEndian>()?;
    let mut list = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut b = [0u8; 5];
        cursor.read_exact(&mut b)?;
        if b[4] > 32 {
            return Err(IRRError::Snapshot(format!(
                "prefix length {} out of range in v4 record",
                b[4]
            )));
        }
        let mut p = Prefix4::from_bytes(&b);
        if p.repair() {
            warn!("snapshot held non-canonical prefix, stored as {}", p);
        }
        list.push(p);
    }
    index.asnv4.insert(asn, list);
    Ok(())
}

fn decode_v6(cursor: &mut Cursor<&[u8]>, index: &mut RegistryIndex) -> IRRResult<()> {
    let asn = cursor.read_u32::<BigEndian>()?;
    let count = cursor.read_u32::<BigEndian>()?;
    let mut list = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut b = [0u8; 17];
        cursor.read_exact(&mut b)?;
        if b[16] > 128 {
            return Err(IRRError::Snapshot(format!(
                "prefix length {} out of range in v6 record",
                b[16]
            )));
        }
        let mut p = Prefix6::from_bytes(&b);
        if p.repair() {
            warn!("snapshot held non-canonical prefix, stored as {}", p);
        }
        list.push(p);
    }
    index.asnv6.insert(asn, list);
    Ok(())
}

/// Write the snapshot through a sibling temporary file and rename it into
/// place, so a reader never observes a half-written file and a failed write
/// leaves the previous snapshot intact.
pub fn write(path: &Path, index: &RegistryIndex) -> IRRResult<()> {
    let bytes = encode(index)?;
    let tmp = path.with_extension("tiny.tmp");
    fs::write(&tmp, &bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

pub fn read(path: &Path) -> IRRResult<RegistryIndex> {
    let file = fs::File::open(path)?;
    decode(&mut BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefix::Prefix;

    fn sample_index() -> RegistryIndex {
        let mut idx = RegistryIndex::new(4217);
        idx.apply_macro(
            "AS-CHAOS".into(),
            vec!["AS64500".into(), "AS-NESTED".into()],
            false,
        );
        idx.apply_macro("AS-EMPTY".into(), vec![], false);
        idx.apply_route(
            Prefix::V4(Prefix4::try_from("10.0.0.0/8").unwrap()),
            64500,
            false,
        );
        // duplicate entries survive the round trip
        idx.apply_route(
            Prefix::V4(Prefix4::try_from("10.0.0.0/8").unwrap()),
            64500,
            false,
        );
        idx.apply_route(
            Prefix::V6(Prefix6::try_from("2001:db8::/32").unwrap()),
            64501,
            false,
        );
        idx
    }

    #[test]
    fn roundtrip() {
        let idx = sample_index();
        let bytes = encode(&idx).unwrap();
        let back = decode(&mut Cursor::new(bytes.as_slice())).unwrap();
        assert_eq!(back, idx);
    }

    #[test]
    fn empty_index_is_just_a_frame() {
        let idx = RegistryIndex::new(1);
        let bytes = encode(&idx).unwrap();
        // magic + serial + terminator
        assert_eq!(bytes.len(), 12);
        let back = decode(&mut Cursor::new(bytes.as_slice())).unwrap();
        assert_eq!(back.serial, 1);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let idx = RegistryIndex::new(1);
        let mut bytes = encode(&idx).unwrap();
        bytes[1] = b'X';
        assert!(matches!(
            decode(&mut Cursor::new(bytes.as_slice())),
            Err(IRRError::Snapshot(_))
        ));
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let idx = sample_index();
        let bytes = encode(&idx).unwrap();
        let cut = &bytes[..bytes.len() - 6];
        assert!(decode(&mut Cursor::new(cut)).is_err());
    }

    #[test]
    fn unknown_record_type_is_an_error() {
        let mut bytes: Vec<u8> = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.write_u32::<BigEndian>(7).unwrap();
        bytes.write_u32::<BigEndian>(1).unwrap();
        bytes.write_u8(9).unwrap();
        bytes.write_u32::<BigEndian>(0).unwrap();
        assert!(matches!(
            decode(&mut Cursor::new(bytes.as_slice())),
            Err(IRRError::Snapshot(_))
        ));
    }

    #[test]
    fn decode_repairs_legacy_prefixes() {
        // hand-build a v4 record holding 192.0.2.5/24
        let mut bytes: Vec<u8> = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.write_u32::<BigEndian>(3).unwrap();
        bytes.write_u32::<BigEndian>(1 + 8 + 5).unwrap();
        bytes.write_u8(REC_V4).unwrap();
        bytes.write_u32::<BigEndian>(64500).unwrap();
        bytes.write_u32::<BigEndian>(1).unwrap();
        bytes.extend_from_slice(&[192, 0, 2, 5, 24]);
        bytes.write_u32::<BigEndian>(0).unwrap();

        let idx = decode(&mut Cursor::new(bytes.as_slice())).unwrap();
        assert_eq!(
            idx.v4_bucket(64500),
            &[Prefix4::try_from("192.0.2.0/24").unwrap()]
        );
    }

    #[test]
    fn write_and_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot_path(dir.path(), "testdb");
        let idx = sample_index();

        write(&path, &idx).unwrap();
        assert_eq!(read(&path).unwrap(), idx);

        // no temp file left behind
        assert!(!path.with_extension("tiny.tmp").exists());

        // rewriting replaces the file atomically
        let mut idx2 = sample_index();
        idx2.serial = 4218;
        write(&path, &idx2).unwrap();
        assert_eq!(read(&path).unwrap().serial, 4218);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(&snapshot_path(dir.path(), "nope")).is_err());
    }
}
