//! Bootstrap a registry from its mirror: fetch the current serial, stream
//! the full database dump through the parser into a fresh index, and write
//! the first snapshot.
//!
//! Everything here is blocking I/O; the supervisor runs it on a blocking
//! task. The dump is consumed line by line off the wire so a multi-gigabyte
//! registry never has to fit in memory.
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use log::{debug, info};
use reqwest::blocking::Client;

use crate::config::RegistryConfig;
use crate::error::{IRRError, IRRResult};
use crate::index::RegistryIndex;
use crate::rpsl;
use crate::snapshot;

/// Fetch serial and dump for one registry and build its index. The snapshot
/// is written as soon as the dump has fully streamed through.
pub fn run(
    client: &Client,
    db_name: &str,
    cfg: &RegistryConfig,
    snapshot_file: &Path,
) -> IRRResult<RegistryIndex> {
    let serial = fetch_serial(client, &cfg.serial_url)?;
    info!("{}: bootstrap at serial {}", db_name, serial);

    let mut index = RegistryIndex::new(serial);

    let response = client.get(&cfg.dump_url).send()?.error_for_status()?;
    let reader = dump_reader(&cfg.dump_url, response);
    let objects = load_dump(BufReader::new(reader), &mut index)?;
    info!(
        "{}: dump loaded, {} objects, {} macros, {} v4 origins, {} v6 origins",
        db_name,
        objects,
        index.macros.len(),
        index.asnv4.len(),
        index.asnv6.len()
    );

    snapshot::write(snapshot_file, &index)?;
    Ok(index)
}

fn fetch_serial(client: &Client, url: &str) -> IRRResult<u32> {
    let text = client.get(url).send()?.error_for_status()?.text()?;
    parse_serial(&text)
}

fn parse_serial(text: &str) -> IRRResult<u32> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(IRRError::Protocol(String::from("empty serial document")));
    }
    Ok(trimmed.parse::<u32>()?)
}

// gzip is signalled by the url path, not by response headers
fn wants_gzip(url: &str) -> bool {
    let path = url.split(&['?', '#'][..]).next().unwrap_or(url);
    path.ends_with(".gz")
}

fn dump_reader<'a>(url: &str, raw: impl Read + 'a) -> Box<dyn Read + 'a> {
    if wants_gzip(url) {
        Box::new(GzDecoder::new(BufReader::new(raw)))
    } else {
        Box::new(raw)
    }
}

/// Split the dump into blank-line-separated packets and dispatch each parsed
/// object into the index. Returns how many objects were applied.
pub fn load_dump<R: BufRead>(reader: R, index: &mut RegistryIndex) -> IRRResult<usize> {
    let mut packet: Vec<String> = Vec::new();
    let mut objects = 0usize;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            objects += flush(&mut packet, index);
        } else {
            packet.push(line);
        }
    }
    // a dump need not end with a blank line
    objects += flush(&mut packet, index);

    debug!("dump stream done, {} objects dispatched", objects);
    Ok(objects)
}

fn flush(packet: &mut Vec<String>, index: &mut RegistryIndex) -> usize {
    if packet.is_empty() {
        return 0;
    }
    let dispatched = match rpsl::parse_packet(packet) {
        Some(obj) => {
            index.apply(obj, false);
            1
        }
        None => 0,
    };
    packet.clear();
    dispatched
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    const DUMP: &str = "\
route: 10.0.0.0/8
descr: a route
origin: AS64500

person: Some Body
address: nowhere

as-set: AS-TEST
members: AS64500, AS-OTHER

route6: 2001:db8::/32
origin: AS64500
";

    #[test]
    fn dump_streams_into_the_index() {
        let mut index = RegistryIndex::new(7);
        let objects = load_dump(Cursor::new(DUMP), &mut index).unwrap();

        // the person object is carried but not interpreted
        assert_eq!(objects, 3);
        assert_eq!(index.v4_bucket(64500).len(), 1);
        assert_eq!(index.v6_bucket(64500).len(), 1);
        assert_eq!(
            index.members_of("AS-TEST"),
            Some(&vec!["AS64500".to_string(), "AS-OTHER".to_string()])
        );
    }

    #[test]
    fn gzip_dump_decompresses_on_the_fly() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(DUMP.as_bytes()).unwrap();
        let compressed = enc.finish().unwrap();

        let reader = dump_reader("https://example.net/db/test.db.gz", Cursor::new(compressed));
        let mut index = RegistryIndex::new(7);
        let objects = load_dump(BufReader::new(reader), &mut index).unwrap();
        assert_eq!(objects, 3);
    }

    #[test]
    fn gzip_is_decided_by_the_url_path() {
        assert!(wants_gzip("https://example.net/db.gz"));
        assert!(wants_gzip("https://example.net/db.gz?x=1"));
        assert!(!wants_gzip("https://example.net/db"));
        assert!(!wants_gzip("https://example.net/db?name=x.gz"));
    }

    #[test]
    fn serial_document_parsing() {
        assert_eq!(parse_serial("4217\n").unwrap(), 4217);
        assert_eq!(parse_serial("  108  ").unwrap(), 108);
        assert!(parse_serial("").is_err());
        assert!(parse_serial("   \n").is_err());
        assert!(parse_serial("not-a-number").is_err());
    }
}
