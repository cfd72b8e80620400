//! Process configuration: the set of mirrored registries and where to keep
//! snapshots. Loaded from a JSON file; the command line may override the
//! cache directory and listen address.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::warn;
use serde::Deserialize;

use crate::error::{IRRError, IRRResult};

/// One registry's mirror endpoints. Realtime sync runs only when both
/// `realtimeHost` and `realtimePort` are present.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    pub serial_url: String,
    pub dump_url: String,
    #[serde(default)]
    pub realtime_host: Option<String>,
    #[serde(default)]
    pub realtime_port: Option<u16>,
    #[serde(default)]
    pub int_name: Option<String>,
}

impl RegistryConfig {
    /// The `(host, port)` pair for NRTM, or `None` when sync is disabled.
    pub fn realtime(&self) -> Option<(&str, u16)> {
        match (&self.realtime_host, self.realtime_port) {
            (Some(host), Some(port)) => Some((host.as_str(), port)),
            _ => None,
        }
    }

    /// The mirror-side registry identifier used in the `-g` request,
    /// defaulting to the registry's short name uppercased.
    pub fn int_name_for(&self, db_name: &str) -> String {
        match &self.int_name {
            Some(n) => n.clone(),
            None => db_name.to_uppercase(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_listen")]
    pub listen: String,
    pub registries: BTreeMap<String, RegistryConfig>,
}

fn default_cache_dir() -> String {
    String::from(".")
}

fn default_listen() -> String {
    String::from("127.0.0.1:8087")
}

pub fn load(path: &Path) -> IRRResult<Config> {
    let text = fs::read_to_string(path)?;
    parse(&text)
}

pub fn parse(text: &str) -> IRRResult<Config> {
    let config: Config = serde_json::from_str(text)?;
    if config.registries.is_empty() {
        return Err(IRRError::Config(String::from("no registries configured")));
    }
    for (name, reg) in &config.registries {
        // the fetcher speaks HTTP(S) only; an ftp dump will fail every cycle
        if reg.dump_url.starts_with("ftp://") || reg.serial_url.starts_with("ftp://") {
            warn!("registry {} uses an ftp url, fetches will fail", name);
        }
        if reg.realtime_host.is_some() != reg.realtime_port.is_some() {
            warn!("registry {} has an incomplete realtime config, sync disabled", name);
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "cacheDir": "/var/cache/irr",
        "listen": "0.0.0.0:8087",
        "registries": {
            "ripe": {
                "serialUrl": "https://ftp.ripe.net/ripe/dbase/RIPE.CURRENTSERIAL",
                "dumpUrl": "https://ftp.ripe.net/ripe/dbase/ripe.db.gz",
                "realtimeHost": "nrtm.ripe.net",
                "realtimePort": 4444
            },
            "radb": {
                "serialUrl": "https://ftp.radb.net/radb/dbase/RADB.CURRENTSERIAL",
                "dumpUrl": "https://ftp.radb.net/radb/dbase/radb.db.gz",
                "intName": "RADB-MIRROR"
            }
        }
    }"#;

    #[test]
    fn sample_config_parses() {
        let config = parse(SAMPLE).unwrap();
        assert_eq!(config.cache_dir, "/var/cache/irr");
        assert_eq!(config.registries.len(), 2);

        let ripe = &config.registries["ripe"];
        assert_eq!(ripe.realtime(), Some(("nrtm.ripe.net", 4444)));
        assert_eq!(ripe.int_name_for("ripe"), "RIPE");

        let radb = &config.registries["radb"];
        assert_eq!(radb.realtime(), None);
        assert_eq!(radb.int_name_for("radb"), "RADB-MIRROR");
    }

    #[test]
    fn defaults_apply() {
        let config = parse(
            r#"{"registries":{"x":{"serialUrl":"https://a/serial","dumpUrl":"https://a/dump"}}}"#,
        )
        .unwrap();
        assert_eq!(config.cache_dir, ".");
        assert_eq!(config.listen, "127.0.0.1:8087");
    }

    #[test]
    fn empty_registries_is_rejected() {
        assert!(matches!(
            parse(r#"{"registries":{}}"#),
            Err(IRRError::Config(_))
        ));
    }

    #[test]
    fn half_realtime_config_disables_sync() {
        let config = parse(
            r#"{"registries":{"x":{"serialUrl":"https://a/s","dumpUrl":"https://a/d","realtimeHost":"h"}}}"#,
        )
        .unwrap();
        assert_eq!(config.registries["x"].realtime(), None);
    }
}
