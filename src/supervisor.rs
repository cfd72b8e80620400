//! Per-registry lifecycle: import the snapshot if one is usable, fall back
//! to a full bootstrap otherwise, then hand the index to the realtime
//! synchronizer. Registries that fail both paths stay out of the live set
//! and are retried on the next supervisor tick.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::RwLock;
use tokio::task;

use crate::bootstrap;
use crate::config::{Config, RegistryConfig};
use crate::error::{IRRError, IRRResult};
use crate::index::RegistryIndex;
use crate::nrtm::Synchronizer;
use crate::snapshot;

pub type SharedIndex = Arc<RwLock<RegistryIndex>>;

/// The live set: registry short name to its index. Queries read it;
/// the supervisor inserts into it as registries come up.
pub type Registries = Arc<RwLock<HashMap<String, SharedIndex>>>;

const RETRY_TICK: Duration = Duration::from_secs(600);

/// Spawn the supervisor. Returns the live set immediately; registries
/// appear in it as their imports or bootstraps complete.
pub fn start(config: Arc<Config>) -> Registries {
    let registries: Registries = Arc::new(RwLock::new(HashMap::new()));
    let live = registries.clone();
    tokio::spawn(async move {
        loop {
            tick(&config, &registries).await;
            tokio::time::sleep(RETRY_TICK).await;
        }
    });
    live
}

/// One pass over the configured registries, starting any that are not live
/// yet. Within a registry everything is strictly ordered: the index is
/// complete before the synchronizer sees it.
pub async fn tick(config: &Config, registries: &Registries) {
    for (name, reg) in &config.registries {
        if registries.read().await.contains_key(name) {
            continue;
        }

        let snapshot_file = snapshot::snapshot_path(Path::new(&config.cache_dir), name);
        let index = match load_index(name.clone(), reg.clone(), snapshot_file.clone()).await {
            Ok(index) => index,
            Err(e) => {
                warn!("{}: not started ({:?}), retrying on next tick", name, e);
                continue;
            }
        };

        let shared: SharedIndex = Arc::new(RwLock::new(index));
        registries
            .write()
            .await
            .insert(name.clone(), shared.clone());

        match reg.realtime() {
            Some((host, port)) => {
                let sync = Synchronizer {
                    db_name: name.clone(),
                    host: host.to_string(),
                    port,
                    int_name: reg.int_name_for(name),
                    index: shared,
                    snapshot_file,
                };
                tokio::spawn(sync.run());
                info!("{}: live, realtime sync started", name);
            }
            None => info!("{}: live, realtime sync disabled", name),
        }
    }
}

// Snapshot import with bootstrap fallback, on a blocking task: both sides
// are blocking I/O (file read, streamed HTTP fetch).
async fn load_index(
    name: String,
    reg: RegistryConfig,
    snapshot_file: PathBuf,
) -> IRRResult<RegistryIndex> {
    task::spawn_blocking(move || -> IRRResult<RegistryIndex> {
        match snapshot::read(&snapshot_file) {
            Ok(index) => {
                info!("{}: snapshot imported at serial {}", name, index.serial);
                Ok(index)
            }
            Err(e) => {
                info!("{}: no usable snapshot ({:?}), bootstrapping", name, e);
                let client = reqwest::blocking::Client::builder()
                    .connect_timeout(Duration::from_secs(30))
                    .build()?;
                bootstrap::run(&client, &name, &reg, &snapshot_file)
            }
        }
    })
    .await
    .unwrap_or_else(|e| Err(IRRError::Protocol(format!("loader task failed: {}", e))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    fn test_config(cache_dir: &str) -> Config {
        config::parse(&format!(
            r#"{{
                "cacheDir": "{}",
                "registries": {{
                    "testdb": {{
                        "serialUrl": "http://127.0.0.1:1/serial",
                        "dumpUrl": "http://127.0.0.1:1/dump"
                    }}
                }}
            }}"#,
            cache_dir
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn tick_imports_an_existing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = RegistryIndex::new(42);
        index.apply_macro("AS-X".into(), vec!["AS1".into()], false);
        snapshot::write(&snapshot::snapshot_path(dir.path(), "testdb"), &index).unwrap();

        let config = test_config(dir.path().to_str().unwrap());
        let registries: Registries = Arc::new(RwLock::new(HashMap::new()));
        tick(&config, &registries).await;

        let map = registries.read().await;
        let live = map.get("testdb").expect("registry should be live");
        assert_eq!(live.read().await.serial, 42);
    }

    #[tokio::test]
    async fn tick_leaves_failed_registries_absent() {
        // no snapshot, and the bootstrap urls point nowhere
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().to_str().unwrap());
        let registries: Registries = Arc::new(RwLock::new(HashMap::new()));
        tick(&config, &registries).await;

        assert!(registries.read().await.is_empty());
    }

    #[tokio::test]
    async fn tick_is_idempotent_for_live_registries() {
        let dir = tempfile::tempdir().unwrap();
        snapshot::write(
            &snapshot::snapshot_path(dir.path(), "testdb"),
            &RegistryIndex::new(7),
        )
        .unwrap();

        let config = test_config(dir.path().to_str().unwrap());
        let registries: Registries = Arc::new(RwLock::new(HashMap::new()));
        tick(&config, &registries).await;

        // mutate the live index, then tick again: it must not be replaced
        {
            let map = registries.read().await;
            map["testdb"].write().await.serial = 9;
        }
        tick(&config, &registries).await;
        assert_eq!(registries.read().await["testdb"].read().await.serial, 9);
    }
}
