//! The cache daemon: bring every configured registry up, keep it
//! synchronized against its mirror, and answer expansion queries.
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};

use irrlib::error::{IRRError, IRRResult};
use irrlib::{config, http, supervisor};

mod args;
use args::CliOptions;

#[tokio::main]
async fn main() -> IRRResult<()> {
    env_logger::try_init()?;

    // manage arguments from command line
    let options = CliOptions::options()?;
    debug!("options: {:?}", &options);

    let mut config = config::load(Path::new(&options.config))?;
    if let Some(dir) = options.cache_dir {
        config.cache_dir = dir;
    }
    if let Some(listen) = options.listen {
        config.listen = listen;
    }

    // an unusable snapshot directory is an unrecoverable startup failure
    std::fs::create_dir_all(&config.cache_dir)?;

    let addr: SocketAddr = config
        .listen
        .parse()
        .map_err(|_| IRRError::Config(format!("bad listen address {}", config.listen)))?;

    let config = Arc::new(config);
    let registries = supervisor::start(config);

    info!("query interface on {}", addr);
    axum::Server::try_bind(&addr)
        .map_err(|e| IRRError::Config(format!("cannot bind {}: {}", addr, e)))?
        .serve(http::router(registries).into_make_service())
        .await
        .map_err(|e| IRRError::Protocol(format!("http server failed: {}", e)))?;

    Ok(())
}
