//! sitewatchd - PPE detection web daemon.
//!
//! Serves the single-page upload UI, runs the detection pipeline per upload,
//! and renders the categorized report. A missing weights file halts startup
//! with operator guidance instead of failing the first upload.

use std::sync::atomic::Ordering;

use anyhow::Result;

use sitewatch::api::WebServer;
use sitewatch::config::AppConfig;
use sitewatch::provision;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = AppConfig::load()?;

    if let Err(err) = provision::get_detector(&cfg) {
        log::error!("{err:#}");
        std::process::exit(1);
    }

    let handle = WebServer::new(cfg).spawn()?;
    log::info!("sitewatchd listening on http://{}", handle.addr);

    let shutdown = handle.shutdown_flag();
    ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::SeqCst);
    })?;

    handle.wait()?;
    log::info!("sitewatchd stopped");
    Ok(())
}
