use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use crabrecord::source::list_devices;
use crabrecord::{
    init_logging, CameraBackend, Mp4Backend, Mp4Settings, RecorderSettings, RecordingStore,
    ServiceConfig, SessionRegistry,
};

fn main() -> anyhow::Result<()> {
    init_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: crabrecord-server [--list-devices] [config.toml]");
        return Ok(());
    }
    if args.iter().any(|a| a == "--list-devices") {
        let devices = list_devices().context("listing cameras")?;
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    let config_path = args
        .iter()
        .find(|a| !a.starts_with('-'))
        .map(PathBuf::from)
        .unwrap_or_else(ServiceConfig::default_path);
    let config = ServiceConfig::load_layered(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    log::info!(
        "Camera {} at {}, recordings in {}",
        config.camera.device_index,
        config.camera.requested_format(),
        config.storage.directory
    );

    let store = RecordingStore::open(&config.storage.directory)
        .context("opening recordings directory")?;
    let registry = Arc::new(SessionRegistry::new(
        RecorderSettings::from(&config),
        store,
        Arc::new(CameraBackend::new()),
        Arc::new(Mp4Backend::new(Mp4Settings::from(&config.recording))),
    ));

    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime.block_on(crabrecord::server::serve(&config.server, registry))?;
    Ok(())
}
