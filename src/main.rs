mod config;
mod http;
mod leaderboard;
mod store;

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use fd_lock::RwLock;
use greensteps_core::{ActivityForm, EmissionFactorTable};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use crate::config::Config;
use crate::http::AppState;
use crate::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let flags = xflags::parse_or_exit! {
        /// Path to the TOML config file
        optional -c,--config config: PathBuf
        /// Print the emission of the activity in this JSON file and exit
        optional --calc activity: PathBuf
    };
    let config = match flags.config {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    if let Some(activity) = flags.calc {
        return calc(&config, &activity);
    }

    let data_dir = config.store.data_dir.clone();
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let mut lock = RwLock::new(File::create(data_dir.join("LOCK"))?);
    let _guard = lock
        .try_write()
        .context("data directory is in use by another process")?;

    let keyspace = fjall::Config::new(&data_dir).open()?;
    let store = Store::open(keyspace)?;
    if config.admin.is_none() {
        warn!(target: "lifecycle", "no admin password configured; admin routes are disabled");
    }
    let state = Arc::new(AppState::new(config, store.clone())?);

    info!(target: "lifecycle", data_dir = %data_dir.display(), "started");
    http::serve(state, shutdown_signal()?).await?;

    store.persist()?;
    info!(target: "lifecycle", "stopped");
    Ok(())
}

fn calc(config: &Config, path: &Path) -> Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let form: ActivityForm = serde_json::from_str(&text).context("invalid activity JSON")?;
    let emission = EmissionFactorTable::defaults().compute_with_limits(form, &config.limits)?;
    println!("{}", serde_json::to_string_pretty(&emission)?);
    Ok(())
}

fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                info!(target: "lifecycle", "Received the terminate signal; stopping");
            }
            _ = sigint.recv() => {
                info!(target: "lifecycle", "Received the interrupt signal; stopping");
            }
        }
    })
}
