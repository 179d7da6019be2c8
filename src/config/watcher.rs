//! Configuration file watcher for directory hot reload.
//!
//! Only `[[vaults]]` and `[[routes]]` are applied live. Changes to any other
//! section are reported and wait for a restart.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ProxyConfig;
use crate::storage::{Route, Vault};

/// New directory content read from the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryUpdate {
    pub vaults: Vec<Vault>,
    pub routes: Vec<Route>,
}

/// Outcome of comparing a reloaded config with the one in effect.
#[derive(Debug, PartialEq)]
enum Reload {
    Unchanged,
    Apply(DirectoryUpdate),
}

/// Watches the configuration file and emits directory updates.
pub struct ConfigWatcher {
    path: PathBuf,
    current: ProxyConfig,
    update_tx: mpsc::UnboundedSender<DirectoryUpdate>,
}

impl ConfigWatcher {
    /// `current` is the configuration the process started with.
    pub fn new(path: &Path, current: &ProxyConfig) -> (Self, mpsc::UnboundedReceiver<DirectoryUpdate>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            current: current.clone(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. Reloads stop when the returned handle is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            mut current,
            update_tx,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let next = match load_config(&path) {
                        Ok(next) => next,
                        Err(e) => {
                            tracing::error!(error = %e, "Config reload rejected, keeping current directory");
                            return;
                        }
                    };

                    for section in restart_required(&current, &next) {
                        tracing::warn!(section, "Config section changed; restart to apply");
                    }

                    if let Reload::Apply(update) = compare(&current, &next) {
                        tracing::info!(
                            vaults = update.vaults.len(),
                            routes = update.routes.len(),
                            "Directory reloaded"
                        );
                        let _ = update_tx.send(update);
                    }
                    current = next;
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}

fn compare(current: &ProxyConfig, next: &ProxyConfig) -> Reload {
    // Editors often emit several events per save.
    if current.vaults == next.vaults && current.routes == next.routes {
        return Reload::Unchanged;
    }
    Reload::Apply(DirectoryUpdate {
        vaults: next.vaults.clone(),
        routes: next.routes.clone(),
    })
}

fn restart_required(current: &ProxyConfig, next: &ProxyConfig) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if current.listener != next.listener {
        changed.push("listener");
    }
    if current.timeouts != next.timeouts {
        changed.push("timeouts");
    }
    if current.limits != next.limits {
        changed.push("limits");
    }
    if current.observability != next.observability {
        changed.push("observability");
    }
    if current.admin != next.admin {
        changed.push("admin");
    }
    if current.audit != next.audit {
        changed.push("audit");
    }
    changed
}
