//! Configuration file watcher for snapshot reloads.
//!
//! Reloads are event-driven: a change notification re-loads and
//! re-validates the file, and only a valid config is forwarded to the
//! server, which builds a fresh snapshot and swaps it in atomically. A
//! rejected change leaves the serving snapshot untouched. There is no
//! timer-driven rebuild.

use std::path::Path;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// Keeps the underlying file watcher alive; dropping it stops reloads.
pub struct ConfigWatcher {
    _inner: RecommendedWatcher,
}

/// Watch `path` and stream validated configs to the snapshot builder.
pub fn watch(
    path: &Path,
) -> Result<(ConfigWatcher, mpsc::UnboundedReceiver<GatewayConfig>), notify::Error> {
    let (tx, rx) = mpsc::unbounded_channel();
    let watched = path.to_path_buf();

    let mut inner = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                match load_config(&watched) {
                    Ok(config) => {
                        tracing::info!(
                            path = ?watched,
                            "Config change validated, queuing snapshot rebuild"
                        );
                        let _ = tx.send(config);
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            "Config change rejected, keeping the serving snapshot"
                        );
                    }
                }
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = ?e, "Config watch error"),
        },
        Config::default().with_poll_interval(Duration::from_secs(2)),
    )?;

    inner.watch(path, RecursiveMode::NonRecursive)?;
    tracing::info!(path = ?path, "Config watcher started");

    Ok((ConfigWatcher { _inner: inner }, rx))
}
