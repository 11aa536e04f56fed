//! Watches scan locations for changes and emits rescan events.
//!
//! The catalog is rebuilt on demand; this watcher tells the host when a
//! rebuild is worth doing. Bursts of filesystem events (an editor save, a
//! git checkout) are debounced into a single reload event.

use notify::{recommended_watcher, RecursiveMode, Result as NotifyResult, Watcher};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::scanner::ScanLocation;

/// Event emitted when the script catalog should be rebuilt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogReloadEvent {
    Reload,
}

/// Debounce window for bursts of filesystem events
const DEBOUNCE_MS: u64 = 500;

/// Watches the enabled scan locations and emits [`CatalogReloadEvent`]s.
pub struct CatalogWatcher {
    tx: Option<Sender<CatalogReloadEvent>>,
    locations: Vec<ScanLocation>,
    watcher_thread: Option<thread::JoinHandle<()>>,
}

impl CatalogWatcher {
    /// Returns the watcher plus the receiver reload events arrive on.
    pub fn new(locations: &[ScanLocation]) -> (Self, Receiver<CatalogReloadEvent>) {
        let (tx, rx) = channel();
        let watcher = CatalogWatcher {
            tx: Some(tx),
            locations: locations.iter().filter(|l| l.is_enabled).cloned().collect(),
            watcher_thread: None,
        };
        (watcher, rx)
    }

    /// Start watching. Spawns a background thread that owns the notify
    /// watcher for the lifetime of this struct.
    pub fn start(&mut self) -> NotifyResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| std::io::Error::other("watcher already started"))?;
        let locations = self.locations.clone();

        let thread_handle = thread::spawn(move || {
            if let Err(e) = Self::watch_loop(tx, locations) {
                warn!(error = %e, watcher = "catalog", "Catalog watcher error");
            }
        });

        self.watcher_thread = Some(thread_handle);
        Ok(())
    }

    fn watch_loop(
        tx: Sender<CatalogReloadEvent>,
        locations: Vec<ScanLocation>,
    ) -> NotifyResult<()> {
        let debounce_active = Arc::new(Mutex::new(false));

        let (watch_tx, watch_rx) = channel();
        let mut watcher: Box<dyn Watcher> = Box::new(recommended_watcher(
            move |res: notify::Result<notify::Event>| {
                let _ = watch_tx.send(res);
            },
        )?);

        let mut watched = 0;
        for location in &locations {
            let path = PathBuf::from(&location.path);
            if !path.is_dir() {
                continue;
            }
            let mode = if location.recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            if let Err(e) = watcher.watch(&path, mode) {
                warn!(path = %path.display(), error = %e, "Could not watch location");
            } else {
                watched += 1;
            }
        }
        info!(watched = watched, "Catalog watcher started");

        loop {
            match watch_rx.recv() {
                Ok(Ok(event)) => {
                    let is_relevant = matches!(
                        event.kind,
                        notify::EventKind::Create(_)
                            | notify::EventKind::Modify(_)
                            | notify::EventKind::Remove(_)
                    );
                    if !is_relevant {
                        continue;
                    }

                    let mut debounce = debounce_active.lock().unwrap();
                    if !*debounce {
                        *debounce = true;
                        drop(debounce);

                        let tx_clone = tx.clone();
                        let debounce_flag = Arc::clone(&debounce_active);
                        thread::spawn(move || {
                            thread::sleep(Duration::from_millis(DEBOUNCE_MS));
                            let _ = tx_clone.send(CatalogReloadEvent::Reload);
                            *debounce_flag.lock().unwrap() = false;
                            info!("Scan location changed, emitting catalog reload");
                        });
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, watcher = "catalog", "File watcher error");
                }
                Err(_) => {
                    info!(watcher = "catalog", "Catalog watcher shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

impl Drop for CatalogWatcher {
    fn drop(&mut self) {
        // The watch thread parks in recv() on the notify channel; it is
        // detached here and exits with the process. Once the receiver is
        // gone its sends are no-ops.
        self.watcher_thread.take();
    }
}
