use anyhow::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::mpsc::channel;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::domain::SpecKind;

/// Watches the spec root for changes to the local fallback files.
///
/// The directory is watched rather than each file so that files created
/// after startup, or replaced by an editor's rename-on-save, still count.
pub struct SpecWatcher {
    _watcher: RecommendedWatcher,
}

impl SpecWatcher {
    pub fn new<F>(root: &Path, on_change: F) -> Result<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (tx, rx) = channel::<notify::Result<Event>>();

        let mut watcher = RecommendedWatcher::new(tx, Config::default())?;
        watcher.watch(root, RecursiveMode::NonRecursive)?;
        info!("Watching local spec files under {}", root.display());

        std::thread::spawn(move || loop {
            match rx.recv() {
                Ok(Ok(event)) => {
                    if !touches_spec_file(&event) {
                        debug!("Ignoring unrelated change: {:?}", event.paths);
                        continue;
                    }
                    // Editors often write in several steps
                    std::thread::sleep(Duration::from_millis(100));
                    while rx.try_recv().is_ok() {}
                    info!("Local spec change detected, refreshing...");
                    on_change();
                }
                Ok(Err(e)) => error!("Watch error: {:?}", e),
                Err(e) => {
                    error!("Watch channel error: {:?}", e);
                    break;
                }
            }
        });

        Ok(Self { _watcher: watcher })
    }
}

fn is_spec_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| SpecKind::ALL.iter().any(|kind| kind.local_file() == name))
}

fn touches_spec_file(event: &Event) -> bool {
    !event.kind.is_access() && event.paths.iter().any(|p| is_spec_file(p))
}
