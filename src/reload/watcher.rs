//! Filesystem watching over the definition roots.
//!
//! A blocking thread owns the `notify` watcher and debounces its raw events;
//! classified reload events are forwarded over a channel to a single async
//! consumer that applies them one at a time. The polling backend can be
//! forced by config for filesystems without native change notification.

use crate::context::AppContext;
use crate::errors::Result;
use crate::reload::{self, FileAction, ReloadEvent, WatchRoots};
use notify::{PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

enum AnyWatcher {
    Native(RecommendedWatcher),
    Poll(PollWatcher),
}

impl AnyWatcher {
    fn watch(&mut self, path: &std::path::Path) -> std::result::Result<(), notify::Error> {
        match self {
            Self::Native(w) => w.watch(path, RecursiveMode::Recursive),
            Self::Poll(w) => w.watch(path, RecursiveMode::Recursive),
        }
    }
}

/// Start the watcher. Returns the handles of the blocking watch thread and
/// the async apply loop.
pub fn spawn(ctx: Arc<AppContext>) -> Result<(JoinHandle<()>, JoinHandle<()>)> {
    let roots = WatchRoots::from_config(&ctx.config);
    let debounce = Duration::from_millis(ctx.config.runtime.watch_debounce_ms.max(100));
    let use_poll = ctx.config.runtime.watch_poll;
    let poll_interval = Duration::from_secs(ctx.config.runtime.watch_poll_interval_secs.max(1));

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<ReloadEvent>();

    let apply_ctx = Arc::clone(&ctx);
    let apply_handle = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            reload::apply(&apply_ctx, event).await;
        }
        debug!("reload apply loop finished");
    });

    let watch_handle = tokio::task::spawn_blocking(move || {
        let (tx, rx) = std::sync::mpsc::channel::<notify::Event>();

        let handler = move |result: std::result::Result<notify::Event, notify::Error>| {
            match result {
                Ok(event) => {
                    use notify::EventKind;
                    match event.kind {
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
                            let _ = tx.send(event);
                        }
                        _ => {}
                    }
                }
                Err(error) => warn!(%error, "file watcher backend error"),
            }
        };

        let mut watcher = if use_poll {
            let config = notify::Config::default().with_poll_interval(poll_interval);
            match PollWatcher::new(handler, config) {
                Ok(w) => AnyWatcher::Poll(w),
                Err(error) => {
                    error!(%error, "failed to create polling file watcher");
                    return;
                }
            }
        } else {
            match notify::recommended_watcher(handler) {
                Ok(w) => AnyWatcher::Native(w),
                Err(error) => {
                    error!(%error, "failed to create file watcher");
                    return;
                }
            }
        };

        for root in [&roots.commands, &roots.tasks, &roots.fragments] {
            if let Err(error) = watcher.watch(root) {
                warn!(%error, path = %root.display(), "failed to watch definition root");
            }
        }
        info!(
            commands = %roots.commands.display(),
            tasks = %roots.tasks.display(),
            fragments = %roots.fragments.display(),
            polling = use_poll,
            "file watcher started"
        );

        // Debounce loop: take the first event, drain everything arriving
        // within the window, then forward one action per path (last wins).
        while let Ok(first) = rx.recv() {
            let mut changed: Vec<PathBuf> = first.paths;
            while let Ok(event) = rx.recv_timeout(debounce) {
                changed.extend(event.paths);
            }

            let mut actions: HashMap<PathBuf, FileAction> = HashMap::new();
            for path in changed {
                let action = if path.exists() {
                    FileAction::Upsert
                } else {
                    FileAction::Remove
                };
                actions.insert(path, action);
            }

            for (path, action) in actions {
                let Some(event) = reload::classify(&roots, &path, action) else {
                    continue;
                };
                debug!(path = %path.display(), ?action, "definition change detected");
                if event_tx.send(event).is_err() {
                    info!("reload consumer gone; file watcher stopping");
                    return;
                }
            }
        }
        info!("file watcher stopped");
    });

    Ok((watch_handle, apply_handle))
}

/// Make sure all watched roots exist so the watcher can attach to them.
pub fn ensure_roots(ctx: &AppContext) -> Result<()> {
    for audience in crate::registry::Audience::ALL {
        std::fs::create_dir_all(ctx.config.commands_dir(audience))?;
        std::fs::create_dir_all(ctx.config.tasks_dir(audience))?;
    }
    std::fs::create_dir_all(&ctx.config.paths.fragments)?;
    Ok(())
}
