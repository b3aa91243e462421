//! Hot reload: filesystem change -> lock -> registry mutation -> republish
//! -> unlock.
//!
//! The watcher half ([`watcher`]) turns raw filesystem notifications into
//! [`ReloadEvent`]s; this module applies them. Events flow through a single
//! channel and are applied one at a time, so two near-simultaneous file
//! changes can never interleave their load/republish sequences.

pub mod watcher;

use crate::context::AppContext;
use crate::registry::{Audience, audience_from_path, is_definition_file};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    /// The file was created or changed; (re)load it.
    Upsert,
    /// The file is gone; unload it.
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadEvent {
    Command {
        audience: Audience,
        action: FileAction,
        path: PathBuf,
    },
    Task {
        audience: Audience,
        action: FileAction,
        path: PathBuf,
    },
    Fragment {
        action: FileAction,
        path: PathBuf,
    },
}

/// The three watched roots, canonicalized so watcher paths compare cleanly.
#[derive(Debug, Clone)]
pub struct WatchRoots {
    pub commands: PathBuf,
    pub tasks: PathBuf,
    pub fragments: PathBuf,
}

impl WatchRoots {
    pub fn from_config(config: &crate::config::AppConfig) -> Self {
        let resolve = |p: &Path| std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
        Self {
            commands: resolve(&config.paths.commands),
            tasks: resolve(&config.paths.tasks),
            fragments: resolve(&config.paths.fragments),
        }
    }
}

/// Classify a changed path into a reload event, or `None` when the change is
/// irrelevant (wrong extension, unknown directory, unrecognized audience).
pub fn classify(roots: &WatchRoots, path: &Path, action: FileAction) -> Option<ReloadEvent> {
    if !is_definition_file(path) {
        return None;
    }
    if path.starts_with(&roots.commands) {
        match audience_from_path(path) {
            Ok(audience) => {
                return Some(ReloadEvent::Command {
                    audience,
                    action,
                    path: path.to_path_buf(),
                });
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "command change outside audience dirs");
                return None;
            }
        }
    }
    if path.starts_with(&roots.tasks) {
        match audience_from_path(path) {
            Ok(audience) => {
                return Some(ReloadEvent::Task {
                    audience,
                    action,
                    path: path.to_path_buf(),
                });
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "task change outside audience dirs");
                return None;
            }
        }
    }
    if path.starts_with(&roots.fragments) {
        return Some(ReloadEvent::Fragment {
            action,
            path: path.to_path_buf(),
        });
    }
    None
}

/// Apply one reload event under the global lock.
///
/// The lock is set before anything is touched and cleared after the last
/// step, including on every failure path: load errors are contained inside
/// the registries (old definitions stay), and a failed republish is logged;
/// the in-memory state is already updated and the next successful publish is
/// a full idempotent replace anyway.
pub async fn apply(ctx: &Arc<AppContext>, event: ReloadEvent) {
    ctx.set_locked(true);
    match &event {
        ReloadEvent::Command {
            audience,
            action,
            path,
        } => {
            match action {
                FileAction::Upsert => {
                    if let Err(e) = ctx.commands.load(path) {
                        warn!(path = %path.display(), error = %e, "command reload failed");
                    }
                }
                FileAction::Remove => ctx.commands.unload(path),
            }
            let schemas = ctx.commands.schemas(*audience);
            info!(%audience, commands = schemas.len(), "republishing command surface");
            if let Err(e) = ctx.publisher.replace_commands(*audience, schemas).await {
                error!(%audience, error = %e, "command surface republish failed");
            }
        }
        ReloadEvent::Task {
            audience: _,
            action,
            path,
        } => match action {
            FileAction::Upsert => {
                if let Err(e) = ctx.tasks.load(path) {
                    warn!(path = %path.display(), error = %e, "task reload failed");
                }
            }
            FileAction::Remove => ctx.tasks.unload(path),
        },
        ReloadEvent::Fragment { action, path } => match action {
            FileAction::Upsert => {
                if let Err(e) = ctx.fragments.load(path) {
                    warn!(path = %path.display(), error = %e, "fragment reload failed");
                }
            }
            FileAction::Remove => ctx.fragments.unload(path),
        },
    }
    ctx.set_locked(false);
}
