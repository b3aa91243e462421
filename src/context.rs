//! Process-wide application context.
//!
//! One `AppContext` is built at startup and handed (as an `Arc`) to every
//! component: the interaction gate, the task runner, the reload controller,
//! and all handlers. Nothing in this crate reaches for ambient globals; if a
//! component needs shared state, it is a field here.

use crate::config::AppConfig;
use crate::db::{DbPool, RowStore};
use crate::errors::{Error, Result};
use crate::platform::{CommandPublisher, Notifier};
use crate::recovery::RecoveryBuffer;
use crate::registry::{Audience, CommandRegistry, TaskRegistry};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Named config fragments, each loaded from one TOML file. The key is the
/// file stem; the value is kept as raw TOML so fragments can carry whatever
/// shape their consumers expect.
pub struct FragmentStore {
    map: RwLock<HashMap<String, toml::Value>>,
}

impl FragmentStore {
    fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    fn key_for(path: &Path) -> Result<String> {
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Config(format!("fragment path has no stem: {}", path.display())))
    }

    pub fn load(&self, path: &Path) -> Result<()> {
        let key = Self::key_for(path)?;
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("unreadable fragment {}: {e}", path.display())))?;
        let value: toml::Value = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("invalid fragment {}: {e}", path.display())))?;
        self.map
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone(), value);
        info!(fragment = %key, "config fragment loaded");
        Ok(())
    }

    pub fn unload(&self, path: &Path) {
        if let Ok(key) = Self::key_for(path) {
            let removed = self
                .map
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&key);
            if removed.is_some() {
                info!(fragment = %key, "config fragment unloaded");
            } else {
                debug!(fragment = %key, "unload: fragment was not loaded");
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<toml::Value> {
        self.map
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .map
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }
}

pub struct AppContext {
    pub config: AppConfig,
    pub commands: CommandRegistry,
    pub tasks: TaskRegistry,
    pub recovery: RecoveryBuffer,
    pub fragments: FragmentStore,
    pub notifier: Arc<dyn Notifier>,
    pub publisher: Arc<dyn CommandPublisher>,
    pub db: DbPool,
    pub rows: RowStore,
    /// The reload lock. Cooperative and ownerless: the reload controller
    /// sets it around a reload window, the gate refuses to dispatch while it
    /// is set. Not a mutex: there is no queueing and no fairness.
    locked: AtomicBool,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        notifier: Arc<dyn Notifier>,
        publisher: Arc<dyn CommandPublisher>,
        db: DbPool,
    ) -> Self {
        let timezone = config.timezone;
        Self {
            commands: CommandRegistry::new(),
            tasks: TaskRegistry::new(timezone),
            recovery: RecoveryBuffer::new(),
            fragments: FragmentStore::new(),
            rows: RowStore::new(Arc::clone(&db)),
            db,
            notifier,
            publisher,
            locked: AtomicBool::new(false),
            config,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    pub fn set_locked(&self, locked: bool) {
        let was = self.locked.swap(locked, Ordering::SeqCst);
        if was != locked {
            info!(locked, "reload lock changed");
        }
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.config.is_admin(user_id)
    }

    /// Initial sweep over every definition directory and the fragment
    /// directory. Individual file failures are logged and skipped.
    pub fn load_all_definitions(&self) {
        for audience in Audience::ALL {
            let commands = self.commands.load_dir(&self.config.commands_dir(audience));
            let tasks = self.tasks.load_dir(&self.config.tasks_dir(audience));
            info!(%audience, commands, tasks, "definitions loaded");
        }
        match std::fs::read_dir(&self.config.paths.fragments) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                        continue;
                    }
                    if let Err(e) = self.fragments.load(&path) {
                        warn!(path = %path.display(), error = %e, "skipping config fragment");
                    }
                }
            }
            Err(e) => warn!(
                dir = %self.config.paths.fragments.display(),
                error = %e,
                "fragment directory unreadable"
            ),
        }
    }
}
