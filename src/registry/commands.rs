use crate::errors::{Error, Result};
use crate::handlers;
use crate::registry::{Audience, CommandHandler, audience_from_path};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Slash-command option kinds this bot publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    String,
    Integer,
    Boolean,
    Number,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OptionSpec {
    pub name: String,
    pub description: String,
    pub kind: OptionKind,
    #[serde(default)]
    pub required: bool,
}

/// The declarative half of a command: what gets published to the platform.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandSchema {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub options: Vec<OptionSpec>,
}

/// On-disk shape of a command definition file.
#[derive(Debug, Deserialize)]
struct CommandDefFile {
    name: String,
    description: String,
    #[serde(default)]
    options: Vec<OptionSpec>,
    /// Primary entry point, resolved against the handler table.
    handler: String,
    /// Named secondary entry points reached via correlation ids.
    #[serde(default)]
    subhandlers: HashMap<String, String>,
    #[serde(default)]
    help: Option<String>,
}

/// A loaded command: schema plus resolved entry points.
pub struct CommandEntry {
    pub schema: CommandSchema,
    pub handler: CommandHandler,
    subhandlers: HashMap<String, CommandHandler>,
    pub help: Option<String>,
}

impl CommandEntry {
    pub fn subhandler(&self, name: &str) -> Option<CommandHandler> {
        self.subhandlers.get(name).copied()
    }

    #[cfg(test)]
    pub(crate) fn for_test(
        schema: CommandSchema,
        handler: CommandHandler,
        subhandlers: HashMap<String, CommandHandler>,
    ) -> Self {
        Self {
            schema,
            handler,
            subhandlers,
            help: None,
        }
    }
}

/// Audience-keyed catalog of loaded commands.
///
/// `load` replaces in place: the new definition is parsed and its handlers
/// resolved *before* the maps are touched, so any failure leaves the
/// previously loaded entry (if one exists) fully intact.
pub struct CommandRegistry {
    maps: RwLock<HashMap<Audience, BTreeMap<String, Arc<CommandEntry>>>>,
    /// File path -> declared name, so unload and renames work even when the
    /// filename and the declared name differ.
    path_index: Mutex<HashMap<PathBuf, (Audience, String)>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        let mut maps = HashMap::new();
        for audience in Audience::ALL {
            maps.insert(audience, BTreeMap::new());
        }
        Self {
            maps: RwLock::new(maps),
            path_index: Mutex::new(HashMap::new()),
        }
    }

    /// Load (or reload) one definition file. The audience is resolved from
    /// the file's parent directory.
    pub fn load(&self, path: &Path) -> Result<()> {
        let audience = audience_from_path(path)?;
        let contents = fs::read_to_string(path).map_err(|e| Error::Definition {
            path: path.display().to_string(),
            reason: format!("unreadable: {e}"),
        })?;
        let def: CommandDefFile = toml::from_str(&contents).map_err(|e| Error::Definition {
            path: path.display().to_string(),
            reason: format!("invalid TOML: {e}"),
        })?;
        if def.name.is_empty() {
            return Err(Error::Definition {
                path: path.display().to_string(),
                reason: "empty command name".to_string(),
            });
        }

        let handler =
            handlers::command_handler(&def.handler).ok_or_else(|| Error::Definition {
                path: path.display().to_string(),
                reason: format!("unknown handler {:?}", def.handler),
            })?;
        let mut subhandlers = HashMap::new();
        for (sub, fn_name) in &def.subhandlers {
            let resolved =
                handlers::command_handler(fn_name).ok_or_else(|| Error::Definition {
                    path: path.display().to_string(),
                    reason: format!("unknown subhandler {:?} for {:?}", fn_name, sub),
                })?;
            subhandlers.insert(sub.clone(), resolved);
        }

        let name = def.name.clone();
        let entry = Arc::new(CommandEntry {
            schema: CommandSchema {
                name: def.name,
                description: def.description,
                options: def.options,
            },
            handler,
            subhandlers,
            help: def.help,
        });

        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());
        let mut index = self.path_index.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((old_audience, old_name)) = index.get(path)
            && (*old_audience != audience || *old_name != name)
            && let Some(map) = maps.get_mut(old_audience)
        {
            // The file changed its declared name; drop the stale entry.
            map.remove(old_name);
        }
        if let Some(map) = maps.get_mut(&audience) {
            map.insert(name.clone(), entry);
        }
        index.insert(path.to_path_buf(), (audience, name.clone()));
        info!(command = %name, %audience, path = %path.display(), "command loaded");
        Ok(())
    }

    /// Remove the definition that was loaded from `path`. Tolerates paths
    /// that were never loaded.
    pub fn unload(&self, path: &Path) {
        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());
        let mut index = self.path_index.lock().unwrap_or_else(|e| e.into_inner());
        match index.remove(path) {
            Some((audience, name)) => {
                if let Some(map) = maps.get_mut(&audience) {
                    map.remove(&name);
                }
                info!(command = %name, %audience, "command unloaded");
            }
            None => debug!(path = %path.display(), "unload: nothing was loaded from path"),
        }
    }

    pub fn get(&self, audience: Audience, name: &str) -> Option<Arc<CommandEntry>> {
        let maps = self.maps.read().unwrap_or_else(|e| e.into_inner());
        maps.get(&audience).and_then(|map| map.get(name)).cloned()
    }

    pub fn names(&self, audience: Audience) -> Vec<String> {
        let maps = self.maps.read().unwrap_or_else(|e| e.into_inner());
        maps.get(&audience)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the full publishable surface for one audience.
    pub fn schemas(&self, audience: Audience) -> Vec<CommandSchema> {
        let maps = self.maps.read().unwrap_or_else(|e| e.into_inner());
        maps.get(&audience)
            .map(|map| map.values().map(|e| e.schema.clone()).collect())
            .unwrap_or_default()
    }

    /// Load every definition file in one audience directory. Individual
    /// failures are logged and skipped so one bad file cannot block startup.
    pub fn load_dir(&self, dir: &Path) -> usize {
        let mut loaded = 0;
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "command directory unreadable");
                return 0;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !super::is_definition_file(&path) {
                continue;
            }
            match self.load(&path) {
                Ok(()) => loaded += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "skipping command definition"),
            }
        }
        loaded
    }

    #[cfg(test)]
    pub(crate) fn insert_for_test(&self, audience: Audience, entry: CommandEntry) {
        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());
        if let Some(map) = maps.get_mut(&audience) {
            map.insert(entry.schema.name.clone(), Arc::new(entry));
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
