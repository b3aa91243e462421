use crate::errors::{Error, Result};
use crate::handlers;
use crate::registry::{Audience, TaskRun, audience_from_path};
use crate::schedule::clock;
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// On-disk shape of a task definition file.
#[derive(Debug, Deserialize)]
struct TaskDefFile {
    name: String,
    /// Fixed interval in minutes.
    #[serde(default)]
    interval: Option<i64>,
    /// Times of day, "HH:MM", evaluated in the configured civil timezone.
    #[serde(default)]
    times: Vec<String>,
    #[serde(default)]
    auto_start: bool,
    #[serde(default)]
    run_on_start: bool,
    /// How many fires before automatic deactivation; 0 means unbounded.
    #[serde(default)]
    repeat: u32,
    /// Keep `next_fire_at`/`remaining_repeats` across a reload.
    #[serde(default)]
    not_reset_on_reload: bool,
    /// Entry point, resolved against the handler table.
    run: String,
}

/// The data half of a task definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: String,
    pub interval_minutes: Option<i64>,
    pub times: Vec<NaiveTime>,
    pub auto_start: bool,
    pub run_on_start: bool,
    pub repeat: u32,
    pub not_reset_on_reload: bool,
}

/// Scheduler-owned runtime fields of a task.
#[derive(Debug, Clone, Default)]
pub struct TaskRuntime {
    pub activated: bool,
    pub next_fire_at: Option<DateTime<Utc>>,
    /// `None` while inactive or when `repeat == 0` (unbounded).
    pub remaining_repeats: Option<u32>,
}

pub struct TaskEntry {
    pub audience: Audience,
    pub spec: TaskSpec,
    pub run: TaskRun,
    state: Mutex<TaskRuntime>,
    /// Reentrancy guard: set while a run is in flight.
    running: AtomicBool,
}

impl TaskEntry {
    pub fn new(audience: Audience, spec: TaskSpec, run: TaskRun) -> Self {
        Self {
            audience,
            spec,
            run,
            state: Mutex::new(TaskRuntime::default()),
            running: AtomicBool::new(false),
        }
    }

    pub fn runtime(&self) -> TaskRuntime {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut TaskRuntime) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// Try to enter the running state; false if a run is already in flight.
    pub(crate) fn try_begin_run(&self) -> bool {
        !self.running.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn end_run(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Activate: compute the first fire time and arm the repeat counter.
    /// A task with no computable schedule stays inactive.
    pub fn activate(&self, tz: Tz, now: DateTime<Utc>) -> Result<()> {
        let next = if self.spec.run_on_start {
            now
        } else {
            clock::next_fire(self.spec.interval_minutes, &self.spec.times, tz, now)?
        };
        self.with_state(|state| {
            state.activated = true;
            state.next_fire_at = Some(next);
            state.remaining_repeats = (self.spec.repeat > 0).then_some(self.spec.repeat);
        });
        info!(task = %self.spec.name, audience = %self.audience, next_fire_at = %next, "task activated");
        Ok(())
    }

    pub fn deactivate(&self) {
        self.with_state(|state| {
            state.activated = false;
            state.next_fire_at = None;
        });
        info!(task = %self.spec.name, audience = %self.audience, "task deactivated");
    }
}

fn parse_times(path: &Path, raw: &[String]) -> Result<Vec<NaiveTime>> {
    raw.iter()
        .map(|s| {
            NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| Error::Definition {
                path: path.display().to_string(),
                reason: format!("invalid time of day {:?}, expected HH:MM", s),
            })
        })
        .collect()
}

/// Audience-keyed catalog of loaded tasks. Same replacement and
/// keep-old-on-failure semantics as the command registry, plus
/// auto-activation and optional runtime-state preservation on reload.
pub struct TaskRegistry {
    tz: Tz,
    maps: RwLock<HashMap<Audience, BTreeMap<String, Arc<TaskEntry>>>>,
    path_index: Mutex<HashMap<PathBuf, (Audience, String)>>,
}

impl TaskRegistry {
    pub fn new(tz: Tz) -> Self {
        let mut maps = HashMap::new();
        for audience in Audience::ALL {
            maps.insert(audience, BTreeMap::new());
        }
        Self {
            tz,
            maps: RwLock::new(maps),
            path_index: Mutex::new(HashMap::new()),
        }
    }

    pub fn load(&self, path: &Path) -> Result<()> {
        let audience = audience_from_path(path)?;
        let contents = fs::read_to_string(path).map_err(|e| Error::Definition {
            path: path.display().to_string(),
            reason: format!("unreadable: {e}"),
        })?;
        let def: TaskDefFile = toml::from_str(&contents).map_err(|e| Error::Definition {
            path: path.display().to_string(),
            reason: format!("invalid TOML: {e}"),
        })?;
        if def.name.is_empty() {
            return Err(Error::Definition {
                path: path.display().to_string(),
                reason: "empty task name".to_string(),
            });
        }
        let run = handlers::task_run(&def.run).ok_or_else(|| Error::Definition {
            path: path.display().to_string(),
            reason: format!("unknown task entry point {:?}", def.run),
        })?;
        let times = parse_times(path, &def.times)?;
        if def.interval.is_some() && !times.is_empty() {
            warn!(
                task = %def.name,
                path = %path.display(),
                "both interval and times configured; interval wins"
            );
        }

        let spec = TaskSpec {
            name: def.name,
            interval_minutes: def.interval,
            times,
            auto_start: def.auto_start,
            run_on_start: def.run_on_start,
            repeat: def.repeat,
            not_reset_on_reload: def.not_reset_on_reload,
        };
        let name = spec.name.clone();
        let auto_start = spec.auto_start || spec.run_on_start;
        let preserve = spec.not_reset_on_reload;
        let entry = Arc::new(TaskEntry::new(audience, spec, run));

        let mut preserved = false;
        {
            let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());
            let mut index = self.path_index.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((old_audience, old_name)) = index.get(path)
                && (*old_audience != audience || *old_name != name)
                && let Some(map) = maps.get_mut(old_audience)
            {
                if let Some(stale) = map.remove(old_name) {
                    stale.deactivate();
                }
            }
            if let Some(map) = maps.get_mut(&audience) {
                if let Some(prior) = map.get(&name) {
                    if preserve {
                        let carried = prior.runtime();
                        if carried.activated {
                            entry.with_state(|state| *state = carried);
                            preserved = true;
                        }
                    }
                    // The replaced entry must never fire from a stale
                    // runner snapshot.
                    prior.deactivate();
                }
                map.insert(name.clone(), Arc::clone(&entry));
            }
            index.insert(path.to_path_buf(), (audience, name.clone()));
        }
        info!(task = %name, %audience, path = %path.display(), preserved, "task loaded");

        if auto_start && !preserved
            && let Err(e) = entry.activate(self.tz, Utc::now())
        {
            warn!(task = %name, error = %e, "auto-activation failed; task stays inactive");
        }
        Ok(())
    }

    pub fn unload(&self, path: &Path) {
        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());
        let mut index = self.path_index.lock().unwrap_or_else(|e| e.into_inner());
        match index.remove(path) {
            Some((audience, name)) => {
                if let Some(entry) = maps.get_mut(&audience).and_then(|map| map.remove(&name)) {
                    entry.deactivate();
                }
                info!(task = %name, %audience, "task unloaded");
            }
            None => debug!(path = %path.display(), "unload: nothing was loaded from path"),
        }
    }

    pub fn get(&self, audience: Audience, name: &str) -> Option<Arc<TaskEntry>> {
        let maps = self.maps.read().unwrap_or_else(|e| e.into_inner());
        maps.get(&audience).and_then(|map| map.get(name)).cloned()
    }

    /// Snapshot of every task in one audience, in name order.
    pub fn snapshot(&self, audience: Audience) -> Vec<Arc<TaskEntry>> {
        let maps = self.maps.read().unwrap_or_else(|e| e.into_inner());
        maps.get(&audience)
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn load_dir(&self, dir: &Path) -> usize {
        let mut loaded = 0;
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "task directory unreadable");
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
                Err(e) => warn!(path = %path.display(), error = %e, "skipping task definition"),
            }
        }
        loaded
    }

    #[cfg(test)]
    pub(crate) fn insert_for_test(&self, entry: TaskEntry) -> Arc<TaskEntry> {
        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());
        let audience = entry.audience;
        let name = entry.spec.name.clone();
        let entry = Arc::new(entry);
        if let Some(map) = maps.get_mut(&audience) {
            map.insert(name, Arc::clone(&entry));
        }
        entry
    }
}
