use crate::errors::{Error, Result};
use crate::registry::Audience;
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::{env, fs};

/// Fully loaded application configuration.
///
/// The Discord bot token is deliberately absent: it is read from the
/// environment directly before use and never stored here.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Civil timezone used for time-of-day task scheduling.
    pub timezone: Tz,
    /// Name of the command that is allowed through while the reload lock is set.
    pub unlock_command: String,
    /// Discord user ids with operator privileges.
    pub admins: Vec<u64>,
    pub database_path: String,
    pub audiences: AudienceTargets,
    pub paths: DefinitionPaths,
    pub runtime: RuntimeOptions,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AudienceTargets {
    pub production: GuildTarget,
    pub development: GuildTarget,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GuildTarget {
    pub guild_id: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DefinitionPaths {
    /// Root holding one subdirectory per audience with command definitions.
    pub commands: PathBuf,
    /// Root holding one subdirectory per audience with task definitions.
    pub tasks: PathBuf,
    /// Directory of named config fragments.
    pub fragments: PathBuf,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RuntimeOptions {
    /// Task runner tick period. Coarse by design; due times are minute-granular.
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
    /// How often the recovery buffer re-checks the reload lock.
    #[serde(default = "default_recovery_poll_ms")]
    pub recovery_poll_ms: u64,
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
    /// Force the polling watcher backend (for filesystems without native
    /// change notification).
    #[serde(default)]
    pub watch_poll: bool,
    #[serde(default = "default_watch_poll_interval_secs")]
    pub watch_poll_interval_secs: u64,
}

const fn default_tick_seconds() -> u64 {
    60
}
const fn default_recovery_poll_ms() -> u64 {
    500
}
const fn default_watch_debounce_ms() -> u64 {
    2000
}
const fn default_watch_poll_interval_secs() -> u64 {
    2
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            tick_seconds: default_tick_seconds(),
            recovery_poll_ms: default_recovery_poll_ms(),
            watch_debounce_ms: default_watch_debounce_ms(),
            watch_poll: false,
            watch_poll_interval_secs: default_watch_poll_interval_secs(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct RawConfig {
    #[serde(default = "default_timezone")]
    timezone: String,
    #[serde(default = "default_unlock_command")]
    unlock_command: String,
    #[serde(default)]
    admins: Vec<u64>,
    #[serde(default = "default_database_path")]
    database_path: String,
    audiences: AudienceTargets,
    paths: DefinitionPaths,
    #[serde(default)]
    runtime: RuntimeOptions,
}

fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_unlock_command() -> String {
    "unlock".to_string()
}
fn default_database_path() -> String {
    "quartermaster.db".to_string()
}

impl AppConfig {
    pub fn guild_id(&self, audience: Audience) -> u64 {
        match audience {
            Audience::Production => self.audiences.production.guild_id,
            Audience::Development => self.audiences.development.guild_id,
        }
    }

    /// Directory of command definitions for one audience.
    pub fn commands_dir(&self, audience: Audience) -> PathBuf {
        self.paths.commands.join(audience.dir_name())
    }

    /// Directory of task definitions for one audience.
    pub fn tasks_dir(&self, audience: Audience) -> PathBuf {
        self.paths.tasks.join(audience.dir_name())
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admins.contains(&user_id)
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = fs::read_to_string(path_ref)
        .map_err(|e| Error::Config(format!("Failed to read config file {:?}: {}", path_ref, e)))?;
    let raw: RawConfig = toml::from_str(&contents).map_err(|e| {
        Error::Config(format!(
            "Failed to parse TOML from config file {:?}: {}",
            path_ref, e
        ))
    })?;

    let timezone: Tz = raw
        .timezone
        .parse()
        .map_err(|_| Error::Config(format!("Unknown timezone: {}", raw.timezone)))?;

    Ok(AppConfig {
        timezone,
        unlock_command: raw.unlock_command,
        admins: raw.admins,
        database_path: raw.database_path,
        audiences: raw.audiences,
        paths: raw.paths,
        runtime: raw.runtime,
    })
}

/// Load the config from `QUARTERMASTER_CONFIG` or the default `config.toml`.
pub fn load_app_configuration() -> Result<AppConfig> {
    let path = env::var("QUARTERMASTER_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    load_config(path)
}
