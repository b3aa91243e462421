//! Hot-reloadable catalogs of command and task definitions.
//!
//! A definition is a TOML file on disk naming its entry points out of the
//! built-in handler table ([`crate::handlers`]); loading a file binds data
//! to function pointers, so a reload swaps schemas, options, and schedules
//! without restarting the process. Each registry is dual-keyed:
//! audience first, then the definition's declared name.

pub mod commands;
pub mod tasks;

pub use commands::{CommandEntry, CommandRegistry, CommandSchema, OptionKind, OptionSpec};
pub use tasks::{TaskEntry, TaskRegistry, TaskSpec};

use crate::context::AppContext;
use crate::errors::{Error, Result};
use crate::platform::Interaction;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

/// A deployment surface with its own command/task namespace and guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Audience {
    Production,
    Development,
}

impl Audience {
    pub const ALL: [Audience; 2] = [Audience::Production, Audience::Development];

    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        match name {
            "production" => Some(Self::Production),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Entry point bound to a command or one of its sub-handlers. Plain function
/// pointers keep definitions reloadable: the data half comes from disk, the
/// code half from the handler table.
pub type CommandHandler = for<'a> fn(&'a AppContext, &'a Interaction) -> HandlerFuture<'a>;

/// Entry point bound to a task definition.
pub type TaskRun = for<'a> fn(&'a AppContext, &'a TaskSpec) -> HandlerFuture<'a>;

/// Resolve the audience that owns a definition file from its parent
/// directory name.
pub(crate) fn audience_from_path(path: &Path) -> Result<Audience> {
    path.parent()
        .and_then(|dir| dir.file_name())
        .and_then(|name| name.to_str())
        .and_then(Audience::from_dir_name)
        .ok_or_else(|| Error::Definition {
            path: path.display().to_string(),
            reason: "not inside a recognized audience directory".to_string(),
        })
}

/// Only TOML files are definitions; editor swap files and the like are not.
pub(crate) fn is_definition_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("toml")
}
