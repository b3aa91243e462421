//! Shared test utilities.
//!
//! Provides recording implementations of the platform traits and a fully
//! wired [`AppContext`] over temp directories and an in-memory database, so
//! dispatch, reload, and scheduling behavior can be exercised end to end
//! without Discord.

use crate::config::{AppConfig, AudienceTargets, DefinitionPaths, GuildTarget, RuntimeOptions};
use crate::context::AppContext;
use crate::db;
use crate::errors::Result;
use crate::platform::{
    CommandPublisher, MessageRef, ModalDefinition, Notifier, Reply, Responder, UserProfile,
};
use crate::registry::{Audience, CommandSchema};
use crate::reload::WatchRoots;
use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Responder that records everything it is asked to send.
pub struct RecordingResponder {
    replies: Mutex<Vec<Reply>>,
    edits: Mutex<Vec<Reply>>,
    modals: Mutex<Vec<ModalDefinition>>,
    deferred: AtomicBool,
}

impl RecordingResponder {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            modals: Mutex::new(Vec::new()),
            deferred: AtomicBool::new(false),
        }
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.replies.lock().expect("replies lock").clone()
    }

    pub fn edits(&self) -> Vec<Reply> {
        self.edits.lock().expect("edits lock").clone()
    }

    pub fn modals(&self) -> Vec<ModalDefinition> {
        self.modals.lock().expect("modals lock").clone()
    }

    pub fn was_deferred(&self) -> bool {
        self.deferred.load(Ordering::SeqCst)
    }
}

impl Default for RecordingResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Responder for RecordingResponder {
    async fn send(&self, reply: Reply) -> Result<()> {
        self.replies.lock().expect("replies lock").push(reply);
        Ok(())
    }

    async fn defer(&self) -> Result<()> {
        self.deferred.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn edit(&self, reply: Reply) -> Result<()> {
        self.edits.lock().expect("edits lock").push(reply);
        Ok(())
    }

    async fn open_modal(&self, modal: &ModalDefinition) -> Result<()> {
        self.modals.lock().expect("modals lock").push(modal.clone());
        Ok(())
    }
}

/// Notifier that records DMs and deletions.
pub struct RecordingNotifier {
    dms: Mutex<Vec<(u64, Reply)>>,
    deleted: Mutex<Vec<MessageRef>>,
    next_message_id: AtomicU64,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            dms: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            next_message_id: AtomicU64::new(1),
        }
    }

    pub fn direct_messages(&self) -> Vec<(u64, Reply)> {
        self.dms.lock().expect("dms lock").clone()
    }

    pub fn deleted_messages(&self) -> Vec<MessageRef> {
        self.deleted.lock().expect("deleted lock").clone()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn direct_message(&self, user_id: u64, reply: Reply) -> Result<MessageRef> {
        self.dms.lock().expect("dms lock").push((user_id, reply));
        Ok(MessageRef {
            channel_id: user_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<()> {
        self.deleted.lock().expect("deleted lock").push(*message);
        Ok(())
    }

    async fn fetch_user(&self, user_id: u64) -> Result<UserProfile> {
        Ok(UserProfile {
            id: user_id,
            username: format!("user-{user_id}"),
        })
    }
}

/// Publisher that records each bulk replace as (audience, command names).
pub struct RecordingPublisher {
    calls: Mutex<Vec<(Audience, Vec<String>)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Audience, Vec<String>)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl Default for RecordingPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandPublisher for RecordingPublisher {
    async fn replace_commands(
        &self,
        audience: Audience,
        schemas: Vec<CommandSchema>,
    ) -> Result<()> {
        let names = schemas.into_iter().map(|s| s.name).collect();
        self.calls
            .lock()
            .expect("calls lock")
            .push((audience, names));
        Ok(())
    }
}

/// Everything a test needs besides the context itself: the recording fakes
/// and the temp directory tree the context points at.
pub struct TestHarness {
    pub notifier: Arc<RecordingNotifier>,
    pub publisher: Arc<RecordingPublisher>,
    root: tempfile::TempDir,
}

impl TestHarness {
    pub fn commands_dir(&self, audience: Audience) -> PathBuf {
        self.root
            .path()
            .join("commands")
            .join(audience.dir_name())
    }

    pub fn tasks_dir(&self, audience: Audience) -> PathBuf {
        self.root.path().join("tasks").join(audience.dir_name())
    }

    pub fn fragments_dir(&self) -> PathBuf {
        self.root.path().join("config")
    }

    pub fn roots(&self) -> WatchRoots {
        let resolve = |p: PathBuf| fs::canonicalize(&p).unwrap_or(p);
        WatchRoots {
            commands: resolve(self.root.path().join("commands")),
            tasks: resolve(self.root.path().join("tasks")),
            fragments: resolve(self.fragments_dir()),
        }
    }
}

/// Build a context over temp dirs, an in-memory database, and recording
/// fakes. Admin id 42 is preconfigured.
pub async fn test_context() -> (Arc<AppContext>, TestHarness) {
    let root = tempfile::tempdir().expect("tempdir");
    for audience in Audience::ALL {
        fs::create_dir_all(root.path().join("commands").join(audience.dir_name()))
            .expect("commands dir");
        fs::create_dir_all(root.path().join("tasks").join(audience.dir_name()))
            .expect("tasks dir");
    }
    fs::create_dir_all(root.path().join("config")).expect("fragments dir");

    let config = AppConfig {
        timezone: chrono_tz::UTC,
        unlock_command: "unlock".to_string(),
        admins: vec![42],
        database_path: ":memory:".to_string(),
        audiences: AudienceTargets {
            production: GuildTarget { guild_id: 1001 },
            development: GuildTarget { guild_id: 2002 },
        },
        paths: DefinitionPaths {
            commands: root.path().join("commands"),
            tasks: root.path().join("tasks"),
            fragments: root.path().join("config"),
        },
        runtime: RuntimeOptions {
            tick_seconds: 60,
            recovery_poll_ms: 50,
            watch_debounce_ms: 100,
            watch_poll: false,
            watch_poll_interval_secs: 1,
        },
    };

    let notifier = Arc::new(RecordingNotifier::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let db = db::init_memory_db().expect("in-memory db");
    let ctx = Arc::new(AppContext::new(
        config,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        Arc::clone(&publisher) as Arc<dyn CommandPublisher>,
        db,
    ));
    (
        ctx,
        TestHarness {
            notifier,
            publisher,
            root,
        },
    )
}
