//! Modal recovery across reload windows.
//!
//! A modal submission that arrives while the reload lock is set cannot be
//! dispatched, and the user's typed values would be lost with a bare "try
//! again". Instead the gate hands the submission here: it is captured keyed
//! by its correlation id, and once the lock clears every captured submitter
//! gets a DM with a button that reopens the same modal pre-filled with the
//! values they typed.

use crate::context::AppContext;
use crate::ids::CorrelationId;
use crate::platform::{ComponentClick, ModalDefinition, ModalField, ModalSubmission, Reply};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// One buffered submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedSubmission {
    pub user_id: u64,
    pub fields: Vec<(String, String)>,
}

/// The two-stage buffer: `captured` holds submissions taken while locked;
/// `ready` holds rebuilt modal definitions awaiting their reopen click.
pub struct RecoveryBuffer {
    captured: Mutex<HashMap<String, CapturedSubmission>>,
    ready: Mutex<HashMap<String, ModalDefinition>>,
    waiting: AtomicBool,
}

impl RecoveryBuffer {
    pub fn new() -> Self {
        Self {
            captured: Mutex::new(HashMap::new()),
            ready: Mutex::new(HashMap::new()),
            waiting: AtomicBool::new(false),
        }
    }

    /// Record a submission. A second capture under the same correlation id
    /// overwrites the first: last write wins.
    pub fn capture(&self, submission: &ModalSubmission) {
        let entry = CapturedSubmission {
            user_id: submission.user.id,
            fields: submission.fields.clone(),
        };
        self.captured
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(submission.custom_id.clone(), entry);
        info!(
            correlation_id = %submission.custom_id,
            user_id = submission.user.id,
            "modal submission captured during reload"
        );
    }

    pub fn captured_count(&self) -> usize {
        self.captured
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn ready_count(&self) -> usize {
        self.ready.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Start the singleton wait; false if one is already in flight.
    fn try_begin_wait(&self) -> bool {
        !self.waiting.swap(true, Ordering::SeqCst)
    }

    fn end_wait(&self) {
        self.waiting.store(false, Ordering::SeqCst);
    }

    /// Take the whole capture map atomically. Captures arriving after this
    /// point belong to the next wait cycle.
    fn take_captured(&self) -> HashMap<String, CapturedSubmission> {
        std::mem::take(&mut self.captured.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn stash_ready(&self, key: String, modal: ModalDefinition) {
        self.ready
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, modal);
    }

    fn take_ready(&self, key: &str) -> Option<ModalDefinition> {
        self.ready
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
    }
}

impl Default for RecoveryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Rebuild a modal from a captured submission, relabeled so the user can
/// see it is a replay. Field values become the defaults.
fn rebuild_modal(key: &str, submission: &CapturedSubmission) -> ModalDefinition {
    let title = match CorrelationId::decode(key) {
        Ok(CorrelationId::Handler { command, .. }) => format!("{command} (resent)"),
        _ => "Submission (resent)".to_string(),
    };
    ModalDefinition {
        custom_id: key.to_string(),
        title,
        fields: submission
            .fields
            .iter()
            .map(|(id, value)| ModalField {
                id: id.clone(),
                label: format!("{id} (resent)"),
                value: Some(value.clone()),
                required: false,
                paragraph: false,
            })
            .collect(),
    }
}

/// Wait for the reload lock to clear, then convert every captured
/// submission into a DM with a reopen button. Only one wait loop runs at a
/// time; extra calls return immediately.
pub async fn wait_and_replay(ctx: Arc<AppContext>) {
    if !ctx.recovery.try_begin_wait() {
        debug!("recovery wait already in flight");
        return;
    }
    let poll = Duration::from_millis(ctx.config.runtime.recovery_poll_ms.max(50));
    while ctx.is_locked() {
        tokio::time::sleep(poll).await;
    }
    // Clear the flag before draining: a capture arriving during the sends
    // below (i.e. during a new reload window) must be able to start its own
    // wait cycle.
    ctx.recovery.end_wait();

    let entries = ctx.recovery.take_captured();
    if entries.is_empty() {
        return;
    }
    info!(count = entries.len(), "replaying captured modal submissions");
    for (key, submission) in entries {
        let modal = rebuild_modal(&key, &submission);
        ctx.recovery.stash_ready(key.clone(), modal);
        let prompt = Reply::plain(
            "A reload interrupted your form submission. \
             Use the button below to reopen it with your values filled in.",
        )
        .with_button(CorrelationId::recovery(&key).encode(), "Resend form");
        match ctx.notifier.direct_message(submission.user_id, prompt).await {
            Ok(message) => debug!(
                correlation_id = %key,
                user_id = submission.user_id,
                channel_id = message.channel_id,
                "recovery prompt sent"
            ),
            Err(e) => error!(
                correlation_id = %key,
                user_id = submission.user_id,
                error = %e,
                "failed to send recovery prompt"
            ),
        }
    }
}

/// Handle a reopen click: delete the prompt message, reopen the rebuilt
/// modal, and evict it. Every failure is logged, never propagated.
pub async fn resend(ctx: &AppContext, click: &ComponentClick) {
    let key = match CorrelationId::decode(&click.custom_id) {
        Ok(CorrelationId::Recovery { key }) => key,
        other => {
            warn!(custom_id = %click.custom_id, ?other, "resend click with bad identifier");
            return;
        }
    };
    let Some(modal) = ctx.recovery.take_ready(&key) else {
        warn!(correlation_id = %key, "no replay-ready modal for resend click");
        if let Err(e) = click
            .responder
            .send(Reply::ephemeral("That form is no longer available."))
            .await
        {
            debug!(error = %e, "failed to acknowledge stale resend click");
        }
        return;
    };
    if let Err(e) = ctx.notifier.delete_message(&click.message).await {
        debug!(error = %e, "failed to delete recovery prompt message");
    }
    if let Err(e) = click.responder.open_modal(&modal).await {
        error!(correlation_id = %key, error = %e, "failed to reopen modal");
    }
}
