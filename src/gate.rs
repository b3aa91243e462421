//! The interaction gate: every inbound interaction enters here.
//!
//! Routing order is always the same: check the reload lock, resolve the
//! target out of the registry, invoke it with full error containment. While
//! the lock is set nothing is dispatched: commands and components get a
//! short retry message, modal submissions are handed to the recovery buffer
//! so the user's typed values survive the reload.

use crate::context::AppContext;
use crate::ids::CorrelationId;
use crate::platform::{
    CommandInvocation, ComponentClick, Interaction, ModalSubmission, Reply, Responder,
};
use crate::recovery;
use crate::registry::CommandHandler;
use std::sync::Arc;
use tracing::{error, info, warn};

const MSG_RELOADING: &str = "Commands are reloading, try again shortly.";
const MSG_RETRY: &str = "Commands are reloading, please retry shortly.";
const MSG_CAPTURED: &str =
    "A reload is in progress. Your submission was saved and I'll DM you a way to resend it.";
const MSG_MISSING: &str = "That command doesn't exist.";
const MSG_FAILED: &str = "Something went wrong running that command.";

/// Centralized acknowledgment: the responder picks initial reply vs
/// follow-up, and a failed send only ever reaches the log.
pub(crate) async fn acknowledge(responder: &Arc<dyn Responder>, text: &str) {
    if let Err(e) = responder.send(Reply::ephemeral(text)).await {
        error!(error = %e, "failed to acknowledge interaction");
    }
}

/// Route one inbound interaction. Never returns an error and never panics
/// on bad input; the worst outcome is a generic failure message.
pub async fn dispatch(ctx: &Arc<AppContext>, interaction: Interaction) {
    match &interaction {
        Interaction::Command(cmd) => dispatch_command(ctx, &interaction, cmd).await,
        Interaction::Modal(modal) => dispatch_modal(ctx, &interaction, modal).await,
        Interaction::Component(click) => dispatch_component(ctx, &interaction, click).await,
    }
}

async fn dispatch_command(
    ctx: &Arc<AppContext>,
    interaction: &Interaction,
    cmd: &CommandInvocation,
) {
    if ctx.is_locked() && cmd.name != ctx.config.unlock_command {
        info!(command = %cmd.name, user = %cmd.user.name, "locked; command deferred");
        acknowledge(&cmd.responder, MSG_RELOADING).await;
        return;
    }
    let Some(entry) = ctx.commands.get(cmd.audience, &cmd.name) else {
        warn!(command = %cmd.name, audience = %cmd.audience, "unknown command invoked");
        acknowledge(&cmd.responder, MSG_MISSING).await;
        return;
    };
    invoke(ctx, interaction, entry.handler, &cmd.name).await;
}

async fn dispatch_modal(ctx: &Arc<AppContext>, interaction: &Interaction, modal: &ModalSubmission) {
    if ctx.is_locked() {
        ctx.recovery.capture(modal);
        acknowledge(&modal.responder, MSG_CAPTURED).await;
        tokio::spawn(recovery::wait_and_replay(Arc::clone(ctx)));
        return;
    }
    let (audience, command, handler) = match CorrelationId::decode(&modal.custom_id) {
        Ok(CorrelationId::Handler {
            audience,
            command,
            handler,
            ..
        }) => (audience, command, handler),
        Ok(CorrelationId::Recovery { .. }) | Err(_) => {
            warn!(custom_id = %modal.custom_id, "modal submission with unroutable identifier");
            acknowledge(&modal.responder, MSG_FAILED).await;
            return;
        }
    };
    let Some(entry) = ctx.commands.get(audience, &command) else {
        warn!(%command, %audience, "modal for a command that no longer exists");
        acknowledge(&modal.responder, MSG_MISSING).await;
        return;
    };
    let Some(subhandler) = entry.subhandler(&handler) else {
        warn!(%command, %handler, "modal names an unknown sub-handler");
        acknowledge(&modal.responder, MSG_FAILED).await;
        return;
    };
    invoke(ctx, interaction, subhandler, &format!("{command}/{handler}")).await;
}

async fn dispatch_component(
    ctx: &Arc<AppContext>,
    interaction: &Interaction,
    click: &ComponentClick,
) {
    if ctx.is_locked() {
        info!(custom_id = %click.custom_id, "locked; component deferred");
        acknowledge(&click.responder, MSG_RETRY).await;
        return;
    }
    let (audience, command, handler) = match CorrelationId::decode(&click.custom_id) {
        Ok(CorrelationId::Recovery { .. }) => {
            recovery::resend(ctx, click).await;
            return;
        }
        Ok(CorrelationId::Handler {
            audience,
            command,
            handler,
            ..
        }) => (audience, command, handler),
        Err(e) => {
            warn!(custom_id = %click.custom_id, error = %e, "component with unroutable identifier");
            acknowledge(&click.responder, MSG_FAILED).await;
            return;
        }
    };
    let Some(entry) = ctx.commands.get(audience, &command) else {
        warn!(%command, %audience, "component for a command that no longer exists");
        acknowledge(&click.responder, MSG_MISSING).await;
        return;
    };
    let Some(subhandler) = entry.subhandler(&handler) else {
        warn!(%command, %handler, "component names an unknown sub-handler");
        acknowledge(&click.responder, MSG_FAILED).await;
        return;
    };
    invoke(ctx, interaction, subhandler, &format!("{command}/{handler}")).await;
}

/// Invoke one handler with containment: an error is logged and reported to
/// the user as a generic failure, never propagated.
async fn invoke(
    ctx: &Arc<AppContext>,
    interaction: &Interaction,
    handler: CommandHandler,
    label: &str,
) {
    if let Err(e) = handler(ctx, interaction).await {
        error!(handler = %label, error = %e, "handler failed");
        acknowledge(interaction.responder(), MSG_FAILED).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::platform::UserRef;
    use crate::registry::{Audience, CommandEntry, CommandSchema, HandlerFuture};
    use crate::test_utils::{RecordingResponder, test_context};
    use std::collections::HashMap;

    fn entry(name: &str, handler: CommandHandler) -> CommandEntry {
        CommandEntry::for_test(
            CommandSchema {
                name: name.to_string(),
                description: format!("{name} test command"),
                options: Vec::new(),
            },
            handler,
            HashMap::new(),
        )
    }

    fn entry_with_sub(name: &str, sub: &str, handler: CommandHandler) -> CommandEntry {
        let mut subhandlers = HashMap::new();
        subhandlers.insert(sub.to_string(), handler);
        CommandEntry::for_test(
            CommandSchema {
                name: name.to_string(),
                description: format!("{name} test command"),
                options: Vec::new(),
            },
            handler,
            subhandlers,
        )
    }

    fn pong<'a>(_: &'a AppContext, interaction: &'a Interaction) -> HandlerFuture<'a> {
        Box::pin(async move {
            interaction.responder().send(Reply::plain("Pong!")).await?;
            Ok(())
        })
    }

    fn failing<'a>(_: &'a AppContext, _: &'a Interaction) -> HandlerFuture<'a> {
        Box::pin(async { Err(Error::Dispatch("handler exploded".to_string())) })
    }

    fn command(name: &str, responder: &Arc<RecordingResponder>) -> Interaction {
        Interaction::Command(CommandInvocation {
            audience: Audience::Production,
            name: name.to_string(),
            user: UserRef {
                id: 9,
                name: "tester".to_string(),
            },
            options: HashMap::new(),
            responder: Arc::clone(responder) as Arc<dyn Responder>,
        })
    }

    fn modal(custom_id: &str, responder: &Arc<RecordingResponder>) -> Interaction {
        Interaction::Modal(ModalSubmission {
            custom_id: custom_id.to_string(),
            user: UserRef {
                id: 9,
                name: "tester".to_string(),
            },
            fields: vec![("a".to_string(), "1".to_string())],
            responder: Arc::clone(responder) as Arc<dyn Responder>,
        })
    }

    fn component(custom_id: &str, responder: &Arc<RecordingResponder>) -> Interaction {
        Interaction::Component(ComponentClick {
            custom_id: custom_id.to_string(),
            user: UserRef {
                id: 9,
                name: "tester".to_string(),
            },
            message: crate::platform::MessageRef {
                channel_id: 1,
                message_id: 2,
            },
            responder: Arc::clone(responder) as Arc<dyn Responder>,
        })
    }

    #[tokio::test]
    async fn locked_command_gets_one_reload_ack_and_no_handler_call() {
        let (ctx, _harness) = test_context().await;
        ctx.commands.insert_for_test(Audience::Production, entry("ping", pong));
        ctx.set_locked(true);

        let responder = Arc::new(RecordingResponder::new());
        dispatch(&ctx, command("ping", &responder)).await;

        let replies = responder.replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].content.contains("reloading"));
        assert!(replies[0].ephemeral);
    }

    #[tokio::test]
    async fn unlock_command_passes_the_lock() {
        let (ctx, _harness) = test_context().await;
        ctx.commands.insert_for_test(Audience::Production, entry("unlock", pong));
        ctx.set_locked(true);

        let responder = Arc::new(RecordingResponder::new());
        dispatch(&ctx, command("unlock", &responder)).await;

        let replies = responder.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].content, "Pong!");
    }

    #[tokio::test]
    async fn unlocked_command_dispatches_to_handler() {
        let (ctx, _harness) = test_context().await;
        ctx.commands.insert_for_test(Audience::Production, entry("ping", pong));

        let responder = Arc::new(RecordingResponder::new());
        dispatch(&ctx, command("ping", &responder)).await;
        assert_eq!(responder.replies()[0].content, "Pong!");
    }

    #[tokio::test]
    async fn unknown_command_reports_missing() {
        let (ctx, _harness) = test_context().await;
        let responder = Arc::new(RecordingResponder::new());
        dispatch(&ctx, command("ghost", &responder)).await;
        assert!(responder.replies()[0].content.contains("doesn't exist"));
    }

    #[tokio::test]
    async fn handler_error_is_contained_and_reported_generically() {
        let (ctx, _harness) = test_context().await;
        ctx.commands
            .insert_for_test(Audience::Production, entry("broken", failing));

        let responder = Arc::new(RecordingResponder::new());
        dispatch(&ctx, command("broken", &responder)).await;

        let replies = responder.replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].content.contains("Something went wrong"));
        // The raw error never reaches the user.
        assert!(!replies[0].content.contains("exploded"));
    }

    #[tokio::test]
    async fn locked_modal_is_captured_not_dispatched() {
        let (ctx, _harness) = test_context().await;
        ctx.commands
            .insert_for_test(Audience::Production, entry_with_sub("order", "submit", pong));
        ctx.set_locked(true);

        let responder = Arc::new(RecordingResponder::new());
        dispatch(&ctx, modal("v1|handler|production|order|submit", &responder)).await;

        assert_eq!(ctx.recovery.captured_count(), 1);
        let replies = responder.replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].content.contains("saved"));
        ctx.set_locked(false);
    }

    #[tokio::test]
    async fn unlocked_modal_routes_to_subhandler() {
        let (ctx, _harness) = test_context().await;
        ctx.commands
            .insert_for_test(Audience::Production, entry_with_sub("order", "submit", pong));

        let responder = Arc::new(RecordingResponder::new());
        dispatch(&ctx, modal("v1|handler|production|order|submit", &responder)).await;
        assert_eq!(responder.replies()[0].content, "Pong!");
        assert_eq!(ctx.recovery.captured_count(), 0);
    }

    #[tokio::test]
    async fn modal_with_garbage_identifier_fails_gracefully() {
        let (ctx, _harness) = test_context().await;
        let responder = Arc::new(RecordingResponder::new());
        dispatch(&ctx, modal("not-a-correlation-id", &responder)).await;
        assert!(responder.replies()[0].content.contains("Something went wrong"));
    }

    #[tokio::test]
    async fn modal_for_unknown_subhandler_fails_gracefully() {
        let (ctx, _harness) = test_context().await;
        ctx.commands
            .insert_for_test(Audience::Production, entry_with_sub("order", "submit", pong));
        let responder = Arc::new(RecordingResponder::new());
        dispatch(&ctx, modal("v1|handler|production|order|nope", &responder)).await;
        assert!(responder.replies()[0].content.contains("Something went wrong"));
    }

    #[tokio::test]
    async fn locked_component_gets_retry_ack() {
        let (ctx, _harness) = test_context().await;
        ctx.commands
            .insert_for_test(Audience::Production, entry_with_sub("order", "claim", pong));
        ctx.set_locked(true);

        let responder = Arc::new(RecordingResponder::new());
        dispatch(&ctx, component("v1|handler|production|order|claim", &responder)).await;
        assert!(responder.replies()[0].content.contains("retry shortly"));
        ctx.set_locked(false);
    }

    #[tokio::test]
    async fn component_routes_to_subhandler() {
        let (ctx, _harness) = test_context().await;
        ctx.commands
            .insert_for_test(Audience::Production, entry_with_sub("order", "claim", pong));

        let responder = Arc::new(RecordingResponder::new());
        dispatch(&ctx, component("v1|handler|production|order|claim", &responder)).await;
        assert_eq!(responder.replies()[0].content, "Pong!");
    }
}
