use super::expect_command;
use crate::context::AppContext;
use crate::platform::{Interaction, Reply};
use crate::registry::HandlerFuture;
use tracing::info;

/// A simple ping command to check that the bot is responsive.
pub fn ping<'a>(_ctx: &'a AppContext, interaction: &'a Interaction) -> HandlerFuture<'a> {
    Box::pin(async move {
        let cmd = expect_command(interaction)?;
        info!("Ping command received from user: {}", cmd.user.name);
        cmd.responder.send(Reply::plain("Pong!")).await?;
        Ok(())
    })
}

/// List the commands currently loaded for this audience, with their help
/// text where the definition provides one.
pub fn help<'a>(ctx: &'a AppContext, interaction: &'a Interaction) -> HandlerFuture<'a> {
    Box::pin(async move {
        let cmd = expect_command(interaction)?;
        let mut lines = vec![format!("Commands ({}):", cmd.audience)];
        for name in ctx.commands.names(cmd.audience) {
            let Some(entry) = ctx.commands.get(cmd.audience, &name) else {
                continue;
            };
            match &entry.help {
                Some(help) => lines.push(format!("/{name}: {help}")),
                None => lines.push(format!("/{name}: {}", entry.schema.description)),
            }
        }
        cmd.responder
            .send(Reply::ephemeral(lines.join("\n")))
            .await?;
        Ok(())
    })
}

/// Clear the reload lock. Admin-only; this is the one command the gate lets
/// through while the lock is set, so a wedged reload can always be cleared
/// by hand.
pub fn unlock<'a>(ctx: &'a AppContext, interaction: &'a Interaction) -> HandlerFuture<'a> {
    Box::pin(async move {
        let cmd = expect_command(interaction)?;
        if !ctx.is_admin(cmd.user.id) {
            cmd.responder
                .send(Reply::ephemeral("You don't have permission to do that."))
                .await?;
            return Ok(());
        }
        let was_locked = ctx.is_locked();
        ctx.set_locked(false);
        info!(user = %cmd.user.name, was_locked, "reload lock cleared by operator");
        cmd.responder
            .send(Reply::ephemeral(if was_locked {
                "Reload lock cleared."
            } else {
                "The reload lock was not set."
            }))
            .await?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{CommandInvocation, Responder, UserRef};
    use crate::registry::Audience;
    use crate::test_utils::{RecordingResponder, test_context};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn invocation(name: &str, user_id: u64, responder: &Arc<RecordingResponder>) -> Interaction {
        Interaction::Command(CommandInvocation {
            audience: Audience::Production,
            name: name.to_string(),
            user: UserRef {
                id: user_id,
                name: format!("user-{user_id}"),
            },
            options: HashMap::new(),
            responder: Arc::clone(responder) as Arc<dyn Responder>,
        })
    }

    #[tokio::test]
    async fn ping_replies_pong() {
        let (ctx, _harness) = test_context().await;
        let responder = Arc::new(RecordingResponder::new());
        ping(&ctx, &invocation("ping", 1, &responder)).await.unwrap();
        assert_eq!(responder.replies()[0].content, "Pong!");
    }

    #[tokio::test]
    async fn unlock_requires_admin() {
        let (ctx, _harness) = test_context().await;
        ctx.set_locked(true);

        let responder = Arc::new(RecordingResponder::new());
        unlock(&ctx, &invocation("unlock", 9999, &responder))
            .await
            .unwrap();
        assert!(ctx.is_locked());
        assert!(responder.replies()[0].content.contains("permission"));

        // 42 is the admin id wired up by the test context.
        let responder = Arc::new(RecordingResponder::new());
        unlock(&ctx, &invocation("unlock", 42, &responder))
            .await
            .unwrap();
        assert!(!ctx.is_locked());
        assert!(responder.replies()[0].content.contains("cleared"));
    }
}
