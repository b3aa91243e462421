//! Discord layer: serenity client setup and translation of raw gateway
//! interactions into the normalized model the gate dispatches.

pub mod notifier;

use crate::config::AppConfig;
use crate::context::AppContext;
use crate::db::DbPool;
use crate::errors::Result;
use crate::gate;
use crate::platform::{
    CommandInvocation, ComponentClick, Interaction as Inbound, MessageRef, ModalSubmission,
    OptionValue, UserRef,
};
use crate::registry::Audience;
use crate::reload::watcher;
use crate::schedule::runner;
use notifier::{DiscordNotifier, DiscordPublisher, DiscordResponder, ResponderTarget};
use serenity::async_trait;
use serenity::model::application::{
    ActionRowComponent, CommandDataOptionValue, CommandInteraction, ComponentInteraction,
    Interaction, ModalInteraction,
};
use serenity::model::gateway::Ready;
use serenity::model::id::GuildId;
use serenity::prelude::{Client, Context as SerenityContext, EventHandler, GatewayIntents, TypeMapKey};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

struct ContextKey;

impl TypeMapKey for ContextKey {
    type Value = Arc<AppContext>;
}

async fn app_context(ctx: &SerenityContext) -> Option<Arc<AppContext>> {
    let data = ctx.data.read().await;
    let app = data.get::<ContextKey>().cloned();
    if app.is_none() {
        error!("application context missing from client data");
    }
    app
}

fn audience_for_guild(config: &AppConfig, guild_id: Option<GuildId>) -> Option<Audience> {
    let id = guild_id?.get();
    Audience::ALL
        .into_iter()
        .find(|audience| config.guild_id(*audience) == id)
}

fn normalize_command(
    app: &AppContext,
    http: Arc<serenity::http::Http>,
    interaction: CommandInteraction,
) -> Option<Inbound> {
    let Some(audience) = audience_for_guild(&app.config, interaction.guild_id) else {
        warn!(
            command = %interaction.data.name,
            guild = ?interaction.guild_id,
            "command from an unrecognized guild"
        );
        return None;
    };
    let mut options = std::collections::HashMap::new();
    for option in &interaction.data.options {
        let value = match &option.value {
            CommandDataOptionValue::String(s) => OptionValue::String(s.clone()),
            CommandDataOptionValue::Integer(i) => OptionValue::Integer(*i),
            CommandDataOptionValue::Boolean(b) => OptionValue::Boolean(*b),
            CommandDataOptionValue::Number(f) => OptionValue::Number(*f),
            _ => continue,
        };
        options.insert(option.name.clone(), value);
    }
    let user = UserRef {
        id: interaction.user.id.get(),
        name: interaction.user.name.clone(),
    };
    let name = interaction.data.name.clone();
    let responder = Arc::new(DiscordResponder::new(
        http,
        ResponderTarget::Command(interaction),
    ));
    Some(Inbound::Command(CommandInvocation {
        audience,
        name,
        user,
        options,
        responder,
    }))
}

fn normalize_modal(http: Arc<serenity::http::Http>, interaction: ModalInteraction) -> Inbound {
    let mut fields = Vec::new();
    for row in &interaction.data.components {
        for component in &row.components {
            if let ActionRowComponent::InputText(input) = component {
                fields.push((
                    input.custom_id.clone(),
                    input.value.clone().unwrap_or_default(),
                ));
            }
        }
    }
    let user = UserRef {
        id: interaction.user.id.get(),
        name: interaction.user.name.clone(),
    };
    let custom_id = interaction.data.custom_id.clone();
    let responder = Arc::new(DiscordResponder::new(
        http,
        ResponderTarget::Modal(interaction),
    ));
    Inbound::Modal(ModalSubmission {
        custom_id,
        user,
        fields,
        responder,
    })
}

fn normalize_component(
    http: Arc<serenity::http::Http>,
    interaction: ComponentInteraction,
) -> Inbound {
    let user = UserRef {
        id: interaction.user.id.get(),
        name: interaction.user.name.clone(),
    };
    let custom_id = interaction.data.custom_id.clone();
    let message = MessageRef {
        channel_id: interaction.message.channel_id.get(),
        message_id: interaction.message.id.get(),
    };
    let responder = Arc::new(DiscordResponder::new(
        http,
        ResponderTarget::Component(interaction),
    ));
    Inbound::Component(ComponentClick {
        custom_id,
        user,
        message,
        responder,
    })
}

struct Handler;

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: SerenityContext, ready: Ready) {
        info!("Logged in as {}", ready.user.name);
        let Some(app) = app_context(&ctx).await else {
            return;
        };
        // Idempotent bulk replace; safe to repeat on gateway reconnects.
        for audience in Audience::ALL {
            let schemas = app.commands.schemas(audience);
            info!(%audience, commands = schemas.len(), "publishing command surface");
            if let Err(e) = app.publisher.replace_commands(audience, schemas).await {
                error!(%audience, error = %e, "initial command publish failed");
            }
        }
    }

    async fn interaction_create(&self, ctx: SerenityContext, interaction: Interaction) {
        let Some(app) = app_context(&ctx).await else {
            return;
        };
        let http = Arc::clone(&ctx.http);
        let inbound = match interaction {
            Interaction::Command(cmd) => {
                let Some(inbound) = normalize_command(&app, http, cmd) else {
                    return;
                };
                inbound
            }
            Interaction::Modal(modal) => normalize_modal(http, modal),
            Interaction::Component(component) => normalize_component(http, component),
            _ => return,
        };
        gate::dispatch(&app, inbound).await;
    }
}

/// Build the client, wire the application context, start the background
/// drivers, and run until the gateway connection ends.
#[instrument(skip(token, app_config, db_pool))]
pub async fn run_bot(token: String, app_config: AppConfig, db_pool: DbPool) -> Result<()> {
    // Slash commands, components, and modals arrive without privileged
    // intents; GUILDS keeps guild metadata warm for command publishing.
    let intents = GatewayIntents::GUILDS | GatewayIntents::DIRECT_MESSAGES;

    info!("Setting up Serenity client...");
    let mut client = Client::builder(&token, intents)
        .event_handler(Handler)
        .await?;

    let http = Arc::clone(&client.http);
    let notifier = Arc::new(DiscordNotifier::new(Arc::clone(&http)));
    let publisher = Arc::new(DiscordPublisher::new(
        http,
        app_config.audiences.production.guild_id,
        app_config.audiences.development.guild_id,
    ));
    let ctx = Arc::new(AppContext::new(app_config, notifier, publisher, db_pool));

    watcher::ensure_roots(&ctx)?;
    ctx.load_all_definitions();
    {
        let mut data = client.data.write().await;
        data.insert::<ContextKey>(Arc::clone(&ctx));
    }

    let _runner = runner::spawn(Arc::clone(&ctx));
    let _watcher = watcher::spawn(Arc::clone(&ctx))?;

    info!("Starting bot client...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
        return Err(why.into());
    }
    Ok(())
}
