//! serenity-backed implementations of the platform capability traits.

use crate::errors::Result;
use crate::platform::{
    CommandPublisher, MessageRef, ModalDefinition, Notifier, Reply, Responder, UserProfile,
};
use crate::registry::{Audience, CommandSchema, OptionKind};
use async_trait::async_trait;
use serenity::builder::{
    CreateActionRow, CreateButton, CreateCommand, CreateCommandOption, CreateInputText,
    CreateInteractionResponse, CreateInteractionResponseFollowup, CreateInteractionResponseMessage,
    CreateMessage, CreateModal, EditInteractionResponse,
};
use serenity::http::Http;
use serenity::model::application::{
    ButtonStyle, CommandInteraction, CommandOptionType, ComponentInteraction, InputTextStyle,
    ModalInteraction,
};
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The interaction a [`DiscordResponder`] answers to.
pub enum ResponderTarget {
    Command(CommandInteraction),
    Modal(ModalInteraction),
    Component(ComponentInteraction),
}

/// Per-interaction reply channel. Tracks acknowledgment so the first `send`
/// becomes the interaction response and later ones become follow-ups.
pub struct DiscordResponder {
    http: Arc<Http>,
    target: ResponderTarget,
    acked: AtomicBool,
}

impl DiscordResponder {
    pub fn new(http: Arc<Http>, target: ResponderTarget) -> Self {
        Self {
            http,
            target,
            acked: AtomicBool::new(false),
        }
    }

    async fn respond(&self, response: CreateInteractionResponse) -> Result<()> {
        match &self.target {
            ResponderTarget::Command(i) => i.create_response(&self.http, response).await?,
            ResponderTarget::Modal(i) => i.create_response(&self.http, response).await?,
            ResponderTarget::Component(i) => i.create_response(&self.http, response).await?,
        }
        Ok(())
    }

    async fn follow_up(&self, follow_up: CreateInteractionResponseFollowup) -> Result<()> {
        match &self.target {
            ResponderTarget::Command(i) => {
                i.create_followup(&self.http, follow_up).await?;
            }
            ResponderTarget::Modal(i) => {
                i.create_followup(&self.http, follow_up).await?;
            }
            ResponderTarget::Component(i) => {
                i.create_followup(&self.http, follow_up).await?;
            }
        }
        Ok(())
    }
}

fn button_rows(reply: &Reply) -> Vec<CreateActionRow> {
    if reply.buttons.is_empty() {
        return Vec::new();
    }
    let buttons = reply
        .buttons
        .iter()
        .map(|b| {
            CreateButton::new(b.custom_id.clone())
                .label(b.label.clone())
                .style(ButtonStyle::Primary)
        })
        .collect();
    vec![CreateActionRow::Buttons(buttons)]
}

fn modal_rows(modal: &ModalDefinition) -> Vec<CreateActionRow> {
    modal
        .fields
        .iter()
        .map(|field| {
            let style = if field.paragraph {
                InputTextStyle::Paragraph
            } else {
                InputTextStyle::Short
            };
            let mut input = CreateInputText::new(style, field.label.clone(), field.id.clone())
                .required(field.required);
            if let Some(value) = &field.value {
                input = input.value(value.clone());
            }
            CreateActionRow::InputText(input)
        })
        .collect()
}

#[async_trait]
impl Responder for DiscordResponder {
    async fn send(&self, reply: Reply) -> Result<()> {
        if self.acked.swap(true, Ordering::SeqCst) {
            let mut follow_up = CreateInteractionResponseFollowup::new()
                .content(reply.content.clone())
                .ephemeral(reply.ephemeral);
            let rows = button_rows(&reply);
            if !rows.is_empty() {
                follow_up = follow_up.components(rows);
            }
            self.follow_up(follow_up).await
        } else {
            let mut message = CreateInteractionResponseMessage::new()
                .content(reply.content.clone())
                .ephemeral(reply.ephemeral);
            let rows = button_rows(&reply);
            if !rows.is_empty() {
                message = message.components(rows);
            }
            self.respond(CreateInteractionResponse::Message(message)).await
        }
    }

    async fn defer(&self) -> Result<()> {
        if self.acked.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.respond(CreateInteractionResponse::Defer(
            CreateInteractionResponseMessage::new().ephemeral(true),
        ))
        .await
    }

    async fn edit(&self, reply: Reply) -> Result<()> {
        let mut edit = EditInteractionResponse::new().content(reply.content.clone());
        let rows = button_rows(&reply);
        if !rows.is_empty() {
            edit = edit.components(rows);
        }
        match &self.target {
            ResponderTarget::Command(i) => {
                i.edit_response(&self.http, edit).await?;
            }
            ResponderTarget::Modal(i) => {
                i.edit_response(&self.http, edit).await?;
            }
            ResponderTarget::Component(i) => {
                i.edit_response(&self.http, edit).await?;
            }
        }
        Ok(())
    }

    async fn open_modal(&self, modal: &ModalDefinition) -> Result<()> {
        self.acked.store(true, Ordering::SeqCst);
        self.respond(CreateInteractionResponse::Modal(
            CreateModal::new(modal.custom_id.clone(), modal.title.clone())
                .components(modal_rows(modal)),
        ))
        .await
    }
}

pub struct DiscordNotifier {
    http: Arc<Http>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn direct_message(&self, user_id: u64, reply: Reply) -> Result<MessageRef> {
        let channel = UserId::new(user_id).create_dm_channel(&self.http).await?;
        let mut message = CreateMessage::new().content(reply.content.clone());
        let rows = button_rows(&reply);
        if !rows.is_empty() {
            message = message.components(rows);
        }
        let sent = channel.id.send_message(&self.http, message).await?;
        Ok(MessageRef {
            channel_id: sent.channel_id.get(),
            message_id: sent.id.get(),
        })
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<()> {
        ChannelId::new(message.channel_id)
            .delete_message(&self.http, MessageId::new(message.message_id))
            .await?;
        Ok(())
    }

    async fn fetch_user(&self, user_id: u64) -> Result<UserProfile> {
        let user = UserId::new(user_id).to_user(&self.http).await?;
        Ok(UserProfile {
            id: user.id.get(),
            username: user.name.clone(),
        })
    }
}

/// Guild-scoped bulk command replacement.
pub struct DiscordPublisher {
    http: Arc<Http>,
    production_guild: GuildId,
    development_guild: GuildId,
}

impl DiscordPublisher {
    pub fn new(http: Arc<Http>, production_guild: u64, development_guild: u64) -> Self {
        Self {
            http,
            production_guild: GuildId::new(production_guild),
            development_guild: GuildId::new(development_guild),
        }
    }

    fn guild(&self, audience: Audience) -> GuildId {
        match audience {
            Audience::Production => self.production_guild,
            Audience::Development => self.development_guild,
        }
    }
}

fn to_create_command(schema: &CommandSchema) -> CreateCommand {
    let mut command = CreateCommand::new(schema.name.clone()).description(schema.description.clone());
    for option in &schema.options {
        let kind = match option.kind {
            OptionKind::String => CommandOptionType::String,
            OptionKind::Integer => CommandOptionType::Integer,
            OptionKind::Boolean => CommandOptionType::Boolean,
            OptionKind::Number => CommandOptionType::Number,
        };
        command = command.add_option(
            CreateCommandOption::new(kind, option.name.clone(), option.description.clone())
                .required(option.required),
        );
    }
    command
}

#[async_trait]
impl CommandPublisher for DiscordPublisher {
    async fn replace_commands(
        &self,
        audience: Audience,
        schemas: Vec<CommandSchema>,
    ) -> Result<()> {
        let commands: Vec<CreateCommand> = schemas.iter().map(to_create_command).collect();
        self.guild(audience)
            .set_commands(&self.http, commands)
            .await?;
        Ok(())
    }
}
