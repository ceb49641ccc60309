//! Discord adapter: gateway events and slash commands mapped onto the router.

use crate::conversation::ThreadKey;
use crate::error::Result;
use crate::messaging::traits::ReplySink;
use crate::persona::{Mode, Persona};
use crate::router::{Router, context_query};

use anyhow::Context as _;
use async_trait::async_trait;
use serenity::builder::{
    CreateCommand, CreateCommandOption, CreateEmbed, CreateEmbedFooter,
    CreateInteractionResponse, CreateInteractionResponseFollowup,
    CreateInteractionResponseMessage,
};
use serenity::gateway::ActivityData;
use serenity::http::Http;
use serenity::model::application::{
    Command, CommandInteraction, CommandOptionType, CommandType, Interaction, ResolvedValue,
};
use serenity::model::channel::{Message, ReactionType};
use serenity::model::gateway::{GatewayIntents, Ready};
use serenity::model::guild::Member;
use serenity::model::id::ChannelId;
use serenity::model::mention::Mentionable;
use serenity::prelude::*;
use std::sync::Arc;

/// Sidebar colour for embeds.
const EMBED_COLOUR: u32 = 0x8A2BE2;

/// Sends into a channel, as a regular message.
pub struct ChannelSink {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl ChannelSink {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

impl ReplySink for ChannelSink {
    fn describe(&self) -> String {
        format!("channel:{}", self.channel_id)
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.channel_id
            .say(&*self.http, text)
            .await
            .with_context(|| format!("failed to send message to channel {}", self.channel_id))?;
        Ok(())
    }
}

/// Sends followups to a deferred interaction.
pub struct InteractionSink {
    http: Arc<Http>,
    token: String,
    ephemeral: bool,
}

impl InteractionSink {
    pub fn new(http: Arc<Http>, command: &CommandInteraction, ephemeral: bool) -> Self {
        Self {
            http,
            token: command.token.clone(),
            ephemeral,
        }
    }
}

impl ReplySink for InteractionSink {
    fn describe(&self) -> String {
        format!("interaction(ephemeral={})", self.ephemeral)
    }

    async fn send_text(&self, text: String) -> Result<()> {
        let builder = CreateInteractionResponseFollowup::new()
            .content(text)
            .ephemeral(self.ephemeral);
        self.http
            .create_followup_message(&self.token, &builder, Vec::new())
            .await
            .context("failed to send interaction followup")?;
        Ok(())
    }

    /// Replaces the public "thinking" placeholder with an ephemeral followup.
    async fn send_notice(&self, text: String) -> Result<()> {
        if !self.ephemeral
            && let Err(error) = self
                .http
                .delete_original_interaction_response(&self.token)
                .await
        {
            tracing::debug!(%error, "failed to delete deferred response");
        }

        let builder = CreateInteractionResponseFollowup::new()
            .content(text)
            .ephemeral(true);
        self.http
            .create_followup_message(&self.token, &builder, Vec::new())
            .await
            .context("failed to send ephemeral followup")?;
        Ok(())
    }
}

/// Gateway event handler.
pub struct Handler {
    router: Arc<Router>,
}

impl Handler {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    fn persona(&self) -> &Persona {
        &self.router.app().persona
    }

    async fn react_to_triggers(&self, ctx: &Context, message: &Message) {
        let emoji = self
            .router
            .app()
            .reactions
            .pick(&message.content, &mut rand::rng())
            .map(str::to_string);

        let Some(emoji) = emoji else { return };
        if let Err(error) = message
            .react(&ctx.http, ReactionType::Unicode(emoji.clone()))
            .await
        {
            tracing::warn!(%error, %emoji, message_id = %message.id, "failed to add trigger reaction");
        }
    }

    async fn handle_command(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        let key = ThreadKey::new(
            command.guild_id.map(|id| id.get()),
            command.user.id.get(),
        );
        tracing::info!(
            command = %command.data.name,
            thread_key = %key,
            "slash command received"
        );

        if command.data.kind == CommandType::Message {
            return self.handle_context_menu(ctx, command, key).await;
        }

        match command.data.name.as_str() {
            "channel" => {
                let query = string_option(command, "query").unwrap_or_default();
                let mode = if bool_option(command, "ultimate").unwrap_or(false) {
                    Mode::Ultimate
                } else {
                    Mode::Standard
                };
                self.run_query(ctx, command, key, &query, mode).await
            }
            "reveal" => {
                let query = string_option(command, "query").unwrap_or_default();
                self.run_query(ctx, command, key, &query, Mode::Ultimate)
                    .await
            }
            "clear" => {
                command
                    .defer_ephemeral(&ctx.http)
                    .await
                    .context("failed to defer interaction")?;
                let sink = InteractionSink::new(ctx.http.clone(), command, true);
                self.router.handle_clear(key, &sink).await?;
                Ok(())
            }
            "glyph" => {
                let persona = self.persona();
                let text = format!("{}\n\n{}", persona.sentinel, persona.display_name);
                respond(ctx, command, CreateInteractionResponseMessage::new().content(text)).await
            }
            "about" => {
                command
                    .defer(&ctx.http)
                    .await
                    .context("failed to defer interaction")?;
                let sink = InteractionSink::new(ctx.http.clone(), command, false);
                self.router.handle_about(&sink).await
            }
            "help" => {
                let images_enabled = self.router.app().images.is_some();
                let embed = help_embed(self.persona(), images_enabled);
                respond(
                    ctx,
                    command,
                    CreateInteractionResponseMessage::new()
                        .embed(embed)
                        .ephemeral(true),
                )
                .await
            }
            "imagine" => {
                let prompt = string_option(command, "prompt").unwrap_or_default();
                command
                    .defer(&ctx.http)
                    .await
                    .context("failed to defer interaction")?;
                let sink = InteractionSink::new(ctx.http.clone(), command, false);
                self.router.handle_imagine(&prompt, &sink).await?;
                Ok(())
            }
            other => {
                tracing::warn!(command = other, "unknown command");
                Ok(())
            }
        }
    }

    async fn run_query(
        &self,
        ctx: &Context,
        command: &CommandInteraction,
        key: ThreadKey,
        query: &str,
        mode: Mode,
    ) -> Result<()> {
        if query.trim().is_empty() {
            let persona = self.persona();
            return respond(
                ctx,
                command,
                CreateInteractionResponseMessage::new()
                    .content(persona.seal(persona.empty_query_line))
                    .ephemeral(true),
            )
            .await;
        }

        command
            .defer(&ctx.http)
            .await
            .context("failed to defer interaction")?;
        let sink = InteractionSink::new(ctx.http.clone(), command, false);
        self.router.handle_query(key, query.trim(), mode, &sink).await?;
        Ok(())
    }

    async fn handle_context_menu(
        &self,
        ctx: &Context,
        command: &CommandInteraction,
        key: ThreadKey,
    ) -> Result<()> {
        let target = command
            .data
            .resolved
            .messages
            .values()
            .next()
            .map(|message| (message.author.display_name().to_string(), message.content.clone()));

        let Some((author, content)) = target.filter(|(_, content)| !content.trim().is_empty())
        else {
            let persona = self.persona();
            return respond(
                ctx,
                command,
                CreateInteractionResponseMessage::new()
                    .content(persona.seal(persona.empty_query_line))
                    .ephemeral(true),
            )
            .await;
        };

        let query = context_query(&author, &content);
        self.run_query(ctx, command, key, &query, Mode::Standard)
            .await
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(
            user = %ready.user.name,
            guilds = ready.guilds.len(),
            "connected to Discord"
        );

        let persona = self.persona();
        ctx.set_activity(Some(ActivityData::listening(persona.activity)));

        let images_enabled = self.router.app().images.is_some();
        let commands = commands(persona, images_enabled);
        let count = commands.len();
        match Command::set_global_commands(&ctx.http, commands).await {
            Ok(_) => tracing::info!(count, "slash commands registered"),
            Err(error) => tracing::error!(%error, "failed to register slash commands"),
        }
    }

    async fn message(&self, ctx: Context, message: Message) {
        if message.author.bot {
            return;
        }

        self.react_to_triggers(&ctx, &message).await;

        let bot_id = ctx.cache.current_user().id;
        if !message.mentions_user_id(bot_id) {
            return;
        }

        let key = ThreadKey::new(
            message.guild_id.map(|id| id.get()),
            message.author.id.get(),
        );
        let sink = ChannelSink::new(ctx.http.clone(), message.channel_id);

        let typing = message.channel_id.start_typing(&ctx.http);
        let result = self
            .router
            .handle_mention(key.clone(), &message.content, bot_id.get(), &sink)
            .await;
        drop(typing);

        if let Err(error) = result {
            tracing::error!(thread_key = %key, %error, "failed to handle mention");
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };

        if let Err(error) = self.handle_command(&ctx, &command).await {
            tracing::error!(command = %command.data.name, %error, "command failed");
        }
    }

    async fn guild_member_addition(&self, ctx: Context, new_member: Member) {
        if !self.router.app().config.welcome_messages {
            return;
        }

        let channel_id = ctx
            .cache
            .guild(new_member.guild_id)
            .and_then(|guild| guild.system_channel_id);
        let Some(channel_id) = channel_id else {
            tracing::debug!(guild_id = %new_member.guild_id, "no system channel, skipping welcome");
            return;
        };

        let persona = self.persona();
        let text = format!("{} {}", new_member.mention(), persona.seal(persona.welcome_line));
        if let Err(error) = channel_id.say(&ctx.http, text).await {
            tracing::warn!(%error, guild_id = %new_member.guild_id, "failed to send welcome message");
        }
    }
}

/// Slash and context-menu commands to register.
pub fn commands(persona: &Persona, images_enabled: bool) -> Vec<CreateCommand> {
    let mut commands = vec![
        CreateCommand::new("channel")
            .description(format!("Ask the {}", persona.display_name))
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "query", "Your question")
                    .required(true),
            )
            .add_option(CreateCommandOption::new(
                CommandOptionType::Boolean,
                "ultimate",
                "Request a deeper answer",
            )),
        CreateCommand::new("reveal")
            .description("Ask for a deeper answer")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "query", "Your question")
                    .required(true),
            ),
        CreateCommand::new("clear").description("Forget your conversation in this server"),
        CreateCommand::new("glyph").description("Show the sentinel glyph"),
        CreateCommand::new("about").description(format!("Who is the {}?", persona.display_name)),
        CreateCommand::new("help").description("List available commands"),
        CreateCommand::new(format!("Ask {}", persona.short_name)).kind(CommandType::Message),
    ];

    if images_enabled {
        commands.push(
            CreateCommand::new("imagine")
                .description("Generate an image")
                .add_option(
                    CreateCommandOption::new(CommandOptionType::String, "prompt", "What to draw")
                        .required(true),
                ),
        );
    }

    commands
}

fn help_embed(persona: &Persona, images_enabled: bool) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(persona.display_name)
        .description(format!(
            "Mention me with a question, or use the commands below. \
             Right-click a message and choose **Ask {}** to ask about it.",
            persona.short_name
        ))
        .colour(EMBED_COLOUR)
        .field("/channel", "Ask a question (set `ultimate` for a deeper answer)", false)
        .field("/reveal", "Ask for a deeper answer", false)
        .field("/clear", "Forget your conversation in this server", false)
        .field("/about", "Who I am", false)
        .field("/glyph", "Show the sentinel glyph", false);

    if images_enabled {
        embed = embed.field("/imagine", "Generate an image", false);
    }

    embed.footer(CreateEmbedFooter::new(persona.sentinel))
}

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    message: CreateInteractionResponseMessage,
) -> Result<()> {
    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await
        .context("failed to respond to interaction")?;
    Ok(())
}

fn string_option(command: &CommandInteraction, name: &str) -> Option<String> {
    command
        .data
        .options()
        .into_iter()
        .find(|option| option.name == name)
        .and_then(|option| match option.value {
            ResolvedValue::String(value) => Some(value.to_string()),
            _ => None,
        })
}

fn bool_option(command: &CommandInteraction, name: &str) -> Option<bool> {
    command
        .data
        .options()
        .into_iter()
        .find(|option| option.name == name)
        .and_then(|option| match option.value {
            ResolvedValue::Boolean(value) => Some(value),
            _ => None,
        })
}

/// Gateway intents, adding member events only when welcomes are on.
pub fn intents(welcome_messages: bool) -> GatewayIntents {
    let mut intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;
    if welcome_messages {
        intents |= GatewayIntents::GUILD_MEMBERS;
    }
    intents
}

/// Connect to the gateway and run until a shutdown signal closes every shard.
pub async fn run(router: Arc<Router>) -> anyhow::Result<()> {
    let app = router.app();
    let intents = intents(app.config.welcome_messages);

    let mut client = Client::builder(&app.config.discord_token, intents)
        .event_handler(Handler::new(router.clone()))
        .await
        .context("failed to build Discord client")?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        tracing::info!("shutdown signal received, closing Discord shards");
        shard_manager.shutdown_all().await;
    });

    tracing::info!("starting Discord gateway connection");
    client
        .start()
        .await
        .context("Discord client stopped with an error")?;

    tracing::info!("Discord client stopped");
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(error) => {
                tracing::warn!(%error, "failed to install SIGTERM handler, waiting for ctrl-c only");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
