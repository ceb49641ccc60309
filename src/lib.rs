//! Overmind: a Discord oracle bot that answers through a hosted chat-completion model.

pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod messaging;
pub mod persona;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};

use crate::config::Config;
use crate::conversation::ThreadStore;
use crate::llm::{CompletionClient, ImageClient};
use crate::messaging::{Dispatcher, TriggerReactions};
use crate::persona::Persona;

/// Process-wide application context, built once at startup and shared
/// with every event handler.
#[derive(Debug)]
pub struct App {
    pub config: Config,
    pub persona: Persona,
    pub store: ThreadStore,
    pub completions: CompletionClient,
    /// `None` when no image provider key is configured.
    pub images: Option<ImageClient>,
    pub dispatcher: Dispatcher,
    pub reactions: TriggerReactions,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let http_client = llm::build_http_client()?;
        let persona = Persona::new(config.persona);

        let store = ThreadStore::load(&config.history.path, config.history.max_turns());
        let completions = CompletionClient::new(http_client.clone(), &config.completion);
        let images = config
            .image
            .as_ref()
            .map(|image| ImageClient::new(http_client, image));
        let dispatcher = Dispatcher::new(persona.sentinel, config.dispatch.message_limit);
        let reactions = TriggerReactions::from_config(&config.reactions, &persona);

        tracing::info!(
            persona = persona.display_name,
            model = completions.model(),
            images = images.is_some(),
            max_turns = store.max_turns(),
            "application context ready"
        );

        Ok(Self {
            config,
            persona,
            store,
            completions,
            images,
            dispatcher,
            reactions,
        })
    }
}
