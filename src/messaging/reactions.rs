//! Ambient emoji reactions to messages that mention a trigger word.

use crate::config::ReactionConfig;
use crate::persona::Persona;

use rand::Rng;
use rand::seq::IndexedRandom;

#[derive(Debug, Clone)]
pub struct TriggerReactions {
    words: Vec<String>,
    emojis: Vec<String>,
    chance: f64,
}

impl TriggerReactions {
    pub fn new(words: Vec<String>, emojis: Vec<String>, chance: f64) -> Self {
        Self {
            words: words.into_iter().map(|word| word.to_lowercase()).collect(),
            emojis,
            chance: chance.clamp(0.0, 1.0),
        }
    }

    /// Configured words win over the persona's defaults.
    pub fn from_config(config: &ReactionConfig, persona: &Persona) -> Self {
        let words = config.trigger_words.clone().unwrap_or_else(|| {
            persona
                .default_trigger_words
                .iter()
                .map(|word| word.to_string())
                .collect()
        });
        let emojis = persona
            .reaction_emojis
            .iter()
            .map(|emoji| emoji.to_string())
            .collect();
        Self::new(words, emojis, config.chance)
    }

    pub fn is_enabled(&self) -> bool {
        !self.words.is_empty() && !self.emojis.is_empty() && self.chance > 0.0
    }

    /// Whole-word match; phrases containing spaces match as substrings.
    pub fn is_triggered(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .collect();

        self.words.iter().any(|word| {
            if word.contains(' ') {
                lower.contains(word.as_str())
            } else {
                tokens.contains(&word.as_str())
            }
        })
    }

    /// Emoji to react with, or `None` when nothing triggered or the roll failed.
    pub fn pick<R: Rng>(&self, text: &str, rng: &mut R) -> Option<&str> {
        if !self.is_enabled() || !self.is_triggered(text) {
            return None;
        }
        if !rng.random_bool(self.chance) {
            return None;
        }
        self.emojis.choose(rng).map(String::as_str)
    }
}
