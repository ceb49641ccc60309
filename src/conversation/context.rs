//! Prompt assembly: persona system message followed by the thread.

use crate::conversation::history::{Thread, Turn};
use crate::persona::{Mode, Persona};

/// Build the message list sent to the completion provider.
///
/// The thread is already trimmed, so every turn is included verbatim.
pub fn build_prompt(persona: &Persona, mode: Mode, thread: &Thread) -> Vec<Turn> {
    let mut messages = Vec::with_capacity(thread.len() + 1);
    messages.push(Turn::system(persona.system_prompt(mode)));
    messages.extend(thread.turns().iter().cloned());
    messages
}
