//! Conversation threads, their persistence, and prompt assembly.

pub mod context;
pub mod history;
pub mod store;

pub use context::build_prompt;
pub use history::{Role, Thread, ThreadKey, Turn};
pub use store::ThreadStore;
