//! Outbound messaging and the Discord adapter.

pub mod discord;
pub mod dispatch;
pub mod reactions;
pub mod traits;

pub use dispatch::Dispatcher;
pub use reactions::TriggerReactions;
pub use traits::ReplySink;
