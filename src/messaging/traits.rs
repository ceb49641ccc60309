//! Reply sink trait: the only thing the core needs from a chat platform.

use crate::error::Result;

use std::future::Future;

/// Somewhere text replies can be sent, in order.
pub trait ReplySink: Send + Sync {
    /// Short label for logs.
    fn describe(&self) -> String;

    /// Send one platform message. Callers keep it within the size limit.
    fn send_text(&self, text: String) -> impl Future<Output = Result<()>> + Send;

    /// Send a canned status line (failure, empty query). Sinks that can
    /// show it only to the invoking user override this.
    fn send_notice(&self, text: String) -> impl Future<Output = Result<()>> + Send {
        self.send_text(text)
    }
}
