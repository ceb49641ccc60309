//! Response dispatch: mention neutralization, sentinel sealing, chunking.

use crate::error::Result;
use crate::messaging::traits::ReplySink;

use regex::Regex;
use std::sync::LazyLock;

static MENTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@(everyone|here|[!&]?[0-9]{17,20})").expect("hardcoded mention regex")
});

const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Prepares model output for a chat platform and sends it in order.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    sentinel: String,
    limit: usize,
}

impl Dispatcher {
    pub fn new(sentinel: impl Into<String>, limit: usize) -> Self {
        Self {
            sentinel: sentinel.into(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The messages `send` would produce for `text`.
    pub fn prepare(&self, text: &str) -> Vec<String> {
        let neutralized = neutralize_mentions(text);
        let sealed = seal(&neutralized, &self.sentinel);

        if sealed.chars().count() <= self.limit {
            return vec![sealed];
        }

        split_paragraphs(&sealed, self.limit)
    }

    /// Send `text` as one or more messages, each awaited before the next.
    pub async fn send(&self, sink: &impl ReplySink, text: &str) -> Result<()> {
        let chunks = self.prepare(text);
        let total = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            tracing::trace!(
                target_sink = %sink.describe(),
                chunk = index + 1,
                total,
                "sending reply chunk"
            );
            sink.send_text(chunk).await?;
        }

        Ok(())
    }
}

/// Break `@everyone`, `@here` and user/role mentions with a zero-width space.
pub fn neutralize_mentions(text: &str) -> String {
    MENTION_REGEX
        .replace_all(text, "@\u{200b}$1")
        .into_owned()
}

/// Append the sentinel as its own paragraph unless the text already ends with it.
fn seal(text: &str, sentinel: &str) -> String {
    let trimmed = text.trim_end();
    if sentinel.is_empty() || trimmed.ends_with(sentinel) {
        trimmed.to_string()
    } else if trimmed.is_empty() {
        sentinel.to_string()
    } else {
        format!("{trimmed}{PARAGRAPH_SEPARATOR}{sentinel}")
    }
}

/// Greedily pack blank-line separated paragraphs into chunks of at most
/// `limit` characters. Oversized paragraphs are wrapped at whitespace.
pub fn split_paragraphs(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for paragraph in text
        .split(PARAGRAPH_SEPARATOR)
        .filter(|paragraph| !paragraph.trim().is_empty())
    {
        let paragraph_len = paragraph.chars().count();

        if paragraph_len > limit {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let mut pieces = wrap_paragraph(paragraph, limit);
            // The tail of a wrapped paragraph can still share a chunk with what follows.
            current = pieces.pop().unwrap_or_default();
            current_len = current.chars().count();
            chunks.extend(pieces);
            continue;
        }

        let joined_len = if current.is_empty() {
            paragraph_len
        } else {
            current_len + PARAGRAPH_SEPARATOR.len() + paragraph_len
        };

        if joined_len > limit {
            chunks.push(std::mem::take(&mut current));
            current.push_str(paragraph);
            current_len = paragraph_len;
        } else {
            if !current.is_empty() {
                current.push_str(PARAGRAPH_SEPARATOR);
            }
            current.push_str(paragraph);
            current_len = joined_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Hard-wrap one paragraph at whitespace. A single word longer than
/// `limit` is cut on a character boundary.
fn wrap_paragraph(paragraph: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut remaining = paragraph.trim();

    while remaining.chars().count() > limit {
        let boundary = remaining
            .char_indices()
            .nth(limit)
            .map(|(index, _)| index)
            .unwrap_or(remaining.len());
        let window = &remaining[..boundary];

        let split_at = window
            .rfind(char::is_whitespace)
            .filter(|&index| index > 0)
            .unwrap_or(boundary);

        pieces.push(remaining[..split_at].trim_end().to_string());
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() {
        pieces.push(remaining.to_string());
    }

    pieces
}
