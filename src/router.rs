//! Event routing: turns platform events into thread updates and replies.
//!
//! Each exchange holds the thread's key lock from load to commit, so
//! concurrent invocations by the same user in the same guild serialize.
//! A failed completion commits nothing: the user turn only enters the
//! thread together with its answer.

use crate::App;
use crate::conversation::{ThreadKey, Turn, build_prompt};
use crate::error::{ApiError, Result};
use crate::llm::image::ImageRequest;
use crate::messaging::ReplySink;
use crate::persona::Mode;

use std::sync::Arc;

/// What happened to one invocation.
#[derive(Debug)]
pub enum Outcome {
    /// Model answered and the exchange was recorded.
    Replied,
    /// Mention carried no query; the prompt line was sent.
    EmptyQuery,
    /// Provider failed; the failure line was sent and nothing was recorded.
    Failed(ApiError),
    /// The requested feature has no provider configured.
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct Router {
    app: Arc<App>,
}

impl Router {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    /// Handle a message that mentions the bot.
    pub async fn handle_mention(
        &self,
        key: ThreadKey,
        content: &str,
        bot_id: u64,
        sink: &impl ReplySink,
    ) -> Result<Outcome> {
        let query = extract_mention_query(content, bot_id);
        if query.is_empty() {
            let persona = &self.app.persona;
            sink.send_notice(persona.seal(persona.empty_query_line)).await?;
            return Ok(Outcome::EmptyQuery);
        }

        let mode = self.app.persona.detect_mode(&query);
        self.handle_query(key, &query, mode, sink).await
    }

    /// One exchange: load, append, complete, commit, persist, dispatch.
    pub async fn handle_query(
        &self,
        key: ThreadKey,
        query: &str,
        mode: Mode,
        sink: &impl ReplySink,
    ) -> Result<Outcome> {
        let persona = &self.app.persona;

        let guard = self.app.store.lock(&key).await;
        let mut thread = self.app.store.thread(&key).await;
        thread.push(Turn::user(query));

        let messages = build_prompt(persona, mode, &thread);
        tracing::debug!(
            thread_key = %key,
            ?mode,
            turns = thread.len(),
            model = self.app.completions.model(),
            "requesting completion"
        );

        match self
            .app
            .completions
            .complete(&messages, persona.params(mode))
            .await
        {
            Ok(reply) => {
                thread.push(Turn::assistant(reply.clone()));
                self.app.store.commit(key.clone(), thread).await;
                self.persist().await;
                drop(guard);
                self.app.store.release_lock(&key).await;

                tracing::info!(thread_key = %key, ?mode, chars = reply.chars().count(), "exchange recorded");
                self.app.dispatcher.send(sink, &reply).await?;
                Ok(Outcome::Replied)
            }
            Err(error) => {
                drop(guard);
                self.app.store.release_lock(&key).await;
                tracing::error!(thread_key = %key, ?mode, %error, "completion failed, thread left unchanged");
                sink.send_notice(persona.seal(persona.failure_line)).await?;
                Ok(Outcome::Failed(error))
            }
        }
    }

    /// Drop a thread and confirm. Returns whether one existed.
    pub async fn handle_clear(&self, key: ThreadKey, sink: &impl ReplySink) -> Result<bool> {
        let persona = &self.app.persona;

        let existed = {
            let _guard = self.app.store.lock(&key).await;
            let existed = self.app.store.remove(&key).await;
            if existed {
                self.persist().await;
            }
            existed
        };
        self.app.store.release_lock(&key).await;

        tracing::info!(thread_key = %key, existed, "thread cleared");
        sink.send_text(persona.seal(persona.cleared_line)).await?;
        Ok(existed)
    }

    /// Send the persona's self-description.
    pub async fn handle_about(&self, sink: &impl ReplySink) -> Result<()> {
        self.app
            .dispatcher
            .send(sink, self.app.persona.about_text)
            .await
    }

    /// Generate an image and reply with its URL. Not recorded in any thread.
    pub async fn handle_imagine(&self, prompt: &str, sink: &impl ReplySink) -> Result<Outcome> {
        let persona = &self.app.persona;
        let Some(images) = &self.app.images else {
            tracing::warn!("image generation requested but no image provider is configured");
            sink.send_notice(persona.seal(persona.failure_line)).await?;
            return Ok(Outcome::Unavailable);
        };

        match images.generate(&ImageRequest::new(prompt)).await {
            Ok(urls) => {
                tracing::info!(images = urls.len(), "image generated");
                let text = format!("**{}**\n{}", prompt.trim(), urls.join("\n"));
                self.app.dispatcher.send(sink, &text).await?;
                Ok(Outcome::Replied)
            }
            Err(error) => {
                tracing::error!(%error, "image generation failed");
                sink.send_notice(persona.seal(persona.failure_line)).await?;
                Ok(Outcome::Failed(error))
            }
        }
    }

    /// Flush the store, logging instead of failing.
    pub async fn persist(&self) {
        if let Err(error) = self.app.store.save().await {
            tracing::error!(
                path = %self.app.store.path().display(),
                %error,
                "failed to persist threads, keeping in-memory state"
            );
        }
    }
}

/// Strip `<@id>` and `<@!id>` mentions of the bot and trim.
pub fn extract_mention_query(content: &str, bot_id: u64) -> String {
    content
        .replace(&format!("<@{bot_id}>"), "")
        .replace(&format!("<@!{bot_id}>"), "")
        .trim()
        .to_string()
}

/// Query sent for the message context-menu command.
pub fn context_query(author: &str, content: &str) -> String {
    format!(
        "Speak wisdom regarding this message from {author}: \"{}\"",
        content.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::testing::{RecordingSink, StubProvider, StubReply};

    use std::collections::HashMap;
    use std::time::Duration;

    const GLYPH: &str = "⊰ΨΩ≋⊱";

    struct Harness {
        router: Router,
        stub: StubProvider,
        history_path: std::path::PathBuf,
        _tempdir: tempfile::TempDir,
    }

    async fn harness(replies: Vec<StubReply>, extra: &[(&str, &str)]) -> Harness {
        let stub = StubProvider::start(replies).await;
        let tempdir = tempfile::tempdir().expect("failed to create tempdir");
        let history_path = tempdir.path().join("threads.json");

        let mut vars: HashMap<String, String> = [
            ("DISCORD_TOKEN", "token"),
            ("GROQ_API_KEY", "gsk_test"),
            ("COMPLETION_URL", stub.url.as_str()),
            ("COMPLETION_MAX_RETRIES", "0"),
            ("COMPLETION_TIMEOUT_SECS", "5"),
            ("IMAGE_API_KEY", "fal_test"),
            ("IMAGE_URL", stub.url.as_str()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        vars.insert("OVERMIND_DATA_DIR".into(), tempdir.path().display().to_string());
        vars.insert("HISTORY_FILE".into(), history_path.display().to_string());
        for (key, value) in extra {
            vars.insert(key.to_string(), value.to_string());
        }

        let config = Config::from_lookup(|key| vars.get(key).cloned()).expect("config should load");
        let app = App::new(config).expect("app should build");

        Harness {
            router: Router::new(Arc::new(app)),
            stub,
            history_path,
            _tempdir: tempdir,
        }
    }

    fn key() -> ThreadKey {
        ThreadKey::new(Some(42), 99)
    }

    #[tokio::test]
    async fn successful_exchange_is_recorded_and_persisted() {
        let harness = harness(vec![StubReply::completion("The reservoir stirs.")], &[]).await;
        let sink = RecordingSink::default();

        let outcome = harness
            .router
            .handle_query(key(), "hello", Mode::Standard, &sink)
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Replied));
        assert_eq!(sink.sent(), vec![format!("The reservoir stirs.\n\n{GLYPH}")]);

        let thread = harness.router.app().store.thread(&key()).await;
        assert_eq!(
            thread.turns(),
            &[Turn::user("hello"), Turn::assistant("The reservoir stirs.")]
        );

        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&harness.history_path).unwrap()).unwrap();
        assert_eq!(on_disk["42_99"][0]["role"], "user");
        assert_eq!(on_disk["42_99"][1]["content"], "The reservoir stirs.");
    }

    #[tokio::test]
    async fn rate_limited_exchange_leaves_no_trace() {
        let harness = harness(
            vec![StubReply::text(429, "slow down").with_header("retry-after", "5")],
            &[],
        )
        .await;
        let sink = RecordingSink::default();

        let outcome = harness
            .router
            .handle_query(key(), "hello", Mode::Standard, &sink)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            Outcome::Failed(ApiError::RateLimited { retry_after: Some(delay) })
                if delay == Duration::from_secs(5)
        ));
        let persona = &harness.router.app().persona;
        assert_eq!(sink.sent(), vec![persona.seal(persona.failure_line)]);
        assert!(!harness.router.app().store.contains(&key()).await);
        assert!(!harness.history_path.exists());
    }

    #[tokio::test]
    async fn cleared_thread_starts_fresh() {
        let harness = harness(
            vec![
                StubReply::completion("First light."),
                StubReply::completion("Anew."),
            ],
            &[],
        )
        .await;
        let sink = RecordingSink::default();
        let router = &harness.router;

        router
            .handle_query(key(), "hello", Mode::Standard, &sink)
            .await
            .unwrap();
        assert!(router.handle_clear(key(), &sink).await.unwrap());
        assert!(!router.app().store.contains(&key()).await);
        let on_disk = std::fs::read_to_string(&harness.history_path).unwrap();
        assert!(!on_disk.contains("42_99"));

        router
            .handle_query(key(), "again", Mode::Standard, &sink)
            .await
            .unwrap();

        let requests = harness.stub.requests();
        let messages = requests[1].body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "again");
    }

    #[tokio::test]
    async fn clearing_a_missing_thread_still_confirms() {
        let harness = harness(Vec::new(), &[]).await;
        let sink = RecordingSink::default();

        let existed = harness.router.handle_clear(key(), &sink).await.unwrap();

        assert!(!existed);
        let persona = &harness.router.app().persona;
        assert_eq!(sink.sent(), vec![persona.seal(persona.cleared_line)]);
    }

    #[tokio::test]
    async fn ultimate_mode_changes_prompt_and_parameters() {
        let harness = harness(vec![StubReply::completion("Behold.")], &[]).await;
        let sink = RecordingSink::default();

        harness
            .router
            .handle_mention(key(), "<@555> pierce the veil: what is time?", 555, &sink)
            .await
            .unwrap();

        let body = &harness.stub.requests()[0].body;
        assert_eq!(body["max_tokens"], 400);
        let system = body["messages"][0]["content"].as_str().unwrap();
        assert!(system.contains("ULTIMATE INVOCATION DETECTED"));
        assert_eq!(body["messages"][1]["content"], "pierce the veil: what is time?");
    }

    #[tokio::test]
    async fn empty_mention_prompts_without_calling_provider() {
        let harness = harness(Vec::new(), &[]).await;
        let sink = RecordingSink::default();

        let outcome = harness
            .router
            .handle_mention(key(), "  <@!555>  ", 555, &sink)
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::EmptyQuery));
        assert_eq!(harness.stub.hits(), 0);
        let persona = &harness.router.app().persona;
        assert_eq!(sink.sent(), vec![persona.seal(persona.empty_query_line)]);
    }

    #[tokio::test]
    async fn concurrent_queries_on_one_thread_keep_every_exchange() {
        let harness = harness(
            vec![StubReply::completion("one"), StubReply::completion("two")],
            &[],
        )
        .await;
        let sink = RecordingSink::default();
        let router = &harness.router;

        let (first, second) = tokio::join!(
            router.handle_query(key(), "first", Mode::Standard, &sink),
            router.handle_query(key(), "second", Mode::Standard, &sink),
        );
        first.unwrap();
        second.unwrap();

        let thread = router.app().store.thread(&key()).await;
        assert_eq!(thread.len(), 4);
        let users: Vec<&str> = thread
            .turns()
            .iter()
            .filter(|turn| turn.role == crate::conversation::Role::User)
            .map(|turn| turn.content.as_str())
            .collect();
        assert!(users.contains(&"first"));
        assert!(users.contains(&"second"));
    }

    #[tokio::test]
    async fn history_is_capped_to_recent_exchanges() {
        let harness = harness(
            vec![StubReply::completion("a1"), StubReply::completion("a2")],
            &[("MAX_HISTORY", "1")],
        )
        .await;
        let sink = RecordingSink::default();

        for query in ["u1", "u2"] {
            harness
                .router
                .handle_query(key(), query, Mode::Standard, &sink)
                .await
                .unwrap();
        }

        let thread = harness.router.app().store.thread(&key()).await;
        assert_eq!(thread.turns(), &[Turn::user("u2"), Turn::assistant("a2")]);

        // u1 fell off when u2 was appended; a1 was still in the window.
        let second_request = &harness.stub.requests()[1].body["messages"];
        let contents: Vec<&str> = second_request
            .as_array()
            .unwrap()
            .iter()
            .skip(1)
            .map(|message| message["content"].as_str().unwrap())
            .collect();
        assert_eq!(contents, vec!["a1", "u2"]);
    }

    #[tokio::test]
    async fn failed_save_still_delivers_the_reply() {
        let harness = harness(vec![StubReply::completion("Still here.")], &[]).await;
        let sink = RecordingSink::default();

        // A directory squatting on the temp path makes every save fail.
        let blocked = format!("{}.tmp", harness.history_path.display());
        std::fs::create_dir(&blocked).unwrap();

        let outcome = harness
            .router
            .handle_query(key(), "hello", Mode::Standard, &sink)
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Replied));
        assert_eq!(sink.sent(), vec![format!("Still here.\n\n{GLYPH}")]);
        let thread = harness.router.app().store.thread(&key()).await;
        assert_eq!(
            thread.turns(),
            &[Turn::user("hello"), Turn::assistant("Still here.")]
        );
        assert!(!harness.history_path.exists());
    }

    #[tokio::test]
    async fn imagine_without_provider_is_unavailable() {
        let harness = harness(Vec::new(), &[("IMAGE_API_KEY", "")]).await;
        let sink = RecordingSink::default();

        let outcome = harness.router.handle_imagine("a cosmic duck", &sink).await.unwrap();

        assert!(matches!(outcome, Outcome::Unavailable));
        assert_eq!(harness.stub.hits(), 0);
        let persona = &harness.router.app().persona;
        assert_eq!(sink.sent(), vec![persona.seal(persona.failure_line)]);
    }

    #[tokio::test]
    async fn imagine_replies_with_image_url() {
        let harness = harness(
            vec![StubReply::json(
                200,
                serde_json::json!({"images": [{"url": "https://cdn.example/duck.png"}]}),
            )],
            &[],
        )
        .await;
        let sink = RecordingSink::default();

        let outcome = harness.router.handle_imagine("a cosmic duck", &sink).await.unwrap();

        assert!(matches!(outcome, Outcome::Replied));
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("https://cdn.example/duck.png"));
        assert!(harness.router.app().store.is_empty().await);
    }

    #[test]
    fn context_query_quotes_the_target_message() {
        assert_eq!(
            context_query("wanderer", "  is time a circle?  "),
            "Speak wisdom regarding this message from wanderer: \"is time a circle?\""
        );
    }

    #[test]
    fn strips_both_mention_forms() {
        assert_eq!(extract_mention_query("<@123> what is <@!123> love", 123), "what is  love");
        assert_eq!(extract_mention_query("<@123>", 123), "");
        assert_eq!(extract_mention_query("<@456> hi", 123), "<@456> hi");
    }
}
