//! Session engine: orchestration and status state machine

use std::sync::Arc;

use async_trait::async_trait;
use penny_ai::{Content, ImageModel, ImageRequest, ImageSize, Message, Role};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
    client::CompletionClient,
    config::{SUMMARY_LANGUAGE_AUTO, SessionConfig},
    context::{self, SUMMARY_MARKER},
    error::{Error, Result},
    events::SessionEvent,
    history::HistoryStore,
    persist::{PersistenceGateway, StoredState},
    reconcile::reconcile,
};

/// Exactly one state is active at a time; non-idle states reject new
/// top-level turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Thinking,
    Streaming,
    Drawing,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Thinking => "thinking",
            SessionStatus::Streaming => "streaming",
            SessionStatus::Drawing => "drawing",
        };
        f.write_str(s)
    }
}

/// Host-page content extraction boundary. An absent or empty result
/// aborts the summarization turn silently.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Extract the plain text of the currently active page
    async fn plain_text(&self) -> Option<String>;
}

/// The single active session: owns history, drives turns, triggers
/// persistence. Constructed at startup from the persistence gateway.
///
/// All operations run on one task; a hung stream holds the status at
/// `Streaming` indefinitely (no engine-imposed timeout).
pub struct SessionEngine {
    config: SessionConfig,
    history: HistoryStore,
    status: SessionStatus,
    client: Arc<dyn CompletionClient>,
    gateway: Arc<dyn PersistenceGateway>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionEngine {
    /// Construct the session from persisted state, prepending the
    /// welcome message. Gateway failures fall back to a fresh session.
    pub async fn load(
        client: Arc<dyn CompletionClient>,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Self {
        let stored = match gateway.load().await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Failed to load persisted session: {}", e);
                StoredState::default()
            }
        };
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config: stored.config,
            history: HistoryStore::from_persisted(stored.messages),
            status: SessionStatus::Idle,
            client,
            gateway,
            event_tx,
        }
    }

    /// Subscribe to session events (for the rendering collaborator)
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// The current status
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// All history messages, welcome included
    pub fn messages(&self) -> &[Message] {
        self.history.messages()
    }

    /// The active configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Override the chat model
    pub fn set_model(&mut self, model: penny_ai::ChatModel) {
        self.config.model = model;
    }

    /// Toggle context retention
    pub fn set_retain_context(&mut self, retain: bool) {
        self.config.retain_context = retain;
    }

    /// Submit a primary chat turn: user text plus an optional inline
    /// image payload (data URL).
    pub async fn submit(&mut self, text: String, image: Option<String>) -> Result<()> {
        self.ensure_idle()?;
        self.ensure_configured()?;

        let user_message = match image {
            Some(url) => Message::user_with_image(text, url),
            None => Message::user(text),
        };

        // Outbound context is computed before the turn is appended so
        // the placeholder never leaks into it
        let outbound =
            context::build_context(&self.history, self.config.retain_context, &user_message);
        let target = self.history.append_turn(user_message);
        let _ = self.event_tx.send(SessionEvent::HistoryChanged);
        self.set_status(SessionStatus::Thinking);

        match self.stream_into(target, outbound).await {
            Ok(()) => {
                self.save_history().await;
                self.set_status(SessionStatus::Idle);
                Ok(())
            }
            Err(e) => {
                // Partial content stays in history; the failure is the
                // caller's to surface
                self.set_status(SessionStatus::Idle);
                Err(e)
            }
        }
    }

    /// Reset history to the single welcome message and clear the
    /// persisted history.
    pub async fn clear(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.history.reset();
        let _ = self.event_tx.send(SessionEvent::HistoryChanged);
        self.persist(&[]).await;
        Ok(())
    }

    /// Summarize the active page. A virtual turn: the marker message
    /// and its reply live in history but are never persisted, so the
    /// context pruning rule stays effective across reloads.
    pub async fn summarize_page(&mut self, page: &dyn PageSource) -> Result<()> {
        self.ensure_idle()?;
        self.ensure_configured()?;

        let Some(text) = page.plain_text().await else {
            return Ok(());
        };
        if text.trim().is_empty() {
            return Ok(());
        }

        let target = self.history.append_turn(Message::user(SUMMARY_MARKER));
        let _ = self.event_tx.send(SessionEvent::HistoryChanged);
        self.set_status(SessionStatus::Thinking);

        // The page text goes out as a one-shot prompt, not as history
        let outbound = vec![Message::user(summary_prompt(
            &self.config.summary_language,
            &text,
        ))];
        let result = self.stream_into(target, outbound).await;
        self.set_status(SessionStatus::Idle);
        result
    }

    /// Generate an image from a prompt. The placeholder is overwritten
    /// in a single atomic update once the service responds.
    pub async fn generate_image(
        &mut self,
        prompt: String,
        model: ImageModel,
        size: ImageSize,
    ) -> Result<()> {
        self.ensure_idle()?;
        self.ensure_configured()?;

        let target = self.history.append_turn(Message::user(prompt.clone()));
        let _ = self.event_tx.send(SessionEvent::HistoryChanged);
        self.set_status(SessionStatus::Drawing);

        let request = ImageRequest {
            model,
            prompt,
            size,
        };
        match self.client.generate_image(request).await {
            Ok(image) => {
                let mut text = format!("![generated image]({})", image.url);
                if !image.revised_prompt.is_empty() {
                    text.push_str("\n\n");
                    text.push_str(&image.revised_prompt);
                }
                self.history.set_content(target, Content::Text(text));
                if let Some(message) = self.history.message(target) {
                    let _ = self.event_tx.send(SessionEvent::MessageUpdate {
                        index: target,
                        message: message.clone(),
                    });
                }
                self.save_history().await;
                self.set_status(SessionStatus::Idle);
                Ok(())
            }
            Err(e) => {
                self.set_status(SessionStatus::Idle);
                Err(e.into())
            }
        }
    }

    /// Open the stream and reconcile it into the placeholder at `target`
    async fn stream_into(&mut self, target: usize, outbound: Vec<Message>) -> Result<()> {
        let mut stream = self.client.stream_chat(self.config.model, outbound).await?;
        self.set_status(SessionStatus::Streaming);
        let result = reconcile(&mut stream, &mut self.history, target, &self.event_tx).await;
        match result {
            Ok(()) => Ok(()),
            Err(message) => {
                let _ = self.event_tx.send(SessionEvent::Notice {
                    message: format!("Stream failed: {}", message),
                });
                Err(Error::Stream(message))
            }
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.status != SessionStatus::Idle {
            return Err(Error::Busy(self.status));
        }
        Ok(())
    }

    fn ensure_configured(&self) -> Result<()> {
        if !self.config.is_configured() {
            let _ = self.event_tx.send(SessionEvent::Notice {
                message: "Please Configure first.".to_string(),
            });
            return Err(Error::NotConfigured);
        }
        Ok(())
    }

    fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        let _ = self.event_tx.send(SessionEvent::Status { status });
    }

    async fn save_history(&self) {
        self.persist(&persisted_messages(self.history.persistable()))
            .await;
    }

    /// A failed save never blocks the transition back to idle; the
    /// in-memory history stays authoritative for this session.
    async fn persist(&self, messages: &[Message]) {
        if let Err(e) = self.gateway.save_messages(messages).await {
            tracing::warn!("Failed to persist history: {}", e);
        }
    }
}

/// The subset of history eligible for persistence. Summarization turns
/// are virtual: the marker message and its reply are dropped here so
/// the pair cannot survive a reload, where the context pruning rule
/// would stop being effective.
fn persisted_messages(messages: &[Message]) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len());
    let mut i = 0;
    while i < messages.len() {
        let message = &messages[i];
        if message.role == Role::User && message.text() == SUMMARY_MARKER {
            i += 1;
            if messages.get(i).is_some_and(|m| m.role == Role::Assistant) {
                i += 1;
            }
            continue;
        }
        out.push(message.clone());
        i += 1;
    }
    out
}

/// Prompt template for the page-summarization turn, parameterized by
/// the configured target language.
fn summary_prompt(language: &str, page_text: &str) -> String {
    let language = if language == SUMMARY_LANGUAGE_AUTO {
        "the language the content is written in"
    } else {
        language
    };
    format!(
        "Summarize the following page content in {}. Keep the summary concise.\n\n{}",
        language, page_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryGateway;
    use parking_lot::Mutex;
    use penny_ai::{
        ChatModel, CompletionStream, Credentials, ImageResponse, Role, StreamEvent,
    };

    struct MockClient {
        scripts: Mutex<Vec<Vec<StreamEvent>>>,
        chat_requests: Mutex<Vec<(ChatModel, Vec<Message>)>>,
        image_error: Mutex<Option<String>>,
    }

    impl MockClient {
        fn new(scripts: Vec<Vec<StreamEvent>>) -> Self {
            Self {
                scripts: Mutex::new(scripts),
                chat_requests: Mutex::new(Vec::new()),
                image_error: Mutex::new(None),
            }
        }

        fn delta(text: &str) -> StreamEvent {
            StreamEvent::Delta { text: text.into() }
        }
    }

    #[async_trait]
    impl CompletionClient for MockClient {
        async fn stream_chat(
            &self,
            model: ChatModel,
            messages: Vec<Message>,
        ) -> penny_ai::Result<CompletionStream> {
            self.chat_requests.lock().push((model, messages));
            let events = {
                let mut scripts = self.scripts.lock();
                if scripts.is_empty() {
                    vec![]
                } else {
                    scripts.remove(0)
                }
            };
            Ok(Box::pin(tokio_stream::iter(events)))
        }

        async fn generate_image(
            &self,
            _request: ImageRequest,
        ) -> penny_ai::Result<ImageResponse> {
            if let Some(message) = self.image_error.lock().clone() {
                return Err(penny_ai::Error::api("image_error", message));
            }
            Ok(ImageResponse {
                url: "https://img.example/penny.png".to_string(),
                revised_prompt: "a shiny penny on a wooden desk".to_string(),
            })
        }
    }

    struct StaticPage(Option<String>);

    #[async_trait]
    impl PageSource for StaticPage {
        async fn plain_text(&self) -> Option<String> {
            self.0.clone()
        }
    }

    fn configured_state() -> StoredState {
        StoredState {
            config: SessionConfig {
                credentials: Credentials::new("sk-1", "org-1", "proj-1"),
                ..Default::default()
            },
            messages: vec![],
        }
    }

    async fn make_engine(
        scripts: Vec<Vec<StreamEvent>>,
        state: StoredState,
    ) -> (SessionEngine, Arc<MockClient>, Arc<MemoryGateway>) {
        let client = Arc::new(MockClient::new(scripts));
        let gateway = Arc::new(MemoryGateway::new(state));
        let engine = SessionEngine::load(client.clone(), gateway.clone()).await;
        (engine, client, gateway)
    }

    #[tokio::test]
    async fn test_end_to_end_primary_turn() {
        let scripts = vec![vec![MockClient::delta("Hel"), MockClient::delta("lo")]];
        let (mut engine, _client, gateway) = make_engine(scripts, configured_state()).await;

        assert_eq!(engine.messages().len(), 1);
        engine.submit("Hi".to_string(), None).await.unwrap();

        let messages = engine.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::Welcome);
        assert_eq!(messages[1].text(), "Hi");
        assert_eq!(messages[2].text(), "Hello");
        assert_eq!(engine.status(), SessionStatus::Idle);

        let saved = gateway.last_save().unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0], Message::user("Hi"));
        assert_eq!(saved[1].role, Role::Assistant);
        assert_eq!(saved[1].text(), "Hello");
    }

    #[tokio::test]
    async fn test_submit_without_credentials_is_rejected() {
        let (mut engine, _client, gateway) = make_engine(vec![], StoredState::default()).await;
        let mut rx = engine.subscribe();

        let err = engine.submit("Hi".to_string(), None).await.unwrap_err();
        assert!(matches!(err, Error::NotConfigured));
        assert_eq!(engine.messages().len(), 1);
        assert_eq!(engine.status(), SessionStatus::Idle);
        assert_eq!(gateway.save_count(), 0);

        match rx.try_recv().unwrap() {
            SessionEvent::Notice { message } => assert_eq!(message, "Please Configure first."),
            other => panic!("expected notice, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_while_busy_is_a_noop() {
        let (mut engine, _client, _gateway) = make_engine(vec![], configured_state()).await;
        engine.status = SessionStatus::Streaming;

        let err = engine.submit("Hi".to_string(), None).await.unwrap_err();
        assert!(matches!(err, Error::Busy(SessionStatus::Streaming)));
        assert_eq!(engine.messages().len(), 1);
        assert_eq!(engine.status(), SessionStatus::Streaming);
    }

    #[tokio::test]
    async fn test_clear_resets_history_and_persists_empty() {
        let mut state = configured_state();
        state.messages = vec![Message::user("Hi"), Message::assistant("Hello")];
        let (mut engine, _client, gateway) = make_engine(vec![], state).await;
        assert_eq!(engine.messages().len(), 3);

        engine.clear().await.unwrap();

        assert_eq!(engine.messages().len(), 1);
        assert_eq!(engine.messages()[0].role, Role::Welcome);
        assert_eq!(gateway.last_save().unwrap(), Vec::<Message>::new());
    }

    #[tokio::test]
    async fn test_stream_error_keeps_partial_and_returns_idle() {
        let scripts = vec![vec![
            MockClient::delta("par"),
            StreamEvent::Error {
                message: "connection reset".into(),
            },
        ]];
        let (mut engine, _client, gateway) = make_engine(scripts, configured_state()).await;

        let err = engine.submit("Hi".to_string(), None).await.unwrap_err();
        assert!(matches!(err, Error::Stream(_)));
        assert_eq!(engine.status(), SessionStatus::Idle);
        assert_eq!(engine.messages()[2].text(), "par");
        // Failed turns are not persisted
        assert_eq!(gateway.save_count(), 0);
    }

    #[tokio::test]
    async fn test_retention_bounds_and_prunes_outbound_context() {
        let mut state = configured_state();
        state.config.retain_context = true;
        state.messages = vec![
            Message::user("u0"),
            Message::assistant("a0"),
            Message::user(SUMMARY_MARKER),
            Message::assistant("an old page summary"),
            Message::user("u1"),
            Message::assistant("a1"),
        ];
        let scripts = vec![vec![MockClient::delta("ok")]];
        let (mut engine, client, _gateway) = make_engine(scripts, state).await;

        engine.submit("latest".to_string(), None).await.unwrap();

        let requests = client.chat_requests.lock();
        let (_, outbound) = &requests[0];
        assert!(outbound.len() <= 7);
        assert!(outbound.iter().all(|m| m.role != Role::Welcome));
        assert!(!outbound.iter().any(|m| m.text() == SUMMARY_MARKER));
        assert!(!outbound.iter().any(|m| m.text() == "an old page summary"));
        assert_eq!(outbound.last().unwrap().text(), "latest");
    }

    #[tokio::test]
    async fn test_retention_off_sends_single_message() {
        let mut state = configured_state();
        state.messages = vec![Message::user("u0"), Message::assistant("a0")];
        let scripts = vec![vec![MockClient::delta("ok")]];
        let (mut engine, client, _gateway) = make_engine(scripts, state).await;

        engine.submit("latest".to_string(), None).await.unwrap();

        let requests = client.chat_requests.lock();
        let (model, outbound) = &requests[0];
        assert_eq!(*model, ChatModel::Gpt4oMini);
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].text(), "latest");
    }

    #[tokio::test]
    async fn test_summarize_page_is_virtual() {
        let scripts = vec![vec![MockClient::delta("A summary.")]];
        let (mut engine, client, gateway) = make_engine(scripts, configured_state()).await;

        let page = StaticPage(Some("Page body text".to_string()));
        engine.summarize_page(&page).await.unwrap();

        let messages = engine.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].text(), SUMMARY_MARKER);
        assert_eq!(messages[2].text(), "A summary.");
        assert_eq!(engine.status(), SessionStatus::Idle);

        // The page text goes out as a one-shot prompt, not history
        let requests = client.chat_requests.lock();
        let (_, outbound) = &requests[0];
        assert_eq!(outbound.len(), 1);
        assert!(outbound[0].text().contains("Page body text"));

        // Virtual turn: nothing persisted
        assert_eq!(gateway.save_count(), 0);
    }

    #[tokio::test]
    async fn test_summary_pair_excluded_from_later_persistence() {
        let scripts = vec![
            vec![MockClient::delta("A summary.")],
            vec![MockClient::delta("Hello")],
        ];
        let (mut engine, _client, gateway) = make_engine(scripts, configured_state()).await;

        let page = StaticPage(Some("Page body text".to_string()));
        engine.summarize_page(&page).await.unwrap();
        engine.submit("Hi".to_string(), None).await.unwrap();

        // The marker pair stays visible in the live session
        assert_eq!(engine.messages().len(), 5);

        // but the write triggered by the next turn drops it
        let saved = gateway.last_save().unwrap();
        assert_eq!(saved.len(), 2);
        assert!(saved.iter().all(|m| m.text() != SUMMARY_MARKER));
        assert!(saved.iter().all(|m| m.text() != "A summary."));
        assert_eq!(saved[0].text(), "Hi");
        assert_eq!(saved[1].text(), "Hello");
    }

    #[tokio::test]
    async fn test_summarize_absent_page_is_silent_noop() {
        let (mut engine, client, gateway) = make_engine(vec![], configured_state()).await;

        engine.summarize_page(&StaticPage(None)).await.unwrap();
        engine
            .summarize_page(&StaticPage(Some("   \n".to_string())))
            .await
            .unwrap();

        assert_eq!(engine.messages().len(), 1);
        assert_eq!(engine.status(), SessionStatus::Idle);
        assert!(client.chat_requests.lock().is_empty());
        assert_eq!(gateway.save_count(), 0);
    }

    #[tokio::test]
    async fn test_generate_image_overwrites_placeholder() {
        let (mut engine, _client, gateway) = make_engine(vec![], configured_state()).await;

        engine
            .generate_image(
                "a penny".to_string(),
                ImageModel::DallE3,
                penny_ai::ImageSize::Square,
            )
            .await
            .unwrap();

        let messages = engine.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].text(), "a penny");
        assert_eq!(
            messages[2].text(),
            "![generated image](https://img.example/penny.png)\n\na shiny penny on a wooden desk"
        );
        assert_eq!(engine.status(), SessionStatus::Idle);
        // Image turns are persisted like primary turns
        assert_eq!(gateway.save_count(), 1);
    }

    #[tokio::test]
    async fn test_generate_image_failure_returns_idle() {
        let (mut engine, client, gateway) = make_engine(vec![], configured_state()).await;
        *client.image_error.lock() = Some("quota exceeded".to_string());

        let err = engine
            .generate_image(
                "a penny".to_string(),
                ImageModel::DallE2,
                penny_ai::ImageSize::Square,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Ai(_)));
        assert_eq!(engine.status(), SessionStatus::Idle);
        assert_eq!(gateway.save_count(), 0);
    }

    #[tokio::test]
    async fn test_load_restores_history_with_welcome() {
        let mut state = configured_state();
        state.messages = vec![Message::user("Hi"), Message::assistant("Hello")];
        let (engine, _client, _gateway) = make_engine(vec![], state).await;

        let messages = engine.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::Welcome);
        assert_eq!(messages[2].text(), "Hello");
    }

    #[test]
    fn test_summary_prompt_language_phrasing() {
        let auto = summary_prompt("auto", "body");
        assert!(auto.contains("the language the content is written in"));

        let explicit = summary_prompt("Deutsch", "body");
        assert!(explicit.contains("in Deutsch"));
        assert!(explicit.ends_with("body"));
    }

    #[tokio::test]
    async fn test_status_transitions_observed_in_order() {
        let scripts = vec![vec![MockClient::delta("Hello")]];
        let (mut engine, _client, _gateway) = make_engine(scripts, configured_state()).await;
        let mut rx = engine.subscribe();

        engine.submit("Hi".to_string(), None).await.unwrap();

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::Status { status } = event {
                statuses.push(status);
            }
        }
        assert_eq!(
            statuses,
            vec![
                SessionStatus::Thinking,
                SessionStatus::Streaming,
                SessionStatus::Idle,
            ]
        );
    }
}
