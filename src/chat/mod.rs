pub mod sse;

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use log::{ error, info };
use reqwest::Client as HttpClient;
use reqwest::header::ACCEPT;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::models::session::{ Message, Role };
use self::sse::{ parse_data_line, SseLineDecoder };

/// Fixed user-facing reply substituted when an exchange fails. The underlying
/// error is logged, never shown verbatim.
pub const APOLOGY_MESSAGE: &str = "I'm sorry, I encountered an error connecting to the chatbot.";

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chatbot has no preview API key")]
    MissingApiKey,
    #[error("chat request failed: {0}")] Request(#[from] reqwest::Error),
    #[error("chat endpoint returned {0}")] Status(reqwest::StatusCode),
}

/// What to do with an in-flight assistant message when the stream dies after
/// some chunks already rendered. The backend console always swapped in a fresh
/// apology; whether that was intentional is an open question upstream, so both
/// behaviors are supported and the apology stays the default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Replace the partial message with the fixed apology text.
    ReplaceWithApology,
    /// Keep the partial text and append the apology as its own message.
    PreservePartial,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseFailurePolicyError {
    message: String,
}

impl fmt::Display for ParseFailurePolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseFailurePolicyError {}

impl FromStr for FailurePolicy {
    type Err = ParseFailurePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "apology" | "replace" => Ok(FailurePolicy::ReplaceWithApology),
            "preserve" => Ok(FailurePolicy::PreservePartial),
            _ =>
                Err(ParseFailurePolicyError {
                    message: format!("Invalid failure policy: '{}'", s),
                }),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    session_id: &'a str,
}

/// Transport seam for the streaming chat exchange, so the widget logic can be
/// exercised against scripted streams in tests.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn stream_message(
        &self,
        api_key: &str,
        session_id: &str,
        message: &str
    ) -> Result<ChunkStream, ChatError>;
}

/// Issues one `POST /v1/chat/stream` per user message and exposes the reply as
/// an incremental chunk stream.
pub struct StreamingChatClient {
    http: HttpClient,
    base_url: String,
}

impl StreamingChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: HttpClient::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl ChatTransport for StreamingChatClient {
    async fn stream_message(
        &self,
        api_key: &str,
        session_id: &str,
        message: &str
    ) -> Result<ChunkStream, ChatError> {
        let url = format!("{}/v1/chat/stream", self.base_url.trim_end_matches('/'));
        let resp = self.http
            .post(&url)
            .header("X-API-Key", api_key)
            .header(ACCEPT, "text/event-stream")
            .json(&(ChatRequest { message, session_id }))
            .send().await?;

        if !resp.status().is_success() {
            return Err(ChatError::Status(resp.status()));
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut decoder = SseLineDecoder::new();
            while let Some(chunk_result) = stream.next().await {
                match chunk_result {
                    Ok(bytes) => {
                        for line in decoder.push(&bytes) {
                            if let Some(text) = parse_data_line(&line) {
                                if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                                    // Consumer went away; drain silently.
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ChatError::Request(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// One end-user conversation with the selected chatbot. Owns its transcript
/// exclusively; transport failures never escape — they become synthetic
/// assistant messages per the console's error policy.
pub struct ChatWidget<T: ChatTransport> {
    transport: T,
    api_key: Option<String>,
    chatbot_id: Option<String>,
    session_id: Option<String>,
    messages: Vec<Message>,
    typing: bool,
    policy: FailurePolicy,
}

impl<T: ChatTransport> ChatWidget<T> {
    pub fn new(transport: T, policy: FailurePolicy) -> Self {
        Self {
            transport,
            api_key: None,
            chatbot_id: None,
            session_id: None,
            messages: Vec::new(),
            typing: false,
            policy,
        }
    }

    /// Point the widget at a chatbot. Selecting a different bot clears the
    /// transcript and the session token.
    pub fn set_chatbot(&mut self, chatbot_id: &str, api_key: Option<String>) {
        if self.chatbot_id.as_deref() != Some(chatbot_id) {
            self.messages.clear();
            self.session_id = None;
        }
        self.chatbot_id = Some(chatbot_id.to_string());
        self.api_key = api_key;
    }

    /// Seed the opening assistant greeting if the transcript is empty.
    pub fn greet(&mut self, bot_name: &str) {
        if self.messages.is_empty() {
            self.messages.push(
                Message::new(
                    "init".to_string(),
                    Role::Assistant,
                    format!("Hi there! I'm {}. How can I help you today?", bot_name),
                    Vec::new()
                )
            );
        }
    }

    /// Explicitly reset the conversation; the next send starts a new session.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.session_id = None;
        self.typing = false;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Send one user message and fold the streamed reply into the transcript.
    /// `on_delta` fires once per received fragment so a renderer can repaint.
    ///
    /// Holding `&mut self` for the whole exchange is what enforces the
    /// one-in-flight-request rule.
    pub async fn send<F>(&mut self, text: &str, mut on_delta: F) where F: FnMut(&str) + Send {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let session_id = self.ensure_session_id();
        self.messages.push(
            Message::new(Uuid::new_v4().to_string(), Role::User, text.to_string(), Vec::new())
        );
        self.typing = true;

        // Precondition: a chatbot-scoped key must be on hand before any
        // network round-trip.
        let api_key = match self.api_key.clone() {
            Some(key) if !key.is_empty() => key,
            _ => {
                error!("Chat error: {}", ChatError::MissingApiKey);
                self.push_apology();
                self.typing = false;
                return;
            }
        };

        let mut stream = match self.transport.stream_message(&api_key, &session_id, text).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Chat error: {}", e);
                self.push_apology();
                self.typing = false;
                return;
            }
        };

        // The reply is on its way; swap the typing indicator for a growing
        // provisional message.
        self.typing = false;
        self.messages.push(Message::provisional(String::new()));

        let mut accumulated = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    accumulated.push_str(&chunk);
                    if let Some(message) = self.streaming_message_mut() {
                        // Replace, not append: the transcript always holds the
                        // full accumulator, so repaints from state stay right.
                        message.content = accumulated.clone();
                    }
                    on_delta(&chunk);
                }
                Err(e) => {
                    error!("Chat error: {}", e);
                    self.fail_in_flight();
                    self.typing = false;
                    return;
                }
            }
        }

        if let Some(message) = self.streaming_message_mut() {
            message.streaming = false;
        }
        self.typing = false;
        info!("Chat exchange complete ({} chars streamed)", accumulated.len());
    }

    fn ensure_session_id(&mut self) -> String {
        match &self.session_id {
            Some(id) => id.clone(),
            None => {
                let id = format!("sess_{}", Uuid::new_v4().simple());
                self.session_id = Some(id.clone());
                id
            }
        }
    }

    fn streaming_message_mut(&mut self) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.streaming)
    }

    fn push_apology(&mut self) {
        self.messages.push(
            Message::new(
                Uuid::new_v4().to_string(),
                Role::Assistant,
                APOLOGY_MESSAGE.to_string(),
                Vec::new()
            )
        );
    }

    fn fail_in_flight(&mut self) {
        match self.policy {
            FailurePolicy::ReplaceWithApology => {
                if let Some(message) = self.streaming_message_mut() {
                    message.content = APOLOGY_MESSAGE.to_string();
                    message.streaming = false;
                } else {
                    self.push_apology();
                }
            }
            FailurePolicy::PreservePartial => {
                if let Some(message) = self.streaming_message_mut() {
                    message.streaming = false;
                }
                self.push_apology();
            }
        }
    }
}
