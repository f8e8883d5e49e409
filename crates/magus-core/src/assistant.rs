//! "Ask Magus" chat assistant
//!
//! Questions go to an OpenAI-compatible chat completions endpoint together
//! with a snapshot of live inbox numbers, so answers reflect the current
//! backlog.

use chrono::{DateTime, Utc};
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregate::{category_counts, CategoryCounts};
use crate::api::{decode_response, MagusApi};
use crate::config::AssistantConfig;
use crate::error::{Error, Result};
use crate::models::SenderStatsItem;

/// Senders included in the prompt context
const CONTEXT_TOP_SENDERS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Chat history, oldest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }
}

/// Live numbers handed to the model
#[derive(Debug, Clone, Default)]
pub struct LiveContext {
    pub counts: Option<CategoryCounts>,
    pub top_senders: Vec<SenderStatsItem>,
}

impl LiveContext {
    /// Gather counts and top senders concurrently; failures only shrink the context
    pub async fn gather(api: &dyn MagusApi) -> Self {
        let (counts, senders) = futures::join!(api.status_counts(), api.sender_stats());

        let counts = match counts {
            Ok(counts) => Some(category_counts(&counts)),
            Err(e) => {
                warn!("Assistant context: status counts unavailable: {}", e);
                None
            }
        };
        let top_senders = match senders {
            Ok(stats) => stats.items.into_iter().take(CONTEXT_TOP_SENDERS).collect(),
            Err(e) => {
                warn!("Assistant context: sender stats unavailable: {}", e);
                Vec::new()
            }
        };

        Self {
            counts,
            top_senders,
        }
    }
}

/// System prompt describing the assistant and the live context
pub fn system_prompt(context: &LiveContext) -> String {
    let mut prompt = String::from(
        "You are Magus, the assistant of a freight forwarding team. \
         Incoming quote requests are answered automatically or routed to a human \
         for review. Answer questions about the inbox briefly and with concrete numbers.",
    );

    if let Some(c) = &context.counts {
        prompt.push_str(&format!(
            "\n\nCurrent inbox: {} emails in total, {} processed, {} need review, \
             {} auto replied, {} ignored.",
            c.all, c.processed, c.needs_review, c.auto_replied, c.ignored
        ));
    }

    if !context.top_senders.is_empty() {
        prompt.push_str("\n\nTop senders:");
        for s in &context.top_senders {
            prompt.push_str(&format!("\n- {} ({} emails)", s.sender, s.count));
        }
    }
    prompt
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct Assistant {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f64,
}

impl Assistant {
    /// Fails with [`Error::MissingConfig`] when no API key is configured
    pub fn new(config: &AssistantConfig) -> Result<Self> {
        Self::with_builder(config, Client::builder())
    }

    pub fn with_builder(config: &AssistantConfig, builder: ClientBuilder) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::MissingConfig(format!("assistant API key (set {})", config.api_key_env))
            })?
            .to_string();

        Ok(Self {
            client: builder.build()?,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask a question and append the exchange to `conversation`.
    ///
    /// The question is recorded before the request goes out, so a failed
    /// call leaves it in the history without a reply.
    pub async fn ask(
        &self,
        conversation: &mut Conversation,
        question: &str,
        api: &dyn MagusApi,
    ) -> Result<ChatMessage> {
        let context = LiveContext::gather(api).await;
        let system = system_prompt(&context);

        conversation.push(ChatMessage::new(Role::User, question.trim()));

        let mut messages = vec![WireMessage {
            role: Role::System,
            content: &system,
        }];
        messages.extend(
            conversation
                .messages()
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| WireMessage {
                    role: m.role,
                    content: &m.content,
                }),
        );
        let request = CompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            messages,
        };

        debug!("[Assistant] POST {} ({} messages)", self.endpoint, request.messages.len());
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let parsed: CompletionResponse = decode_response(response).await?;

        let answer = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(Error::EmptyCompletion)?;

        info!("Assistant answered with {} chars", answer.chars().count());
        let reply = ChatMessage::new(Role::Assistant, answer);
        conversation.push(reply.clone());
        Ok(reply)
    }
}
