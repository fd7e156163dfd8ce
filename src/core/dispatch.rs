//! Provider dispatch
//!
//! One dispatch call takes one model plus the accumulated message history,
//! builds the request for that model's provider family, and normalizes the
//! response into text and/or tool calls, or fails with a classified error.
//! Direct calls go to a provider's native endpoint when its credential is
//! present; everything else routes through the aggregator with the full
//! provider-prefixed id.

use std::error::Error;
use std::fmt;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{
    ChatMessage, ChatRequest, ChatResponse, ChatToolCall, ContentPart, GeminiContent,
    GeminiInlineData, GeminiPart, GenerateContentRequest, GenerateContentResponse, ImageUrl,
    MessageContent,
};
use crate::core::capabilities::capabilities;
use crate::core::catalog::ModelDescriptor;
use crate::core::chat::{AttachedFile, MessageRole, StoredMessage, ToolCallRequest};
use crate::core::providers::{Credentials, LocalServerConfig, Provider};
use crate::utils::auth::{add_auth_headers, signed_bearer_token};
use crate::utils::url::parse_data_url;

const OPENROUTER_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const GOOGLE_GENERATE_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const ZHIPU_CHAT_URL: &str = "https://open.bigmodel.cn/api/paas/v4/chat/completions";

/// Token cap sent on direct OpenAI-style and local-server bodies.
const DIRECT_MAX_TOKENS: u32 = 4096;

/// A normalized provider response: text, tool calls, or both.
#[derive(Debug, Clone, Default)]
pub struct ProviderReply {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

#[derive(Debug)]
pub enum DispatchError {
    /// No usable credential for the model and no aggregator fallback.
    NoCredential { provider: Provider },
    /// HTTP unauthorized/forbidden from the provider.
    Auth { provider: Provider },
    /// Any other non-2xx or transport failure.
    Provider {
        status: Option<u16>,
        message: String,
    },
    /// 2xx but neither text nor tool calls.
    EmptyResponse,
    /// A compound credential did not match its expected format.
    MalformedCredential { provider: Provider, message: String },
    /// The cancellation token fired mid-flight.
    Aborted,
}

impl DispatchError {
    pub fn is_abort(&self) -> bool {
        matches!(self, DispatchError::Aborted)
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NoCredential { provider } => {
                write!(
                    f,
                    "No API key for '{provider}' and no OpenRouter fallback key."
                )
            }
            DispatchError::Auth { provider } => {
                write!(
                    f,
                    "Authentication with {} failed (unauthorized)",
                    provider.display_name()
                )
            }
            DispatchError::Provider { status, message } => match status {
                Some(status) => write!(f, "HTTP {status}: {message}"),
                None => write!(f, "{message}"),
            },
            DispatchError::EmptyResponse => {
                write!(f, "Empty or invalid response from provider.")
            }
            DispatchError::MalformedCredential { provider, message } => {
                write!(f, "Invalid {} API key: {message}", provider.display_name())
            }
            DispatchError::Aborted => write!(f, "request aborted"),
        }
    }
}

impl Error for DispatchError {}

/// The seam between the turn loop and the network. The production
/// implementation is [`HttpDispatcher`]; tests substitute their own.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(
        &self,
        model: &ModelDescriptor,
        credentials: &Credentials,
        local: &LocalServerConfig,
        history: &[StoredMessage],
        files: Option<&[AttachedFile]>,
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, DispatchError>;
}

/// How a model will be called given the current credential state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchRoute {
    /// The provider's own endpoint, with its own credential.
    Native,
    /// Through the aggregator with the full provider-prefixed id.
    Aggregator,
    /// No path: no direct credential and no aggregator fallback.
    Unavailable,
}

pub fn select_route(
    model: &ModelDescriptor,
    credentials: &Credentials,
    local: &LocalServerConfig,
) -> DispatchRoute {
    let direct = match model.provider {
        Provider::Local => local.is_configured(),
        provider if provider.has_native_endpoint() => credentials.has(provider),
        _ => false,
    };
    if direct {
        DispatchRoute::Native
    } else if credentials.has(Provider::OpenRouter) {
        DispatchRoute::Aggregator
    } else {
        DispatchRoute::Unavailable
    }
}

pub struct HttpDispatcher {
    client: reqwest::Client,
}

impl HttpDispatcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn perform(
        &self,
        model: &ModelDescriptor,
        credentials: &Credentials,
        local: &LocalServerConfig,
        history: &[StoredMessage],
        files: Option<&[AttachedFile]>,
    ) -> Result<ProviderReply, DispatchError> {
        let route = select_route(model, credentials, local);
        debug!(model = %model.id, ?route, "dispatching chat turn");

        let request = match route {
            DispatchRoute::Native => {
                self.build_native_request(model, credentials, local, history, files)?
            }
            DispatchRoute::Aggregator => {
                let api_key = credentials
                    .get(Provider::OpenRouter)
                    .ok_or(DispatchError::NoCredential {
                        provider: model.provider,
                    })?;
                let body = ChatRequest {
                    model: model.id.clone(),
                    messages: format_history(history, files, model),
                    max_tokens: None,
                };
                add_auth_headers(self.client.post(OPENROUTER_CHAT_URL), api_key).json(&body)
            }
            DispatchRoute::Unavailable => {
                return Err(DispatchError::NoCredential {
                    provider: model.provider,
                })
            }
        };

        let response = request.send().await.map_err(|err| DispatchError::Provider {
            status: None,
            message: err.to_string(),
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(DispatchError::Auth {
                provider: model.provider,
            });
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(DispatchError::Provider {
                status: Some(status.as_u16()),
                message: best_effort_error_message(&body),
            });
        }

        if route == DispatchRoute::Native && model.provider == Provider::Google {
            let parsed: GenerateContentResponse =
                response.json().await.map_err(malformed_body)?;
            parse_gemini_reply(parsed)
        } else {
            let parsed: ChatResponse = response.json().await.map_err(malformed_body)?;
            parse_chat_reply(parsed)
        }
    }

    fn build_native_request(
        &self,
        model: &ModelDescriptor,
        credentials: &Credentials,
        local: &LocalServerConfig,
        history: &[StoredMessage],
        files: Option<&[AttachedFile]>,
    ) -> Result<reqwest::RequestBuilder, DispatchError> {
        match model.provider {
            Provider::Local => {
                let endpoint =
                    local
                        .chat_endpoint()
                        .ok_or_else(|| DispatchError::MalformedCredential {
                            provider: Provider::Local,
                            message: "server URL does not parse".to_string(),
                        })?;
                let api_key = if local.api_key.trim().is_empty() {
                    "no-key"
                } else {
                    local.api_key.as_str()
                };
                let body = ChatRequest {
                    model: model.short_id().to_string(),
                    messages: format_history(history, files, model),
                    max_tokens: Some(DIRECT_MAX_TOKENS),
                };
                Ok(add_auth_headers(self.client.post(endpoint), api_key).json(&body))
            }
            Provider::Google => {
                let api_key =
                    credentials
                        .get(Provider::Google)
                        .ok_or(DispatchError::NoCredential {
                            provider: Provider::Google,
                        })?;
                let endpoint = format!(
                    "{GOOGLE_GENERATE_BASE}/{}:generateContent?key={api_key}",
                    model.short_id()
                );
                let contents = to_gemini_contents(format_history(history, files, model))?;
                Ok(self
                    .client
                    .post(endpoint)
                    .header("Content-Type", "application/json")
                    .json(&GenerateContentRequest { contents }))
            }
            Provider::OpenAi => {
                let api_key =
                    credentials
                        .get(Provider::OpenAi)
                        .ok_or(DispatchError::NoCredential {
                            provider: Provider::OpenAi,
                        })?;
                let body = ChatRequest {
                    model: model.short_id().to_string(),
                    messages: format_history(history, files, model),
                    max_tokens: Some(DIRECT_MAX_TOKENS),
                };
                Ok(add_auth_headers(self.client.post(OPENAI_CHAT_URL), api_key).json(&body))
            }
            Provider::Groq => {
                let api_key =
                    credentials
                        .get(Provider::Groq)
                        .ok_or(DispatchError::NoCredential {
                            provider: Provider::Groq,
                        })?;
                let body = ChatRequest {
                    model: model.short_id().to_string(),
                    messages: format_history(history, files, model),
                    max_tokens: None,
                };
                Ok(add_auth_headers(self.client.post(GROQ_CHAT_URL), api_key).json(&body))
            }
            Provider::Zhipu => {
                let api_key =
                    credentials
                        .get(Provider::Zhipu)
                        .ok_or(DispatchError::NoCredential {
                            provider: Provider::Zhipu,
                        })?;
                let token = signed_bearer_token(api_key, Utc::now().timestamp_millis())
                    .map_err(|err| DispatchError::MalformedCredential {
                        provider: Provider::Zhipu,
                        message: err.to_string(),
                    })?;
                // Zhipu bodies never carry attachments.
                let body = ChatRequest {
                    model: model.short_id().to_string(),
                    messages: format_history(history, None, model),
                    max_tokens: None,
                };
                Ok(add_auth_headers(self.client.post(ZHIPU_CHAT_URL), &token).json(&body))
            }
            provider => Err(DispatchError::NoCredential { provider }),
        }
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(
        &self,
        model: &ModelDescriptor,
        credentials: &Credentials,
        local: &LocalServerConfig,
        history: &[StoredMessage],
        files: Option<&[AttachedFile]>,
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, DispatchError> {
        tokio::select! {
            outcome = self.perform(model, credentials, local, history, files) => outcome,
            _ = cancel.cancelled() => Err(DispatchError::Aborted),
        }
    }
}

fn malformed_body(err: reqwest::Error) -> DispatchError {
    DispatchError::Provider {
        status: None,
        message: format!("malformed response body: {err}"),
    }
}

/// Build the wire message array for one dispatch attempt. Images ride
/// only on the final message and only when the target model is
/// multimodal; document text is prepended to the final user message as a
/// question wrapper. Earlier turns go out text-only.
pub fn format_history(
    history: &[StoredMessage],
    files: Option<&[AttachedFile]>,
    model: &ModelDescriptor,
) -> Vec<ChatMessage> {
    let caps = capabilities(model);
    let files = files.unwrap_or(&[]);
    let images: Vec<&str> = files
        .iter()
        .filter_map(|file| match file {
            AttachedFile::Image { data_url, .. } => Some(data_url.as_str()),
            _ => None,
        })
        .collect();
    let documents: Vec<(&str, &str)> = files
        .iter()
        .filter_map(|file| match file {
            AttachedFile::Document { name, content, .. } => {
                Some((name.as_str(), content.as_str()))
            }
            _ => None,
        })
        .collect();

    history
        .iter()
        .enumerate()
        .map(|(index, message)| {
            let is_last = index + 1 == history.len();
            match message.role {
                MessageRole::User => {
                    let mut text = message.content.clone().unwrap_or_default();
                    if is_last && !documents.is_empty() {
                        let context = documents
                            .iter()
                            .map(|(name, content)| format!("--- Document: {name} ---\n{content}"))
                            .collect::<Vec<_>>()
                            .join("\n\n");
                        text = format!(
                            "Based on the following document(s):\n{context}\n\nMy question: {text}"
                        );
                    }
                    let content = if is_last && caps.is_multimodal && !images.is_empty() {
                        let mut parts = vec![ContentPart::Text { text }];
                        parts.extend(images.iter().map(|url| ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: (*url).to_string(),
                            },
                        }));
                        MessageContent::Parts(parts)
                    } else {
                        MessageContent::Text(text)
                    };
                    ChatMessage {
                        role: "user".to_string(),
                        content: Some(content),
                        name: None,
                        tool_call_id: None,
                        tool_calls: None,
                    }
                }
                MessageRole::Assistant => ChatMessage {
                    role: "assistant".to_string(),
                    content: message.content.clone().map(MessageContent::Text),
                    name: None,
                    tool_call_id: None,
                    tool_calls: if message.tool_calls.is_empty() {
                        None
                    } else {
                        Some(message.tool_calls.iter().map(to_wire_tool_call).collect())
                    },
                },
                MessageRole::Tool => ChatMessage {
                    role: "tool".to_string(),
                    content: message.content.clone().map(MessageContent::Text),
                    name: message.name.clone(),
                    tool_call_id: message.tool_call_id.clone(),
                    tool_calls: None,
                },
            }
        })
        .collect()
}

fn to_wire_tool_call(call: &ToolCallRequest) -> ChatToolCall {
    ChatToolCall {
        id: call.id.clone(),
        kind: "function".to_string(),
        function: crate::api::ChatToolCallFunction {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        },
    }
}

/// Translate the wire message array into google's `contents` shape:
/// assistant turns become `model`, and image parts are inlined as typed
/// binary parts decoded from their data URLs.
fn to_gemini_contents(
    messages: Vec<ChatMessage>,
) -> Result<Vec<GeminiContent>, DispatchError> {
    messages
        .into_iter()
        .map(|message| {
            let role = if message.role == "assistant" {
                "model".to_string()
            } else {
                message.role
            };
            let parts = match message.content {
                Some(MessageContent::Parts(parts)) => parts
                    .into_iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => Ok(GeminiPart::Text { text }),
                        ContentPart::ImageUrl { image_url } => {
                            let decoded = parse_data_url(&image_url.url).ok_or_else(|| {
                                DispatchError::Provider {
                                    status: None,
                                    message: "Invalid data URL format".to_string(),
                                }
                            })?;
                            Ok(GeminiPart::Inline {
                                inline_data: GeminiInlineData {
                                    mime_type: decoded.mime_type.to_string(),
                                    data: decoded.data.to_string(),
                                },
                            })
                        }
                    })
                    .collect::<Result<Vec<_>, DispatchError>>()?,
                Some(MessageContent::Text(text)) => vec![GeminiPart::Text { text }],
                None => vec![GeminiPart::Text {
                    text: String::new(),
                }],
            };
            Ok(GeminiContent { role, parts })
        })
        .collect()
}

fn parse_chat_reply(parsed: ChatResponse) -> Result<ProviderReply, DispatchError> {
    let Some(choice) = parsed.choices.into_iter().next() else {
        return Err(DispatchError::EmptyResponse);
    };
    let text = choice.message.content;
    let tool_calls: Vec<ToolCallRequest> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCallRequest {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();

    if text.as_deref().is_none_or(str::is_empty) && tool_calls.is_empty() {
        return Err(DispatchError::EmptyResponse);
    }
    Ok(ProviderReply {
        text: text.unwrap_or_default(),
        tool_calls,
    })
}

fn parse_gemini_reply(parsed: GenerateContentResponse) -> Result<ProviderReply, DispatchError> {
    let text = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text);

    match text {
        Some(text) if !text.is_empty() => Ok(ProviderReply {
            text,
            tool_calls: Vec::new(),
        }),
        _ => Err(DispatchError::EmptyResponse),
    }
}

/// Pull a human-readable summary out of a provider error body, falling
/// back to the raw text when no known field is present.
fn best_effort_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty error body>".to_string();
    }
    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|value| extract_error_summary(&value))
        .unwrap_or_else(|| trimmed.to_string())
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}
