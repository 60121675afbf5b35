//! REST client for conversation-level operations.
//!
//! Every call is bearer-authenticated with the session's current token.
//! With an issuer attached, a stale token is refreshed first; without one,
//! a missing or stale token is `NoAccessToken`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;

use im_credentials::util::from_reqwest;
use im_credentials::{SessionState, TokenIssuer, TokenLookup};
use im_domain::config::{Config, ServiceConfig};
use im_domain::error::{Error, Result};
use im_domain::ConversationId;

use crate::types::*;

const CONVERSATION_PATH: &str = "/iamessage/api/v2/conversation";

/// Largest attachment the file endpoint accepts.
pub const MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait seam
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait ConversationService: Send + Sync {
    /// Start a new conversation and make it the session's current one.
    async fn create_conversation(
        &self,
        language: Option<&str>,
        routing_attributes: Option<Value>,
    ) -> Result<CreatedConversation>;

    /// Send a plain-text message to the current conversation.
    async fn send_message(&self, text: &str) -> Result<SentMessage>;

    /// Upload `path` as an attachment to the current conversation, with an
    /// optional caption. Files over [`MAX_FILE_BYTES`] are refused locally.
    async fn send_file(&self, path: &Path, caption: Option<&str>) -> Result<SentFile>;

    /// Typing started / stopped. Returns the indicator entry id.
    async fn send_typing(&self, started: bool) -> Result<String>;

    /// Close the current conversation and forget it.
    async fn close_conversation(&self) -> Result<()>;

    /// End the messaging session; the conversation stays current.
    async fn end_session(&self) -> Result<()>;

    async fn list_conversations(&self, include_closed: bool, limit: u32) -> Result<Value>;

    async fn list_entries(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
        direction: EntriesDirection,
    ) -> Result<Value>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// REST implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct RestConversationClient {
    http: reqwest::Client,
    service: ServiceConfig,
    session: Arc<SessionState>,
    issuer: Option<Arc<TokenIssuer>>,
}

impl RestConversationClient {
    pub fn new(config: &Config, session: Arc<SessionState>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.exchange.request_timeout_ms))
            .connect_timeout(Duration::from_millis(config.exchange.connect_timeout_ms))
            .build()
            .map_err(from_reqwest)?;
        Ok(Self {
            http,
            service: config.service.clone(),
            session,
            issuer: None,
        })
    }

    /// Refresh stale tokens through `issuer` instead of failing.
    pub fn with_issuer(mut self, issuer: Arc<TokenIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    async fn bearer(&self) -> Result<String> {
        if let Some(issuer) = &self.issuer {
            return Ok(issuer.valid_token().await?.token);
        }
        match self.session.get_valid_token(Utc::now()) {
            TokenLookup::Valid(t) => Ok(t.token),
            TokenLookup::NeedsRefresh => Err(Error::NoAccessToken),
        }
    }

    /// Token presence is checked before the conversation.
    fn current_conversation(&self) -> Result<ConversationId> {
        if self.issuer.is_none() && self.session.current_token().is_none() {
            return Err(Error::NoAccessToken);
        }
        self.session.get_conversation().ok_or(Error::NoConversation)
    }

    fn conversation_url(&self, id: &ConversationId, suffix: &str) -> String {
        self.service
            .url(&format!("{CONVERSATION_PATH}/{}{suffix}", id.wire()))
    }

    /// JSON request requiring `expected` status. Returns the body text.
    async fn call(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
        expected: &[StatusCode],
    ) -> Result<(StatusCode, String)> {
        let mut request = self.authorized(method.clone(), url).await?;
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        self.dispatch(request, method, url, expected).await
    }

    async fn authorized(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let token = self.bearer().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn dispatch(
        &self,
        request: RequestBuilder,
        method: Method,
        url: &str,
        expected: &[StatusCode],
    ) -> Result<(StatusCode, String)> {
        tracing::debug!(%method, url, "conversation request");
        let resp = request.send().await.map_err(from_reqwest)?;
        let status = resp.status();
        let text = resp.text().await.map_err(from_reqwest)?;

        if !expected.contains(&status) {
            tracing::warn!(%method, url, status = status.as_u16(), "conversation request failed");
            return Err(Error::Remote {
                status: status.as_u16(),
                message: text,
            });
        }
        Ok((status, text))
    }

    /// Upload in-memory file contents; see [`ConversationService::send_file`].
    pub async fn send_file_bytes(
        &self,
        file_name: &str,
        contents: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<SentFile> {
        if file_name.trim().is_empty() {
            return Err(Error::InvalidInput("file name cannot be empty".into()));
        }
        let size = contents.len() as u64;
        check_file_size(size)?;
        let conversation = self.current_conversation()?;

        let message_id = uuid::Uuid::new_v4().to_string();
        let file_id = uuid::Uuid::new_v4().to_string();
        let entry = FileMessageEntry {
            es_developer_name: &self.service.es_developer_name,
            message: FileMessage {
                id: &message_id,
                file_id: &file_id,
                text: caption.map(str::trim).filter(|c| !c.is_empty()),
            },
            language: &self.service.language,
        };

        let form = Form::new()
            .part(
                "messageEntry",
                Part::text(serde_json::to_string(&entry)?)
                    .mime_str("application/json")
                    .map_err(from_reqwest)?,
            )
            .part(
                "fileData",
                Part::bytes(contents)
                    .file_name(file_name.to_string())
                    .mime_str(mime_for(file_name))
                    .map_err(from_reqwest)?,
            );

        let url = self.conversation_url(&conversation, "/file");
        let request = self.authorized(Method::POST, &url).await?.multipart(form);
        let (_, resp) = self
            .dispatch(request, Method::POST, &url, &[StatusCode::ACCEPTED])
            .await?;

        tracing::info!(
            conversation_id = %conversation,
            message_id = %message_id,
            file_name,
            size,
            "file sent"
        );
        Ok(SentFile {
            message_id,
            file_id,
            file_name: file_name.to_string(),
            size,
            response: parse_json_or_null(&resp),
        })
    }
}

fn check_file_size(size: u64) -> Result<()> {
    if size > MAX_FILE_BYTES {
        return Err(Error::InvalidInput(format!(
            "file too large: {:.2} MB (limit is {} MB)",
            size as f64 / (1024.0 * 1024.0),
            MAX_FILE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Content type by extension; unknown types go as raw bytes.
fn mime_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

fn parse_json_or_null(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[async_trait]
impl ConversationService for RestConversationClient {
    async fn create_conversation(
        &self,
        language: Option<&str>,
        routing_attributes: Option<Value>,
    ) -> Result<CreatedConversation> {
        let id = ConversationId::generate();
        let wire_id = id.wire();
        let routing = routing_attributes.filter(|v| match v {
            Value::Object(m) => !m.is_empty(),
            Value::Null => false,
            _ => true,
        });
        let body = CreateConversationBody {
            conversation_id: &wire_id,
            es_developer_name: &self.service.es_developer_name,
            language: language.unwrap_or(&self.service.language),
            routing_attributes: routing.as_ref(),
        };

        let url = self.service.url(CONVERSATION_PATH);
        let (status, text) = self
            .call(
                Method::POST,
                &url,
                &[],
                Some(serde_json::to_value(&body)?),
                &[StatusCode::OK, StatusCode::CREATED],
            )
            .await?;

        let parsed: CreateConversationResponse = serde_json::from_str(&text).unwrap_or_default();
        let channel_address = parsed.channel_address_identifier.filter(|a| !a.is_empty());

        self.session.set_conversation(id.clone());
        if let Some(addr) = &channel_address {
            self.session.set_channel_address(addr.clone());
        }
        tracing::info!(
            conversation_id = %id,
            channel_address = ?channel_address,
            "conversation created"
        );

        Ok(CreatedConversation {
            conversation_id: id,
            channel_address,
            status: status.as_u16(),
        })
    }

    async fn send_message(&self, text: &str) -> Result<SentMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("message text cannot be empty".into()));
        }
        let conversation = self.current_conversation()?;
        let message_id = uuid::Uuid::new_v4().to_string();
        let body = SendMessageBody {
            message: StaticContentMessage {
                id: &message_id,
                message_type: "StaticContentMessage",
                static_content: StaticContent {
                    format_type: "Text",
                    text,
                },
            },
            es_developer_name: &self.service.es_developer_name,
            language: &self.service.language,
        };

        let url = self.conversation_url(&conversation, "/message");
        let (_, resp) = self
            .call(
                Method::POST,
                &url,
                &[],
                Some(serde_json::to_value(&body)?),
                &[StatusCode::ACCEPTED],
            )
            .await?;

        tracing::info!(conversation_id = %conversation, message_id = %message_id, "message sent");
        Ok(SentMessage {
            message_id,
            response: parse_json_or_null(&resp),
        })
    }

    async fn send_file(&self, path: &Path, caption: Option<&str>) -> Result<SentFile> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidInput(format!("{} is not a file", path.display())))?;
        // Size is checked before reading so oversized files never load.
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(Error::InvalidInput(format!("{} is not a file", path.display())));
        }
        check_file_size(metadata.len())?;
        let contents = tokio::fs::read(path).await?;
        self.send_file_bytes(file_name, contents, caption).await
    }

    async fn send_typing(&self, started: bool) -> Result<String> {
        let conversation = self.current_conversation()?;
        let indicator_id = uuid::Uuid::new_v4().to_string();
        let body = EntryBody {
            entry_type: if started {
                "TypingStartedIndicator"
            } else {
                "TypingStoppedIndicator"
            },
            id: &indicator_id,
        };

        let url = self.conversation_url(&conversation, "/entry");
        self.call(
            Method::POST,
            &url,
            &[],
            Some(serde_json::to_value(&body)?),
            &[StatusCode::OK],
        )
        .await?;
        tracing::debug!(conversation_id = %conversation, started, "typing indicator sent");
        Ok(indicator_id)
    }

    async fn close_conversation(&self) -> Result<()> {
        let conversation = self.current_conversation()?;
        let url = self.conversation_url(&conversation, "");
        self.call(
            Method::DELETE,
            &url,
            &[("esDeveloperName", self.service.es_developer_name.as_str())],
            None,
            &[StatusCode::NO_CONTENT],
        )
        .await?;

        self.session.clear_conversation();
        tracing::info!(conversation_id = %conversation, "conversation closed");
        Ok(())
    }

    async fn end_session(&self) -> Result<()> {
        let conversation = self.current_conversation()?;
        let url = self.conversation_url(&conversation, "/session");
        self.call(
            Method::DELETE,
            &url,
            &[("esDeveloperName", self.service.es_developer_name.as_str())],
            None,
            &[StatusCode::NO_CONTENT],
        )
        .await?;
        tracing::info!(conversation_id = %conversation, "messaging session ended");
        Ok(())
    }

    async fn list_conversations(&self, include_closed: bool, limit: u32) -> Result<Value> {
        let url = self.service.url(&format!("{CONVERSATION_PATH}/list"));
        let limit = limit.to_string();
        let (_, text) = self
            .call(
                Method::GET,
                &url,
                &[
                    ("inclClosedConvs", if include_closed { "true" } else { "false" }),
                    ("limit", limit.as_str()),
                ],
                None,
                &[StatusCode::OK],
            )
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn list_entries(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
        direction: EntriesDirection,
    ) -> Result<Value> {
        let url = self.conversation_url(conversation_id, "/entries");
        let limit = limit.to_string();
        let (_, text) = self
            .call(
                Method::GET,
                &url,
                &[("limit", limit.as_str()), ("direction", direction.as_str())],
                None,
                &[StatusCode::OK],
            )
            .await?;
        Ok(serde_json::from_str(&text)?)
    }
}
