use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use mediarelay_contract::{
    ChatId, FetchError, InboundMedia, RenderError, RequestId, SourceHandle, StatusHandle,
    StatusView,
};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::bridge::{BridgeError, InboundEvent, MediaSource, MessagingTransport, StatusSink};

pub const DEFAULT_BOT_API_URL: &str = "https://api.telegram.org";

const NOT_MODIFIED_MARKER: &str = "message is not modified";
const TOO_BIG_MARKER: &str = "file is too big";

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_url: String,
    pub bot_token: String,
    pub poll_timeout: Duration,
}

#[derive(Debug)]
pub struct TelegramBotTransport {
    client: Client,
    config: TelegramConfig,
    offset: AtomicI64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    text: Option<String>,
    video: Option<FileMeta>,
    document: Option<FileMeta>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct FileMeta {
    file_id: String,
    file_name: Option<String>,
    mime_type: Option<String>,
    file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RemoteFile {
    file_path: Option<String>,
}

#[derive(Debug, Error)]
enum ApiFailure {
    #[error("network: {0}")]
    Network(String),
    #[error("api error{}: {description}", code_suffix(.code))]
    Api { code: Option<i64>, description: String },
}

fn code_suffix(code: &Option<i64>) -> String {
    code.map(|code| format!(" {code}")).unwrap_or_default()
}

impl TelegramBotTransport {
    pub fn new(config: TelegramConfig) -> Result<Self, BridgeError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| BridgeError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            config,
            offset: AtomicI64::new(0),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.bot_token,
            file_path
        )
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, ApiFailure> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiFailure::Network(e.without_url().to_string()))?;

        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ApiFailure::Network(e.without_url().to_string()))?;

        match (parsed.ok, parsed.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(ApiFailure::Api {
                code: parsed.error_code,
                description: parsed
                    .description
                    .unwrap_or_else(|| format!("{method} returned no result")),
            }),
        }
    }
}

#[async_trait]
impl MediaSource for TelegramBotTransport {
    async fn fetch(
        &self,
        source: &SourceHandle,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        max_bytes: u64,
    ) -> Result<u64, FetchError> {
        let remote: RemoteFile = self
            .call("getFile", json!({ "file_id": source.as_str() }))
            .await
            .map_err(fetch_error)?;
        let file_path = remote
            .file_path
            .ok_or_else(|| FetchError::Unavailable("getFile returned no file_path".to_string()))?;

        let response = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .map_err(|e| FetchError::Unavailable(e.without_url().to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(FetchError::PermissionDenied(response.status().to_string()));
            }
            status if !status.is_success() => {
                return Err(FetchError::Unavailable(format!("download returned {status}")));
            }
            _ => {}
        }

        if let Some(length) = response.content_length() {
            if length > max_bytes {
                return Err(FetchError::TooLarge(format!(
                    "{length} bytes exceeds limit of {max_bytes}"
                )));
            }
        }

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::Unavailable(e.without_url().to_string()))?;
            written += chunk.len() as u64;
            if written > max_bytes {
                return Err(FetchError::TooLarge(format!(
                    "stream exceeded limit of {max_bytes} bytes"
                )));
            }
            sink.write_all(&chunk).await?;
        }
        sink.flush().await?;

        debug!(file_path = %file_path, size_bytes = written, "telegram file fetched");
        Ok(written)
    }
}

#[async_trait]
impl StatusSink for TelegramBotTransport {
    async fn send_status(
        &self,
        chat_id: ChatId,
        reply_to: RequestId,
        view: &StatusView,
    ) -> Result<StatusHandle, RenderError> {
        let mut body = render_body(view);
        body["chat_id"] = json!(chat_id);
        body["reply_parameters"] = json!({
            "message_id": reply_to,
            "allow_sending_without_reply": true
        });

        let message: Message = self
            .call("sendMessage", body)
            .await
            .map_err(render_error)?;
        Ok(StatusHandle {
            chat_id: message.chat.id,
            message_id: message.message_id,
        })
    }

    async fn edit_status(
        &self,
        handle: &StatusHandle,
        view: &StatusView,
    ) -> Result<(), RenderError> {
        let mut body = render_body(view);
        body["chat_id"] = json!(handle.chat_id);
        body["message_id"] = json!(handle.message_id);

        // editMessageText answers with the message, or `true` for inline messages.
        self.call::<Value>("editMessageText", body)
            .await
            .map(|_| ())
            .map_err(render_error)
    }
}

#[async_trait]
impl MessagingTransport for TelegramBotTransport {
    async fn next_events(&self) -> Result<Vec<InboundEvent>, BridgeError> {
        let offset = self.offset.load(Ordering::SeqCst);
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                json!({
                    "offset": offset,
                    "timeout": self.config.poll_timeout.as_secs(),
                    "allowed_updates": ["message"]
                }),
            )
            .await
            .map_err(|failure| match failure {
                ApiFailure::Network(detail) => BridgeError::Unavailable(detail),
                api => BridgeError::Rejected(api.to_string()),
            })?;

        if let Some(last) = updates.iter().map(|update| update.update_id).max() {
            self.offset.store(last + 1, Ordering::SeqCst);
        }

        let received_at = Utc::now().timestamp();
        Ok(updates
            .into_iter()
            .filter_map(|update| event_from_update(update, received_at))
            .collect())
    }
}

fn event_from_update(update: Update, received_at: i64) -> Option<InboundEvent> {
    let message = update.message?;
    if message.chat.kind != "private" {
        debug!(chat_id = message.chat.id, kind = %message.chat.kind, "ignoring non-private chat");
        return None;
    }

    if let Some(text) = message.text.as_deref() {
        let command = text.split_whitespace().next().unwrap_or_default();
        if command == "/start" || command.starts_with("/start@") {
            return Some(InboundEvent::Start {
                chat_id: message.chat.id,
                request_id: message.message_id,
            });
        }
    }

    let media = message.video.or(message.document)?;
    Some(InboundEvent::Media(InboundMedia {
        chat_id: message.chat.id,
        request_id: message.message_id,
        source: SourceHandle::new(media.file_id),
        display_name: media.file_name,
        mime_type: media.mime_type,
        size_hint: media.file_size,
        requested_at: received_at,
    }))
}

fn render_body(view: &StatusView) -> Value {
    let mut body = json!({
        "text": view.text,
        "parse_mode": "HTML",
    });
    if let Some(button) = &view.button {
        body["reply_markup"] = json!({
            "inline_keyboard": [[{ "text": button.label, "url": button.url }]]
        });
    }
    body
}

fn fetch_error(failure: ApiFailure) -> FetchError {
    match failure {
        ApiFailure::Network(detail) => FetchError::Unavailable(detail),
        ApiFailure::Api { description, .. } if description.contains(TOO_BIG_MARKER) => {
            FetchError::TooLarge(description)
        }
        ApiFailure::Api {
            code: Some(401 | 403),
            description,
        } => FetchError::PermissionDenied(description),
        api => FetchError::Unavailable(api.to_string()),
    }
}

fn render_error(failure: ApiFailure) -> RenderError {
    match failure {
        ApiFailure::Network(detail) => RenderError::Transport(detail),
        ApiFailure::Api { description, .. } if description.contains(NOT_MODIFIED_MARKER) => {
            RenderError::NotModified
        }
        api => {
            warn!(error = %api, "telegram rejected status render");
            RenderError::Rejected(api.to_string())
        }
    }
}
