use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ChatId = i64;
pub type RequestId = i64;

pub const DEFAULT_MIME_TYPE: &str = "video/mp4";

const SYNTHETIC_NAME_PREFIX: &str = "video_";
const SYNTHETIC_NAME_EXTENSION: &str = "mp4";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceHandle(pub String);

impl SourceHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusHandle {
    pub chat_id: ChatId,
    pub message_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMedia {
    pub chat_id: ChatId,
    pub request_id: RequestId,
    pub source: SourceHandle,
    pub display_name: Option<String>,
    pub mime_type: Option<String>,
    pub size_hint: Option<u64>,
    pub requested_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum DisplayName {
    Provided(String),
    Synthetic(RequestId),
}

impl DisplayName {
    pub fn resolve(name: Option<&str>, request_id: RequestId) -> Self {
        match name.map(str::trim) {
            Some(name) if !name.is_empty() => Self::Provided(name.to_string()),
            _ => Self::Synthetic(request_id),
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::Synthetic(_))
    }

    pub fn render(&self) -> String {
        match self {
            Self::Provided(name) => name.clone(),
            Self::Synthetic(request_id) => {
                format!("{SYNTHETIC_NAME_PREFIX}{request_id}.{SYNTHETIC_NAME_EXTENSION}")
            }
        }
    }
}

pub fn resolve_mime_type(mime_type: Option<&str>) -> String {
    mime_type
        .map(str::trim)
        .and_then(|raw| raw.parse::<mime::Mime>().ok())
        .map(|parsed| parsed.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub transfer_id: Uuid,
    pub source: SourceHandle,
    pub display_name: DisplayName,
    pub mime_type: String,
    pub requested_at: i64,
}

impl TransferRequest {
    pub fn from_inbound(event: &InboundMedia) -> Self {
        Self {
            transfer_id: Uuid::now_v7(),
            source: event.source.clone(),
            display_name: DisplayName::resolve(event.display_name.as_deref(), event.request_id),
            mime_type: resolve_mime_type(event.mime_type.as_deref()),
            requested_at: event.requested_at,
        }
    }
}
