use async_trait::async_trait;
use mediarelay_contract::{
    ChatId, FetchError, InboundMedia, RenderError, RequestId, SourceHandle, StatusHandle,
    StatusView,
};
use thiserror::Error;
use tokio::io::AsyncWrite;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("transport API unavailable: {0}")]
    Unavailable(String),
    #[error("transport API rejected request: {0}")]
    Rejected(String),
    #[error("invalid transport payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Clone)]
pub enum InboundEvent {
    Start { chat_id: ChatId, request_id: RequestId },
    Media(InboundMedia),
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Streams the source into `sink`, returning the number of bytes written.
    /// Writing more than `max_bytes` aborts with [`FetchError::TooLarge`].
    async fn fetch(
        &self,
        source: &SourceHandle,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        max_bytes: u64,
    ) -> Result<u64, FetchError>;
}

#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn send_status(
        &self,
        chat_id: ChatId,
        reply_to: RequestId,
        view: &StatusView,
    ) -> Result<StatusHandle, RenderError>;

    async fn edit_status(&self, handle: &StatusHandle, view: &StatusView)
        -> Result<(), RenderError>;
}

#[async_trait]
pub trait MessagingTransport: MediaSource + StatusSink {
    async fn next_events(&self) -> Result<Vec<InboundEvent>, BridgeError>;
}
