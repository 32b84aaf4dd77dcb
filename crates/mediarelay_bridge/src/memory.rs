use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use mediarelay_contract::{
    ChatId, FetchError, RenderError, RequestId, SourceHandle, StatusHandle, StatusView,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Notify};

use crate::bridge::{BridgeError, InboundEvent, MediaSource, MessagingTransport, StatusSink};

#[derive(Debug, Default)]
pub struct InMemoryTransport {
    files: Mutex<HashMap<SourceHandle, Vec<u8>>>,
    pending: Mutex<VecDeque<InboundEvent>>,
    arrivals: Notify,
    messages: Mutex<HashMap<StatusHandle, StatusView>>,
    sent: Mutex<Vec<(ChatId, StatusView)>>,
    edits: Mutex<Vec<(StatusHandle, StatusView)>>,
    next_message_id: AtomicI64,
    fail_renders: AtomicBool,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_file(&self, source: SourceHandle, bytes: Vec<u8>) {
        self.files.lock().await.insert(source, bytes);
    }

    pub async fn push_event(&self, event: InboundEvent) {
        self.pending.lock().await.push_back(event);
        self.arrivals.notify_one();
    }

    pub fn set_fail_renders(&self, fail: bool) {
        self.fail_renders.store(fail, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<(ChatId, StatusView)> {
        self.sent.lock().await.clone()
    }

    pub async fn edits(&self) -> Vec<(StatusHandle, StatusView)> {
        self.edits.lock().await.clone()
    }

    pub async fn current(&self, handle: &StatusHandle) -> Option<StatusView> {
        self.messages.lock().await.get(handle).cloned()
    }
}

#[async_trait]
impl MediaSource for InMemoryTransport {
    async fn fetch(
        &self,
        source: &SourceHandle,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        max_bytes: u64,
    ) -> Result<u64, FetchError> {
        let bytes = self
            .files
            .lock()
            .await
            .get(source)
            .cloned()
            .ok_or_else(|| FetchError::Unavailable(format!("unknown file {}", source.as_str())))?;

        if bytes.len() as u64 > max_bytes {
            return Err(FetchError::TooLarge(format!(
                "{} bytes exceeds limit of {max_bytes}",
                bytes.len()
            )));
        }

        sink.write_all(&bytes).await?;
        sink.flush().await?;
        Ok(bytes.len() as u64)
    }
}

#[async_trait]
impl StatusSink for InMemoryTransport {
    async fn send_status(
        &self,
        chat_id: ChatId,
        _reply_to: RequestId,
        view: &StatusView,
    ) -> Result<StatusHandle, RenderError> {
        if self.fail_renders.load(Ordering::SeqCst) {
            return Err(RenderError::Transport("render failures enabled".to_string()));
        }

        let handle = StatusHandle {
            chat_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1,
        };
        self.messages.lock().await.insert(handle, view.clone());
        self.sent.lock().await.push((chat_id, view.clone()));
        Ok(handle)
    }

    async fn edit_status(
        &self,
        handle: &StatusHandle,
        view: &StatusView,
    ) -> Result<(), RenderError> {
        self.edits.lock().await.push((*handle, view.clone()));
        if self.fail_renders.load(Ordering::SeqCst) {
            return Err(RenderError::Transport("render failures enabled".to_string()));
        }

        let mut messages = self.messages.lock().await;
        match messages.get(handle) {
            None => Err(RenderError::Rejected(format!(
                "message {} not found",
                handle.message_id
            ))),
            Some(current) if current == view => Err(RenderError::NotModified),
            Some(_) => {
                messages.insert(*handle, view.clone());
                Ok(())
            }
        }
    }
}

#[async_trait]
impl MessagingTransport for InMemoryTransport {
    async fn next_events(&self) -> Result<Vec<InboundEvent>, BridgeError> {
        loop {
            let drained: Vec<InboundEvent> = self.pending.lock().await.drain(..).collect();
            if !drained.is_empty() {
                return Ok(drained);
            }
            self.arrivals.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_edit_reports_not_modified() {
        let transport = InMemoryTransport::new();
        let handle = transport
            .send_status(1, 10, &StatusView::downloading())
            .await
            .expect("send");

        let err = transport
            .edit_status(&handle, &StatusView::downloading())
            .await
            .expect_err("identical edit");
        assert!(matches!(err, RenderError::NotModified));

        transport
            .edit_status(&handle, &StatusView::uploading())
            .await
            .expect("edit");
        assert_eq!(transport.current(&handle).await, Some(StatusView::uploading()));
        assert_eq!(transport.edits().await.len(), 2);
    }

    #[tokio::test]
    async fn fetch_enforces_byte_limit() {
        let transport = InMemoryTransport::new();
        let source = SourceHandle::new("big");
        transport.insert_file(source.clone(), vec![0u8; 16]).await;

        let mut sink = Vec::new();
        let err = transport
            .fetch(&source, &mut sink, 8)
            .await
            .expect_err("too large");
        assert!(matches!(err, FetchError::TooLarge(_)));

        let written = transport.fetch(&source, &mut sink, 16).await.expect("fetch");
        assert_eq!(written, 16);
        assert_eq!(sink.len(), 16);
    }
}
