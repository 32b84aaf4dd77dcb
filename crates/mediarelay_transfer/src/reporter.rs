use std::sync::Arc;

use mediarelay_bridge::StatusSink;
use mediarelay_contract::{ChatId, RenderError, RequestId, StatusHandle, StatusView};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct StatusMessage {
    handle: StatusHandle,
    last_applied: Option<StatusView>,
}

impl StatusMessage {
    pub fn new(handle: StatusHandle, last_applied: Option<StatusView>) -> Self {
        Self {
            handle,
            last_applied,
        }
    }

    pub fn handle(&self) -> &StatusHandle {
        &self.handle
    }

    pub fn last_applied(&self) -> Option<&StatusView> {
        self.last_applied.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Applied,
    Skipped,
    Unchanged,
    Swallowed,
}

#[derive(Clone)]
pub struct StatusReporter {
    sink: Arc<dyn StatusSink>,
}

impl StatusReporter {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self { sink }
    }

    pub async fn open(
        &self,
        chat_id: ChatId,
        reply_to: RequestId,
        view: StatusView,
    ) -> Result<StatusMessage, RenderError> {
        let handle = self.sink.send_status(chat_id, reply_to, &view).await?;
        Ok(StatusMessage::new(handle, Some(view)))
    }

    /// Renders `view` over `message`. Never fails: not-modified answers are
    /// treated as applied, any other render error is logged and dropped.
    pub async fn report(&self, message: &mut StatusMessage, view: StatusView) -> ReportOutcome {
        if message.last_applied.as_ref() == Some(&view) {
            debug!(message_id = message.handle.message_id, "status unchanged, skipping render");
            return ReportOutcome::Skipped;
        }

        match self.sink.edit_status(&message.handle, &view).await {
            Ok(()) => {
                message.last_applied = Some(view);
                ReportOutcome::Applied
            }
            Err(RenderError::NotModified) => {
                debug!(message_id = message.handle.message_id, "status already current");
                message.last_applied = Some(view);
                ReportOutcome::Unchanged
            }
            Err(err) => {
                warn!(
                    chat_id = message.handle.chat_id,
                    message_id = message.handle.message_id,
                    error = %err,
                    "status render failed"
                );
                ReportOutcome::Swallowed
            }
        }
    }
}
