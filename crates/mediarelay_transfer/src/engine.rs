use std::sync::Arc;
use std::time::Duration;

use mediarelay_bridge::MediaSource;
use mediarelay_contract::{
    InboundMedia, RenderError, StatusView, TransferError, TransferRequest, UploadError,
};
use mediarelay_storage::{LocalStagingStore, ObjectStorage, StagedFile};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::link::build_link;
use crate::naming::build_object_name;
use crate::reporter::{StatusMessage, StatusReporter};
use crate::TransferState;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub web_app_url: String,
    pub upload_timeout: Duration,
}

#[derive(Debug)]
pub enum UploadResult {
    Success,
    Failure(UploadError),
}

#[derive(Debug)]
pub enum TransferOutcome {
    Completed { object_name: String, link: String },
    Failed(TransferError),
}

#[derive(Debug)]
pub struct TransferReport {
    pub transfer_id: Uuid,
    pub final_state: TransferState,
    pub outcome: TransferOutcome,
}

#[derive(Clone)]
pub struct TransferEngine {
    source: Arc<dyn MediaSource>,
    staging: LocalStagingStore,
    storage: Arc<dyn ObjectStorage>,
    reporter: StatusReporter,
    config: EngineConfig,
}

impl TransferEngine {
    pub fn new(
        source: Arc<dyn MediaSource>,
        staging: LocalStagingStore,
        storage: Arc<dyn ObjectStorage>,
        reporter: StatusReporter,
        config: EngineConfig,
    ) -> Self {
        Self {
            source,
            staging,
            storage,
            reporter,
            config,
        }
    }

    pub async fn handle(&self, event: InboundMedia) -> Result<TransferReport, RenderError> {
        let request = TransferRequest::from_inbound(&event);
        let mut status = self
            .reporter
            .open(event.chat_id, event.request_id, StatusView::downloading())
            .await?;

        let span = info_span!(
            "transfer",
            transfer_id = %request.transfer_id,
            chat_id = event.chat_id,
            request_id = event.request_id
        );
        Ok(self.run(&request, &mut status).instrument(span).await)
    }

    pub async fn run(&self, request: &TransferRequest, status: &mut StatusMessage) -> TransferReport {
        let mut state = TransferState::Received;

        advance(&mut state, TransferState::Staging);
        self.reporter.report(status, StatusView::downloading()).await;

        let mut staged = match self.staging.stage(self.source.as_ref(), request).await {
            Ok(staged) => staged,
            Err(err) => {
                error!(error = %err, "fetch failed");
                advance(&mut state, TransferState::Failed);
                self.reporter.report(status, StatusView::fetch_failed()).await;
                return self.report(request, state, TransferOutcome::Failed(err.into()));
            }
        };
        advance(&mut state, TransferState::Staged);
        self.reporter.report(status, StatusView::uploading()).await;

        let display_name = request.display_name.render();
        let object_name = build_object_name(&request.display_name, request.requested_at);

        advance(&mut state, TransferState::Uploading);
        let result = self.upload(&staged, &object_name).await;
        self.staging.release(&mut staged);

        match result {
            UploadResult::Success => {
                let raw_storage_url = self.storage.public_url(&object_name);
                let link = build_link(&self.config.web_app_url, &raw_storage_url, &display_name);
                advance(&mut state, TransferState::Completed);
                self.reporter
                    .report(status, StatusView::ready(&display_name, &link))
                    .await;
                info!(object_name = %object_name, link = %link, "transfer completed");
                self.report(
                    request,
                    state,
                    TransferOutcome::Completed { object_name, link },
                )
            }
            UploadResult::Failure(err) => {
                error!(object_name = %object_name, error = %err, "upload failed");
                advance(&mut state, TransferState::Failed);
                self.reporter.report(status, StatusView::upload_failed()).await;
                self.report(request, state, TransferOutcome::Failed(err.into()))
            }
        }
    }

    async fn upload(&self, staged: &StagedFile, object_name: &str) -> UploadResult {
        let put = self
            .storage
            .put(staged.local_path(), object_name, staged.mime_type());
        match tokio::time::timeout(self.config.upload_timeout, put).await {
            Ok(Ok(())) => UploadResult::Success,
            Ok(Err(err)) => UploadResult::Failure(err),
            Err(_) => UploadResult::Failure(UploadError::Timeout(self.config.upload_timeout)),
        }
    }

    fn report(
        &self,
        request: &TransferRequest,
        final_state: TransferState,
        outcome: TransferOutcome,
    ) -> TransferReport {
        TransferReport {
            transfer_id: request.transfer_id,
            final_state,
            outcome,
        }
    }
}

fn advance(state: &mut TransferState, next: TransferState) {
    let previous = *state;
    info!(from = ?previous, to = ?next, "transfer state changed");
    *state = next;
}
