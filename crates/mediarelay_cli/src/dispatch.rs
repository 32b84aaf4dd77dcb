use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mediarelay_bridge::{InboundEvent, MessagingTransport};
use mediarelay_contract::{ChatId, InboundMedia, RequestId, StatusView, TransferError};
use mediarelay_transfer::TransferEngine;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

const POLL_BACKOFF: Duration = Duration::from_secs(5);
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Dispatcher<T> {
    transport: Arc<T>,
    engine: Arc<TransferEngine>,
    drain_timeout: Duration,
}

impl<T> Dispatcher<T>
where
    T: MessagingTransport + 'static,
{
    pub fn new(transport: Arc<T>, engine: Arc<TransferEngine>) -> Self {
        Self {
            transport,
            engine,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Polls until `shutdown` resolves, then waits up to the drain timeout
    /// for in-flight events before aborting them.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut in_flight = JoinSet::new();
        info!("dispatcher polling for inbound events");
        loop {
            while in_flight.try_join_next().is_some() {}

            tokio::select! {
                _ = &mut shutdown => break,
                polled = self.transport.next_events() => match polled {
                    Ok(events) => {
                        for event in events {
                            in_flight.spawn(self.handler(event));
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, backoff_secs = POLL_BACKOFF.as_secs(), "polling failed");
                        tokio::time::sleep(POLL_BACKOFF).await;
                    }
                }
            }
        }

        info!(in_flight = in_flight.len(), "dispatcher stopping");
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                abandoned = in_flight.len(),
                timeout_secs = self.drain_timeout.as_secs(),
                "in-flight transfers did not finish before shutdown"
            );
            in_flight.shutdown().await;
        }
        Ok(())
    }

    pub fn dispatch(&self, event: InboundEvent) -> JoinHandle<()> {
        tokio::spawn(self.handler(event))
    }

    fn handler(&self, event: InboundEvent) -> impl Future<Output = ()> + Send + 'static {
        let transport = self.transport.clone();
        let engine = self.engine.clone();
        async move {
            match event {
                InboundEvent::Start {
                    chat_id,
                    request_id,
                } => greet(transport, chat_id, request_id).await,
                InboundEvent::Media(media) => supervise(transport, engine, media).await,
            }
        }
    }
}

async fn greet<T>(transport: Arc<T>, chat_id: ChatId, request_id: RequestId)
where
    T: MessagingTransport + 'static,
{
    if let Err(err) = transport
        .send_status(chat_id, request_id, &StatusView::greeting())
        .await
    {
        warn!(chat_id, error = %err, "failed to send greeting");
    }
}

// A panic or an unopenable status message still gets a reply.
async fn supervise<T>(transport: Arc<T>, engine: Arc<TransferEngine>, media: InboundMedia)
where
    T: MessagingTransport + 'static,
{
    let chat_id = media.chat_id;
    let request_id = media.request_id;
    let worker = tokio::spawn(async move { engine.handle(media).await });

    let failure = match worker.await {
        Ok(Ok(report)) => {
            info!(
                transfer_id = %report.transfer_id,
                final_state = ?report.final_state,
                "transfer finished"
            );
            return;
        }
        Ok(Err(err)) => TransferError::Unexpected(format!("status message unavailable: {err}")),
        Err(err) => TransferError::Unexpected(err.to_string()),
    };

    error!(chat_id, request_id, stage = failure.stage(), error = %failure, "transfer aborted unexpectedly");
    if let Err(err) = transport
        .send_status(
            chat_id,
            request_id,
            &StatusView::unexpected(&failure.to_string()),
        )
        .await
    {
        warn!(chat_id, error = %err, "failed to report unexpected error");
    }
}
