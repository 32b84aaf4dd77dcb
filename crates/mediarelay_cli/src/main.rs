mod config;
mod dispatch;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mediarelay_bridge::TelegramBotTransport;
use mediarelay_storage::{LocalStagingStore, R2Storage};
use mediarelay_transfer::{EngineConfig, StatusReporter, TransferEngine};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::dispatch::Dispatcher;

#[derive(Debug, Parser)]
#[command(author, version, about = "Telegram to Cloudflare R2 media relay daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Serve {
        /// Optional TOML file; environment variables take precedence.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hyper=warn,reqwest=warn".into()),
        )
        .init();

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "loaded environment file");
    }

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => serve(config).await,
    }
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let settings = RuntimeConfig::load(config_path.as_deref())?.resolve()?;

    if settings.api_credentials {
        info!(bot_api = %settings.telegram.api_url, "API_ID/API_HASH present: expecting a self-hosted Bot API server");
    } else if settings.telegram.api_url != mediarelay_bridge::telegram::DEFAULT_BOT_API_URL {
        warn!(bot_api = %settings.telegram.api_url, "custom Bot API server configured without API_ID/API_HASH");
    }

    let storage = R2Storage::connect(&settings.r2)?;
    let transport = Arc::new(
        TelegramBotTransport::new(settings.telegram.clone())
            .context("failed to build Telegram client")?,
    );

    let staging = LocalStagingStore::new(settings.staging.clone());
    staging.prepare().await.with_context(|| {
        format!(
            "failed to prepare staging directory {}",
            settings.staging.root.display()
        )
    })?;

    let engine = Arc::new(TransferEngine::new(
        transport.clone(),
        staging,
        Arc::new(storage),
        StatusReporter::new(transport.clone()),
        EngineConfig {
            web_app_url: settings.web_app_url.clone(),
            upload_timeout: settings.upload_timeout,
        },
    ));

    let socket = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(socket)
        .await
        .with_context(|| format!("failed to bind {socket}"))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let liveness = tokio::spawn(mediarelay_control_plane::serve(
        listener,
        stopped(shutdown_rx.clone()),
    ));

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(err) => warn!(error = %err, "failed to listen for ctrl-c, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    info!(port = settings.port, bucket = %settings.r2.bucket, "mediarelayd running");
    Dispatcher::new(transport, engine)
        .run(stopped(shutdown_rx))
        .await?;

    liveness.await.context("liveness task panicked")??;
    info!("mediarelayd stopped");
    Ok(())
}

async fn stopped(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
