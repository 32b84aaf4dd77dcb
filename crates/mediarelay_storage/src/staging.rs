use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mediarelay_bridge::MediaSource;
use mediarelay_contract::{FetchError, TransferRequest};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const STAGED_FILE_NAME: &str = "payload";

#[derive(Debug, Clone)]
pub struct StagingConfig {
    pub root: PathBuf,
    pub max_bytes: u64,
    pub fetch_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LocalStagingStore {
    config: StagingConfig,
}

#[derive(Debug)]
pub struct StagedFile {
    workspace: Option<TempDir>,
    local_path: PathBuf,
    size_bytes: u64,
    mime_type: String,
}

impl StagedFile {
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn is_released(&self) -> bool {
        self.workspace.is_none()
    }
}

impl LocalStagingStore {
    pub fn new(config: StagingConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub async fn prepare(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.config.root).await?;
        info!(root = %self.config.root.display(), "staging area ready");
        Ok(())
    }

    pub async fn stage(
        &self,
        source: &dyn MediaSource,
        request: &TransferRequest,
    ) -> Result<StagedFile, FetchError> {
        let workspace = tempfile::Builder::new()
            .prefix("mediarelay-")
            .tempdir_in(&self.config.root)?;
        let local_path = workspace.path().join(STAGED_FILE_NAME);
        let mut file = tokio::fs::File::create(&local_path).await?;

        let fetched = tokio::time::timeout(
            self.config.fetch_timeout,
            source.fetch(&request.source, &mut file, self.config.max_bytes),
        )
        .await;
        let size_bytes = match fetched {
            Ok(result) => result?,
            Err(_) => return Err(FetchError::Timeout(self.config.fetch_timeout)),
        };
        file.flush().await?;
        drop(file);

        info!(
            transfer_id = %request.transfer_id,
            path = %local_path.display(),
            size_bytes,
            "source staged"
        );

        Ok(StagedFile {
            workspace: Some(workspace),
            local_path,
            size_bytes,
            mime_type: request.mime_type.clone(),
        })
    }

    /// Deletes the staged file. Idempotent and infallible: returns whether
    /// anything was removed, and logs deletion failures instead of raising.
    pub fn release(&self, staged: &mut StagedFile) -> bool {
        let Some(workspace) = staged.workspace.take() else {
            debug!(path = %staged.local_path.display(), "staged file already released");
            return false;
        };

        let dir = workspace.path().to_path_buf();
        match workspace.close() {
            Ok(()) => {
                debug!(path = %dir.display(), "staged file released");
                true
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %dir.display(), "staged file already gone");
                false
            }
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "failed to remove staged file");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mediarelay_bridge::InMemoryTransport;
    use mediarelay_contract::{InboundMedia, SourceHandle};
    use tokio::io::AsyncWrite;

    struct StalledSource;

    #[async_trait]
    impl MediaSource for StalledSource {
        async fn fetch(
            &self,
            _source: &SourceHandle,
            _sink: &mut (dyn AsyncWrite + Send + Unpin),
            _max_bytes: u64,
        ) -> Result<u64, FetchError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(0)
        }
    }

    fn store(root: &Path, fetch_timeout: Duration) -> LocalStagingStore {
        LocalStagingStore::new(StagingConfig {
            root: root.to_path_buf(),
            max_bytes: 1024,
            fetch_timeout,
        })
    }

    fn request(source: &str) -> TransferRequest {
        TransferRequest::from_inbound(&InboundMedia {
            chat_id: 1,
            request_id: 2,
            source: SourceHandle::new(source),
            display_name: Some("clip.mp4".to_string()),
            mime_type: Some("video/mp4".to_string()),
            size_hint: None,
            requested_at: 1000,
        })
    }

    fn entries(root: &Path) -> usize {
        std::fs::read_dir(root).expect("read root").count()
    }

    #[tokio::test]
    async fn stage_then_release_twice() {
        let root = tempfile::tempdir().expect("root");
        let staging = store(root.path(), Duration::from_secs(5));
        let transport = InMemoryTransport::new();
        transport
            .insert_file(SourceHandle::new("a"), b"hello world".to_vec())
            .await;

        let mut staged = staging
            .stage(&transport, &request("a"))
            .await
            .expect("stage");
        assert_eq!(staged.size_bytes(), 11);
        assert_eq!(staged.mime_type(), "video/mp4");
        assert_eq!(
            std::fs::read(staged.local_path()).expect("read staged"),
            b"hello world"
        );

        assert!(staging.release(&mut staged));
        assert!(staged.is_released());
        assert!(!staging.release(&mut staged));
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn release_tolerates_external_removal() {
        let root = tempfile::tempdir().expect("root");
        let staging = store(root.path(), Duration::from_secs(5));
        let transport = InMemoryTransport::new();
        transport
            .insert_file(SourceHandle::new("a"), b"bytes".to_vec())
            .await;

        let mut staged = staging
            .stage(&transport, &request("a"))
            .await
            .expect("stage");
        let dir = staged.local_path().parent().expect("parent").to_path_buf();
        std::fs::remove_dir_all(&dir).expect("remove");

        assert!(!staging.release(&mut staged));
        assert!(staged.is_released());
    }

    #[tokio::test]
    async fn failed_fetch_leaves_nothing_behind() {
        let root = tempfile::tempdir().expect("root");
        let staging = store(root.path(), Duration::from_secs(5));
        let transport = InMemoryTransport::new();

        let err = staging
            .stage(&transport, &request("missing"))
            .await
            .expect_err("missing source");
        assert!(matches!(err, FetchError::Unavailable(_)));
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn oversized_source_is_rejected() {
        let root = tempfile::tempdir().expect("root");
        let staging = store(root.path(), Duration::from_secs(5));
        let transport = InMemoryTransport::new();
        transport
            .insert_file(SourceHandle::new("big"), vec![7u8; 4096])
            .await;

        let err = staging
            .stage(&transport, &request("big"))
            .await
            .expect_err("too large");
        assert!(matches!(err, FetchError::TooLarge(_)));
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn stalled_fetch_times_out() {
        let root = tempfile::tempdir().expect("root");
        let staging = store(root.path(), Duration::from_millis(50));

        let err = staging
            .stage(&StalledSource, &request("slow"))
            .await
            .expect_err("timeout");
        assert!(matches!(err, FetchError::Timeout(_)));
        assert_eq!(entries(root.path()), 0);
    }
}
