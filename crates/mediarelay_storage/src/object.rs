use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use mediarelay_contract::UploadError;
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, AttributeValue, Attributes, ClientOptions, ObjectStore};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

const R2_REGION: &str = "auto";
const ACL_HEADER: &str = "x-amz-acl";
const PUBLIC_READ_ACL: &str = "public-read";

const URL_PATH_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores the file at `local_path` under exactly `object_name`, publicly
    /// readable.
    async fn put(
        &self,
        local_path: &Path,
        object_name: &str,
        content_type: &str,
    ) -> Result<(), UploadError>;

    fn public_url(&self, object_name: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct R2Config {
    pub account_id: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub public_domain: String,
}

impl R2Config {
    pub fn endpoint(&self) -> String {
        format!("https://{}.r2.cloudflarestorage.com", self.account_id)
    }
}

#[derive(Debug, Clone)]
pub struct R2Storage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    public_domain: String,
}

impl R2Storage {
    pub fn connect(config: &R2Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(ACL_HEADER),
            HeaderValue::from_static(PUBLIC_READ_ACL),
        );

        let store = AmazonS3Builder::new()
            .with_endpoint(config.endpoint())
            .with_region(R2_REGION)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key)
            .with_secret_access_key(&config.secret_key)
            .with_client_options(ClientOptions::new().with_default_headers(headers))
            .build()
            .with_context(|| format!("failed to configure R2 bucket {}", config.bucket))?;

        info!(bucket = %config.bucket, endpoint = %config.endpoint(), "R2 storage configured");
        Ok(Self::with_store(
            Arc::new(store),
            config.bucket.clone(),
            config.public_domain.clone(),
        ))
    }

    pub fn with_store(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        public_domain: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            public_domain: public_domain.into(),
        }
    }
}

#[async_trait]
impl ObjectStorage for R2Storage {
    async fn put(
        &self,
        local_path: &Path,
        object_name: &str,
        content_type: &str,
    ) -> Result<(), UploadError> {
        let location = ObjectPath::parse(object_name)
            .map_err(|e| UploadError::Rejected(format!("invalid object name: {e}")))?;
        let mut file = tokio::fs::File::open(local_path).await?;

        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        );
        let mut writer = BufWriter::new(self.store.clone(), location).with_attributes(attributes);

        let start = Instant::now();
        let written = match tokio::io::copy(&mut file, &mut writer).await {
            Ok(written) => writer.shutdown().await.map(|()| written),
            Err(e) => {
                if let Err(abort) = writer.abort().await {
                    warn!(error = %abort, key = %object_name, "failed to abort partial upload");
                }
                Err(e)
            }
        };

        match written {
            Ok(size_bytes) => {
                info!(
                    bucket = %self.bucket,
                    key = %object_name,
                    size_bytes,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "R2 upload successful"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %object_name,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "R2 upload failed"
                );
                Err(stream_error(e))
            }
        }
    }

    fn public_url(&self, object_name: &str) -> String {
        format!(
            "{}/{}",
            self.public_domain.trim_end_matches('/'),
            utf8_percent_encode(object_name, URL_PATH_ESCAPE)
        )
    }
}

// BufWriter reports store failures as io errors wrapping the store error.
fn stream_error(error: std::io::Error) -> UploadError {
    let is_store_error = error
        .get_ref()
        .is_some_and(|inner| inner.is::<object_store::Error>());
    if !is_store_error {
        return UploadError::Io(error);
    }
    match error.into_inner().map(|inner| inner.downcast::<object_store::Error>()) {
        Some(Ok(store_error)) => upload_error(*store_error),
        Some(Err(other)) => UploadError::Backend(other.to_string()),
        None => UploadError::Backend("upload stream failed".to_string()),
    }
}

fn upload_error(error: object_store::Error) -> UploadError {
    if matches!(
        error,
        object_store::Error::PermissionDenied { .. } | object_store::Error::Unauthenticated { .. }
    ) {
        UploadError::Rejected(error.to_string())
    } else {
        UploadError::Backend(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use object_store::ObjectStoreExt;
    use percent_encoding::percent_decode_str;

    #[tokio::test]
    async fn put_stores_bytes_with_content_type() {
        let dir = tempfile::tempdir().expect("dir");
        let local = dir.path().join("payload");
        std::fs::write(&local, b"frames").expect("write");

        let memory = Arc::new(InMemory::new());
        let storage = R2Storage::with_store(memory.clone(), "videos", "https://pub.example.r2.dev");
        storage
            .put(&local, "1000_clip.mp4", "video/mp4")
            .await
            .expect("put");

        let stored = ObjectStoreExt::get(&*memory, &ObjectPath::from("1000_clip.mp4"))
            .await
            .expect("get");
        let content_type: Option<&str> = stored
            .attributes
            .get(&Attribute::ContentType)
            .map(|value| value.as_ref());
        assert_eq!(content_type, Some("video/mp4"));
        assert_eq!(stored.bytes().await.expect("bytes").to_vec(), b"frames".to_vec());
    }

    #[tokio::test]
    async fn missing_staged_file_is_an_upload_error() {
        let storage = R2Storage::with_store(Arc::new(InMemory::new()), "videos", "https://pub");
        let err = storage
            .put(Path::new("/nonexistent/mediarelay/payload"), "x", "video/mp4")
            .await
            .expect_err("missing file");
        assert!(matches!(err, UploadError::Io(_)));
    }

    #[tokio::test]
    async fn stored_key_matches_public_url_for_escaped_names() {
        let dir = tempfile::tempdir().expect("dir");
        let local = dir.path().join("payload");
        std::fs::write(&local, b"frames").expect("write");

        let memory = Arc::new(InMemory::new());
        let storage = R2Storage::with_store(memory.clone(), "videos", "https://pub");
        let key = "1000_%5BHD%5D%20clip%231.mp4";
        storage.put(&local, key, "video/mp4").await.expect("put");

        let url = storage.public_url(key);
        assert_eq!(url, "https://pub/1000_%255BHD%255D%2520clip%25231.mp4");

        let path = url.strip_prefix("https://pub/").expect("domain");
        let requested = percent_decode_str(path).decode_utf8().expect("utf8");
        assert_eq!(requested, key);
        let stored = ObjectStoreExt::get(&*memory, &ObjectPath::parse(&*requested).expect("path"))
            .await
            .expect("object behind public url");
        assert_eq!(stored.meta.location.as_ref(), key);
    }

    #[tokio::test]
    async fn large_files_are_streamed_in_parts() {
        let dir = tempfile::tempdir().expect("dir");
        let local = dir.path().join("payload");
        let payload: Vec<u8> = (0..12 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        std::fs::write(&local, &payload).expect("write");

        let memory = Arc::new(InMemory::new());
        let storage = R2Storage::with_store(memory.clone(), "videos", "https://pub");
        storage
            .put(&local, "1000_big.mp4", "video/mp4")
            .await
            .expect("put");

        let stored = ObjectStoreExt::get(&*memory, &ObjectPath::from("1000_big.mp4"))
            .await
            .expect("get");
        let content_type: Option<&str> = stored
            .attributes
            .get(&Attribute::ContentType)
            .map(|value| value.as_ref());
        assert_eq!(content_type, Some("video/mp4"));
        assert_eq!(stored.bytes().await.expect("bytes").len(), payload.len());
    }

    #[test]
    fn store_errors_inside_io_errors_are_classified() {
        let denied = std::io::Error::from(object_store::Error::PermissionDenied {
            path: "k".to_string(),
            source: "403".into(),
        });
        assert!(matches!(stream_error(denied), UploadError::Rejected(_)));

        let generic = std::io::Error::from(object_store::Error::Generic {
            store: "S3",
            source: "connection reset".into(),
        });
        assert!(matches!(stream_error(generic), UploadError::Backend(_)));

        let local = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        assert!(matches!(stream_error(local), UploadError::Io(_)));
    }

    #[test]
    fn public_url_joins_domain_and_name() {
        let storage =
            R2Storage::with_store(Arc::new(InMemory::new()), "videos", "https://pub.example.r2.dev/");
        assert_eq!(
            storage.public_url("1000_clip.mp4"),
            "https://pub.example.r2.dev/1000_clip.mp4"
        );
    }

    #[test]
    fn endpoint_targets_account() {
        let config = R2Config {
            account_id: "abc123".to_string(),
            access_key: "key".to_string(),
            secret_key: "secret".to_string(),
            bucket: "videos".to_string(),
            public_domain: "https://pub".to_string(),
        };
        assert_eq!(config.endpoint(), "https://abc123.r2.cloudflarestorage.com");
    }
}
