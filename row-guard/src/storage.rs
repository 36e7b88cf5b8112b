//! Blob storage for uploads and result artifacts.
//!
//! [`BlobStore`] is the pipeline's view of object storage. The provided
//! [`ObjectStoreBlobStore`] maps bucket names onto `object_store` backends:
//! `InMemory` for tests and the CLI, and S3 / GCS / Azure behind the
//! corresponding cargo features.
//!
//! Cloud buckets hand out presigned `GET` URLs from their backend's
//! [`Signer`]. Buckets without a signer fall back to
//! `<public_base_url>/<bucket>/<key>?expires=<unix seconds>`.

use crate::error::{GuardError, Result};
use crate::log_io_op;
use crate::logging::LogConfig;
use async_trait::async_trait;
use chrono::Utc;
use http::Method;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

#[cfg(feature = "s3")]
use object_store::aws::AmazonS3Builder;
#[cfg(feature = "azure")]
use object_store::azure::MicrosoftAzureBuilder;
#[cfg(feature = "gcs")]
use object_store::gcp::GoogleCloudStorageBuilder;

/// A fetched object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    /// Content type recorded when the object was stored, if any
    pub content_type: Option<String>,
}

/// Object storage used by the pipeline.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Reads an object.
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Blob>;

    /// Writes an object, replacing any existing one.
    async fn store(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()>;

    /// Returns a time-limited download URL for an existing object.
    async fn sign_url(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String>;
}

#[derive(Clone)]
struct Backend {
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
}

/// [`BlobStore`] backed by one `object_store` instance per bucket.
#[derive(Clone)]
pub struct ObjectStoreBlobStore {
    stores: HashMap<String, Backend>,
    public_base_url: String,
    log_config: LogConfig,
}

impl fmt::Debug for ObjectStoreBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buckets: Vec<_> = self.stores.keys().collect();
        buckets.sort();
        f.debug_struct("ObjectStoreBlobStore")
            .field("buckets", &buckets)
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

impl ObjectStoreBlobStore {
    /// Creates a store with no buckets. Signed URLs are built under
    /// `public_base_url`.
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            stores: HashMap::new(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            log_config: LogConfig::default(),
        }
    }

    /// A store with a single in-memory bucket.
    pub fn in_memory(bucket: impl Into<String>) -> Self {
        Self::new("memory://").with_bucket(bucket, Arc::new(InMemory::new()))
    }

    /// Registers an unsigned backend for `bucket`.
    pub fn with_bucket(mut self, bucket: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.insert(bucket.into(), Backend { store, signer: None });
        self
    }

    /// Registers a backend whose download URLs are presigned by the store.
    pub fn with_signed_bucket<S>(mut self, bucket: impl Into<String>, store: Arc<S>) -> Self
    where
        S: ObjectStore + Signer,
    {
        let signer: Arc<dyn Signer> = store.clone();
        self.stores.insert(
            bucket.into(),
            Backend {
                store,
                signer: Some(signer),
            },
        );
        self
    }

    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    /// Registers an S3 bucket configured from the standard `AWS_*` environment.
    #[cfg(feature = "s3")]
    pub fn with_s3_bucket(self, bucket: impl Into<String>, region: Option<&str>) -> Result<Self> {
        let bucket = bucket.into();
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&bucket)
            .with_retry(object_store::RetryConfig {
                max_retries: 3,
                retry_timeout: Duration::from_secs(30),
                ..Default::default()
            });
        if let Some(region) = region {
            builder = builder.with_region(region);
        }
        let store = builder.build().map_err(|e| {
            GuardError::storage_with_source(format!("failed to create S3 client for '{bucket}'"), Box::new(e))
        })?;
        Ok(self.with_signed_bucket(bucket, Arc::new(store)))
    }

    /// Registers a GCS bucket configured from the `GOOGLE_*` environment.
    #[cfg(feature = "gcs")]
    pub fn with_gcs_bucket(self, bucket: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(&bucket)
            .build()
            .map_err(|e| {
                GuardError::storage_with_source(format!("failed to create GCS client for '{bucket}'"), Box::new(e))
            })?;
        Ok(self.with_signed_bucket(bucket, Arc::new(store)))
    }

    /// Registers an Azure container configured from the `AZURE_*` environment.
    #[cfg(feature = "azure")]
    pub fn with_azure_container(self, container: impl Into<String>) -> Result<Self> {
        let container = container.into();
        let store = MicrosoftAzureBuilder::from_env()
            .with_container_name(&container)
            .build()
            .map_err(|e| {
                GuardError::storage_with_source(
                    format!("failed to create Azure client for '{container}'"),
                    Box::new(e),
                )
            })?;
        Ok(self.with_signed_bucket(container, Arc::new(store)))
    }

    fn backend(&self, bucket: &str) -> Result<&Backend> {
        self.stores
            .get(bucket)
            .ok_or_else(|| GuardError::storage(format!("unknown bucket '{bucket}'")))
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBlobStore {
    #[instrument(skip(self))]
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Blob> {
        let backend = &self.backend(bucket)?.store;
        let result = backend.get(&Path::from(key)).await?;
        let content_type = result
            .attributes
            .get(&Attribute::ContentType)
            .map(|value| value.to_string());
        let bytes = result.bytes().await?.to_vec();
        log_io_op!(
            self.log_config,
            bucket,
            key,
            size = bytes.len(),
            content_type = content_type.as_deref().unwrap_or("-"),
            "Fetched object"
        );
        Ok(Blob {
            bytes,
            content_type,
        })
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn store(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()> {
        let backend = &self.backend(bucket)?.store;
        let mut attributes = Attributes::new();
        if let Some(content_type) = content_type {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        let size = bytes.len();
        backend
            .put_opts(
                &Path::from(key),
                PutPayload::from(bytes),
                PutOptions {
                    attributes,
                    ..Default::default()
                },
            )
            .await?;
        log_io_op!(self.log_config, bucket, key, size, "Stored object");
        Ok(())
    }

    async fn sign_url(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String> {
        let backend = self.backend(bucket)?;
        let path = Path::from(key);
        if let Some(signer) = &backend.signer {
            let url = signer.signed_url(Method::GET, &path, ttl).await?;
            return Ok(url.to_string());
        }

        backend.store.head(&path).await?;
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| GuardError::storage(format!("invalid url lifetime: {e}")))?;
        let expires = (Utc::now() + ttl).timestamp();
        Ok(format!(
            "{}/{bucket}/{key}?expires={expires}",
            self.public_base_url
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_fetch_with_content_type() {
        let store = ObjectStoreBlobStore::in_memory("bucket");
        store
            .store("bucket", "uploads/a.csv", b"a,b\n1,2\n".to_vec(), Some("text/csv"))
            .await
            .unwrap();

        let blob = store.fetch("bucket", "uploads/a.csv").await.unwrap();
        assert_eq!(blob.bytes, b"a,b\n1,2\n");
        assert_eq!(blob.content_type.as_deref(), Some("text/csv"));
    }

    #[tokio::test]
    async fn test_store_without_content_type() {
        let store = ObjectStoreBlobStore::in_memory("bucket");
        store.store("bucket", "k", vec![1, 2, 3], None).await.unwrap();
        assert_eq!(store.fetch("bucket", "k").await.unwrap().content_type, None);
    }

    #[tokio::test]
    async fn test_missing_object_is_storage_unavailable() {
        let store = ObjectStoreBlobStore::in_memory("bucket");
        let err = store.fetch("bucket", "nope").await.unwrap_err();
        assert!(matches!(err, GuardError::StorageUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_unknown_bucket() {
        let store = ObjectStoreBlobStore::in_memory("bucket");
        let err = store.fetch("other", "k").await.unwrap_err();
        assert!(err.to_string().contains("unknown bucket 'other'"));
    }

    #[tokio::test]
    async fn test_sign_url() {
        let store = ObjectStoreBlobStore::new("https://files.example.com/")
            .with_bucket("results", Arc::new(InMemory::new()));
        store
            .store("results", "validated/a.json", b"[]".to_vec(), Some("application/json"))
            .await
            .unwrap();

        let before = Utc::now().timestamp();
        let url = store
            .sign_url("results", "validated/a.json", Duration::from_secs(1800))
            .await
            .unwrap();
        let (base, expires) = url.split_once("?expires=").unwrap();
        assert_eq!(base, "https://files.example.com/results/validated/a.json");
        let expires: i64 = expires.parse().unwrap();
        assert!(expires >= before + 1800);

        assert!(store
            .sign_url("results", "missing", Duration::from_secs(1))
            .await
            .is_err());
    }

    #[cfg(feature = "s3")]
    #[tokio::test]
    async fn test_s3_bucket_urls_are_presigned() {
        let s3 = object_store::aws::AmazonS3Builder::new()
            .with_bucket_name("results")
            .with_region("us-east-1")
            .with_endpoint("http://127.0.0.1:9")
            .with_allow_http(true)
            .with_access_key_id("AKIDEXAMPLE")
            .with_secret_access_key("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
            .build()
            .unwrap();
        let store = ObjectStoreBlobStore::new("https://files.example.com")
            .with_signed_bucket("results", Arc::new(s3));

        let url = store
            .sign_url("results", "validated/a.json", Duration::from_secs(1800))
            .await
            .unwrap();
        assert!(url.contains("validated/a.json"));
        assert!(url.contains("X-Amz-Signature="));
        assert!(url.contains("X-Amz-Expires=1800"));
        assert!(!url.starts_with("https://files.example.com"));
    }
}
