use anyhow::Result;
use object_store::{ObjectStore, aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory};
use std::sync::Arc;
use url::Url;

use crate::blob::{BlobBackend, ObjectStoreBackend};
use crate::config::StorageConfig;

/// Create the blob backend described by the storage configuration.
///
/// Returns `Ok(None)` when no access credential is configured: callers treat
/// blob maintenance as a no-op in that case and never touch the store.
pub fn create_blob_backend(storage_config: &StorageConfig) -> Result<Option<Arc<dyn BlobBackend>>> {
    let Some(credential) = storage_config.credential() else {
        log::warn!("No blob storage credential configured, blob maintenance disabled");
        return Ok(None);
    };

    let store = create_object_store_with_credential(&storage_config.dsn, Some(credential))?;
    // LocalFileSystem lists in directory order, not key order.
    let backend = if storage_config.dsn.starts_with("file:") {
        ObjectStoreBackend::unordered(store, &storage_config.public_url)?
    } else {
        ObjectStoreBackend::new(store, &storage_config.public_url)?
    };
    Ok(Some(Arc::new(backend)))
}

/// Create an object store from a DSN string
pub fn create_object_store_from_dsn(dsn: &str) -> Result<Arc<dyn ObjectStore>> {
    create_object_store_with_credential(dsn, None)
}

/// Create an object store from a DSN, applying the configured credential to
/// backends that authenticate (S3). The credential has the form
/// `access_key:secret_key`.
pub fn create_object_store_with_credential(
    dsn: &str,
    credential: Option<&str>,
) -> Result<Arc<dyn ObjectStore>> {
    let url =
        Url::parse(dsn).map_err(|e| anyhow::anyhow!("Invalid storage DSN '{}': {}", dsn, e))?;

    match url.scheme() {
        "file" => {
            let path = url.path();
            if path.is_empty() || path == "/" {
                return Err(anyhow::anyhow!(
                    "File DSN must specify a path: file:///path/to/storage"
                ));
            }
            std::fs::create_dir_all(path)?;
            Ok(Arc::new(LocalFileSystem::new_with_prefix(path)?))
        }
        "memory" => Ok(Arc::new(InMemory::new())),
        "s3" => {
            let mut builder = create_s3_builder_from_dsn(&url)?;
            if url.username().is_empty() {
                if let Some((key, secret)) = credential.and_then(|c| c.split_once(':')) {
                    builder = builder
                        .with_access_key_id(key)
                        .with_secret_access_key(secret);
                }
            }
            Ok(Arc::new(builder.build()?))
        }
        scheme => Err(anyhow::anyhow!(
            "Unsupported storage scheme: {}. Supported: file, memory, s3",
            scheme
        )),
    }
}

/// Create an S3 builder from a DSN
/// DSN format: s3://[access_key:secret_key@]host[:port]/bucket
pub fn create_s3_builder_from_dsn(dsn: &Url) -> Result<AmazonS3Builder> {
    let host = dsn
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("Missing S3 host in DSN"))?;
    let port = dsn.port();
    let bucket = dsn.path().trim_start_matches('/');

    if bucket.is_empty() {
        return Err(anyhow::anyhow!(
            "S3 DSN must specify a bucket: s3://host/bucket"
        ));
    }

    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(bucket)
        .with_region("us-east-1");

    let access_key = dsn.username();
    let secret_key = dsn.password().unwrap_or("");

    if !access_key.is_empty() {
        builder = builder
            .with_access_key_id(access_key)
            .with_secret_access_key(secret_key);
    }

    // S3-compatible stores (MinIO, R2) need an explicit endpoint
    let endpoint = if host.contains("amazonaws.com") {
        None
    } else {
        let scheme = if port == Some(443) { "https" } else { "http" };
        Some(match port {
            Some(p) => format!("{scheme}://{host}:{p}"),
            None => format!("{scheme}://{host}"),
        })
    };

    if let Some(endpoint) = endpoint {
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(true)
            .with_virtual_hosted_style_request(false);
    }

    if let Ok(env_region) = std::env::var("AWS_DEFAULT_REGION") {
        builder = builder.with_region(env_region);
    }

    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_memory_object_store() {
        let object_store = create_object_store_from_dsn("memory://").unwrap();
        assert!(Arc::strong_count(&object_store) == 1);
    }

    #[test]
    fn test_create_filesystem_object_store() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().to_string_lossy();
        let dsn = format!("file://{path}");

        let object_store = create_object_store_from_dsn(&dsn).unwrap();
        assert!(Arc::strong_count(&object_store) == 1);
    }

    #[test]
    fn test_backend_requires_credential() {
        let storage_config = StorageConfig {
            dsn: "memory://".to_string(),
            public_url: "https://cdn.example.com".to_string(),
            token: None,
        };
        assert!(create_blob_backend(&storage_config).unwrap().is_none());

        let storage_config = StorageConfig {
            token: Some("rw-token".to_string()),
            ..storage_config
        };
        assert!(create_blob_backend(&storage_config).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_file_backend_pages_through_every_blob() {
        use object_store::PutPayload;
        use object_store::path::Path as ObjectPath;
        use std::collections::BTreeSet;
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let dsn = format!("file://{}", temp_dir.path().to_string_lossy());

        // Written out of key order so directory order differs from key order.
        let store = create_object_store_from_dsn(&dsn).unwrap();
        for i in 0..40 {
            let n = (i * 17) % 40;
            store
                .put(
                    &ObjectPath::from(format!("img-{n:02}.png")),
                    PutPayload::from_static(b"blob"),
                )
                .await
                .unwrap();
        }

        let storage_config = StorageConfig {
            dsn,
            public_url: "https://cdn.example.com".to_string(),
            token: Some("rw-token".to_string()),
        };
        let backend = create_blob_backend(&storage_config).unwrap().unwrap();

        let mut listed = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = backend.list_page(cursor.as_deref(), 5).await.unwrap();
            assert!(page.blobs.len() <= 5);
            listed.extend(page.blobs.into_iter().map(|blob| blob.pathname));
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let unique: BTreeSet<_> = listed.iter().cloned().collect();
        assert_eq!(listed.len(), 40);
        assert_eq!(unique.len(), 40);
        assert_eq!(listed.first().map(String::as_str), Some("img-00.png"));
        assert_eq!(listed.last().map(String::as_str), Some("img-39.png"));
    }

    #[test]
    fn test_invalid_dsn() {
        let result = create_object_store_from_dsn("not-a-url");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid storage DSN")
        );
    }

    #[test]
    fn test_unsupported_scheme() {
        let result = create_object_store_from_dsn("gcs://bucket/prefix");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Unsupported storage scheme")
        );
    }

    #[test]
    fn test_s3_dsn_parsing() {
        let result = create_s3_builder_from_dsn(
            &Url::parse("s3://mybucket.s3.amazonaws.com/prefix").unwrap(),
        );
        assert!(result.is_ok());

        let result = create_s3_builder_from_dsn(
            &Url::parse("s3://access:secret@localhost:9000/bucket").unwrap(),
        );
        assert!(result.is_ok());

        let result = create_s3_builder_from_dsn(&Url::parse("s3://localhost:9000/").unwrap());
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must specify a bucket")
        );
    }

    #[test]
    fn test_file_dsn_without_path() {
        let result = create_object_store_from_dsn("file://");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("File DSN must specify a path")
        );
    }
}
