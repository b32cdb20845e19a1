/// S3-compatible object storage for post media
///
/// Works against AWS S3, MinIO and the S3 endpoint exposed by Supabase
/// storage. Objects are written with long-lived cache headers: keys are never
/// reused for different content.
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;

use super::{join_public_url, ObjectEntry, ObjectStorage, StorageError};
use crate::config::StorageConfig;

pub struct S3Storage {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3Storage {
    pub fn new(client: Client, bucket: &str, public_base_url: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            public_base_url: public_base_url.to_string(),
        }
    }

    /// Initialize the S3 client with credentials from config
    ///
    /// Falls back to the default AWS credential chain when no static keys are
    /// configured.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        use aws_sdk_s3::config::Region;

        let mut aws_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            use aws_sdk_s3::config::Credentials;

            let credentials = Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "journal_service_s3",
            );

            aws_config_builder = aws_config_builder.credentials_provider(credentials);
        }

        if let Some(endpoint) = &config.endpoint {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        let aws_config = aws_config_builder.load().await;

        // Path-style addressing is required by MinIO and Supabase storage.
        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(config.endpoint.is_some())
            .build();

        Ok(Self::new(
            Client::from_conf(s3_config),
            &config.bucket,
            &config.public_base_url,
        ))
    }

    fn map_error(&self, op: &str, key: &str, error_msg: String) -> StorageError {
        if error_msg.contains("403") || error_msg.contains("Forbidden") {
            StorageError::Auth(format!("{} {}: check storage credentials", op, key))
        } else if error_msg.contains("NoSuchBucket") {
            StorageError::BucketNotFound(self.bucket.clone())
        } else if error_msg.contains("NoSuchKey") || error_msg.contains("404") {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Backend(format!("{} {} failed: {}", op, key, error_msg))
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn upload(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let uploaded_at = chrono::Utc::now().to_rfc3339();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .metadata("uploaded_at", &uploaded_at)
            // Cache-Control: 1 year (objects are immutable, versioned by key)
            .cache_control("max-age=31536000")
            .send()
            .await
            .map_err(|e| self.map_error("upload", key, e.to_string()))?;

        tracing::debug!(key, content_type, "object uploaded");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_public_url(&self.public_base_url, &self.bucket, key)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| self.map_error("delete", key, e.to_string()))?;

        tracing::debug!(key, "object deleted");
        Ok(())
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StorageError> {
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| self.map_error("list", prefix, e.to_string()))?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    entries.push(ObjectEntry {
                        key: key.to_string(),
                        size: object.size().unwrap_or_default().max(0) as u64,
                    });
                }
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(entries)
    }
}
