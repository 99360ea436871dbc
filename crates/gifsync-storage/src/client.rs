//! S3 client implementation.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::store::BlobStore;

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Custom endpoint (S3-compatible services); AWS is used when unset
    pub endpoint_url: Option<String>,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region
    pub region: String,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok().filter(|s| !s.is_empty()),
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("S3_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("S3_BUCKET_NAME not set"))?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        })
    }
}

/// Object key of a gif.
pub fn image_key(name: &str) -> String {
    format!("{}.gif", name)
}

/// S3 gif storage client.
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    /// Create a new S3 client from configuration.
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "gifsync",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket_name,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = S3Config::from_env()?;
        Self::new(config).await
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Download a gif, `None` if it does not exist.
    pub async fn get_image(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        let key = image_key(name);
        debug!("Downloading {}", key);

        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    return Ok(None);
                }
                return Err(StorageError::DownloadFailed(e.to_string()));
            }
        };

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(Some(bytes))
    }

    /// Upload a gif, replacing any existing object.
    pub async fn put_image(&self, name: &str, data: Vec<u8>) -> StorageResult<u64> {
        let key = image_key(name);
        let written = data.len() as u64;
        debug!("Uploading {} bytes to {}", written, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .content_type("image/gif")
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        Ok(written)
    }

    /// Overwrite a gif only if it already exists.
    ///
    /// Returns the bytes written, or `None` if the gif is gone.
    pub async fn update_image(&self, name: &str, data: Vec<u8>) -> StorageResult<Option<u64>> {
        if !self.exists(name).await? {
            debug!("Skipping update of missing gif {}", name);
            return Ok(None);
        }
        self.put_image(name, data).await.map(Some)
    }

    /// Check if a gif exists.
    pub async fn exists(&self, name: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(image_key(name))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    Ok(false)
                } else {
                    Err(StorageError::AwsSdk(e.to_string()))
                }
            }
        }
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("S3 connectivity check failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for S3Client {
    async fn get(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        self.get_image(name).await
    }

    async fn put(&self, name: &str, data: Vec<u8>) -> StorageResult<u64> {
        self.put_image(name, data).await
    }

    async fn update(&self, name: &str, data: Vec<u8>) -> StorageResult<Option<u64>> {
        self.update_image(name, data).await
    }

    async fn check(&self) -> StorageResult<()> {
        self.check_connectivity().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(image_key("3f2a"), "3f2a.gif");
        assert_eq!(image_key("sub/loop"), "sub/loop.gif");
    }

    #[tokio::test]
    async fn test_client_from_config() {
        let client = S3Client::new(S3Config {
            endpoint_url: Some("http://localhost:9000".to_string()),
            access_key_id: "test".to_string(),
            secret_access_key: "test".to_string(),
            bucket_name: "gifs".to_string(),
            region: "us-east-1".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(client.bucket(), "gifs");
    }
}
