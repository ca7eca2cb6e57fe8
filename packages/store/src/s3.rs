//! S3-compatible backend.

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::{Credentials, StalledStreamProtectionConfig};
use aws_sdk_s3::operation::get_object::GetObjectError;

use crate::{ObjectStore, StoreError};

/// Connection settings for an S3-compatible service.
///
/// When both static credentials are present they are used directly;
/// otherwise the default AWS provider chain (environment, profile, role)
/// resolves them.
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    /// Custom endpoint (R2, `MinIO`). `None` targets AWS.
    pub endpoint_url: Option<String>,
    /// Region name. R2 expects `auto`.
    pub region: String,
    /// Static access key.
    pub access_key_id: Option<String>,
    /// Static secret key.
    pub secret_access_key: Option<String>,
}

/// Object store backed by one S3 bucket.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Wraps an existing client for `bucket`.
    #[must_use]
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Builds an S3 client from `settings`.
    ///
    /// Clients are cheap to clone, so one client can back several
    /// [`S3ObjectStore`]s.
    pub async fn connect(settings: &S3Settings) -> aws_sdk_s3::Client {
        let region = Region::new(settings.region.clone());

        let mut builder = if let (Some(access_key), Some(secret_key)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            let creds = Credentials::new(access_key, secret_key, None, None, "geotrack-env");
            aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .region(region)
                .credentials_provider(creds)
        } else {
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load()
                .await;
            aws_sdk_s3::config::Builder::from(&shared)
        };

        if let Some(endpoint) = &settings.endpoint_url {
            log::info!("Using S3 endpoint {endpoint}");
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let config = builder
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
            .build();

        aws_sdk_s3::Client::from_conf(config)
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    fn container(&self) -> &str {
        &self.bucket
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        log::debug!("Fetching s3://{}/{key}", self.bucket);

        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(GetObjectError::is_no_such_key)
                {
                    return Err(StoreError::NotFound {
                        container: self.bucket.clone(),
                        key: key.to_string(),
                    });
                }
                return Err(StoreError::Get {
                    container: self.bucket.clone(),
                    key: key.to_string(),
                    source: Box::new(err),
                });
            }
        };

        let bytes = output.body.collect().await.map_err(|e| StoreError::Get {
            container: self.bucket.clone(),
            key: key.to_string(),
            source: Box::new(e),
        })?;

        Ok(bytes.into_bytes().to_vec())
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        log::debug!(
            "Pushing {} bytes -> s3://{}/{key}",
            body.len(),
            self.bucket
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(aws_sdk_s3::primitives::ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StoreError::Put {
                container: self.bucket.clone(),
                key: key.to_string(),
                source: Box::new(e),
            })?;

        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        log::debug!("Listing s3://{}/{prefix}*", self.bucket);

        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(|e| StoreError::List {
                container: self.bucket.clone(),
                prefix: prefix.to_string(),
                source: Box::new(e),
            })?;

            for obj in output.contents() {
                if let Some(key) = obj.key() {
                    keys.push(key.to_string());
                }
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }

        keys.sort();
        log::debug!("  found {} objects", keys.len());
        Ok(keys)
    }
}
