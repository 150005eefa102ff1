//! A simplified S3 client that supports downloading and uploading whole objects.
//! It attempts to hide the complexities of working with the AWS SDK for S3.

use std::fmt::Display;

use aws_credential_types::Credentials;
use aws_sdk_s3::config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use bytes::Bytes;
use mime::Mime;
use tracing::Instrument;
use url::Url;

use crate::error::ReductionError;

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Clone, Eq, Hash, PartialEq)]
pub enum S3Credentials {
    AccessKey {
        access_key: String,
        secret_key: String,
    },
    None,
}

impl S3Credentials {
    /// Create an access key credential.
    pub fn access_key(access_key: &str, secret_key: &str) -> Self {
        S3Credentials::AccessKey {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    /// Access key credentials if both parts are given, otherwise none.
    pub fn from_options(access_key: Option<&str>, secret_key: Option<&str>) -> Self {
        match (access_key, secret_key) {
            (Some(access_key), Some(secret_key)) => Self::access_key(access_key, secret_key),
            _ => S3Credentials::None,
        }
    }
}

/// S3 client object.
#[derive(Clone)]
pub struct S3Client {
    /// Underlying AWS SDK S3 client object.
    client: Client,
    /// A unique identifier for the client
    id: String,
}

impl Display for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl S3Client {
    /// Creates an S3Client object
    ///
    /// # Arguments
    ///
    /// * `endpoint`: Optional object storage API URL. Defaults to AWS.
    /// * `region`: Optional region name
    /// * `credentials`: Object storage account credentials
    pub async fn new(endpoint: Option<&Url>, region: Option<&str>, credentials: S3Credentials) -> Self {
        let region = Region::new(region.unwrap_or(DEFAULT_REGION).to_string());
        let builder = aws_sdk_s3::Config::builder().behavior_version(BehaviorVersion::latest());
        let builder = match credentials {
            S3Credentials::AccessKey {
                access_key,
                secret_key,
            } => {
                let credentials = Credentials::from_keys(access_key, secret_key, None);
                builder.credentials_provider(credentials)
            }
            S3Credentials::None => builder,
        };
        let builder = match endpoint {
            // Non-AWS object stores generally need path style addressing.
            Some(url) => builder.endpoint_url(url.to_string()).force_path_style(true),
            None => builder,
        };
        let s3_config = builder.region(Some(region)).build();
        let client = Client::from_conf(s3_config);
        Self {
            client,
            id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Downloads an object from object storage and returns the data as Bytes
    ///
    /// # Arguments
    ///
    /// * `bucket`: Name of the bucket
    /// * `key`: Name of the object in the bucket
    pub async fn download_object(&self, bucket: &str, key: &str) -> Result<Bytes, ReductionError> {
        tracing::debug!("Downloading s3://{}/{} with client {}", bucket, key, self);
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .instrument(tracing::Span::current())
            .await?;
        let data = response
            .body
            .collect()
            .instrument(tracing::Span::current())
            .await?;
        Ok(data.into_bytes())
    }

    /// Uploads an object to object storage, replacing any existing object
    ///
    /// # Arguments
    ///
    /// * `bucket`: Name of the bucket
    /// * `key`: Name of the object in the bucket
    /// * `data`: Object data
    /// * `content_type`: MIME type of the data
    pub async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &Mime,
    ) -> Result<(), ReductionError> {
        tracing::debug!("Uploading {} bytes to s3://{}/{} with client {}", data.len(), bucket, key, self);
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type.to_string())
            .body(ByteStream::from(data))
            .send()
            .instrument(tracing::Span::current())
            .await?;
        Ok(())
    }
}
