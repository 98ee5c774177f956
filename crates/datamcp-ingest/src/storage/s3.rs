//! AWS SDK implementation of [`ObjectClient`]

use super::object::{ListPage, ObjectClient};
use crate::config::ObjectStoreConfig;
use crate::error::BoxError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{http::HttpResponse, Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    Client,
};
use std::path::Path;
use tracing::{debug, info};

const NOT_FOUND_CODES: &[&str] = &["404", "NoSuchKey", "NotFound"];

#[derive(Clone)]
pub struct S3ObjectClient {
    client: Client,
}

impl S3ObjectClient {
    /// Build a client from the shared AWS configuration chain plus any
    /// endpoint, region or static-credential overrides.
    pub async fn connect(config: &ObjectStoreConfig) -> Self {
        debug!("Initializing object storage client with config: {:?}", config);

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some((access_key, secret_key)) = config.static_credentials() {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "datamcp-env",
            ));
        }
        let shared = loader.load().await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(
            endpoint = config.endpoint.as_deref().unwrap_or("aws"),
            "Object storage client initialized"
        );

        Self::from_client(Client::from_conf(builder.build()))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn backend_error<E, R>(err: SdkError<E, R>) -> BoxError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    DisplayErrorContext(&err).to_string().into()
}

fn is_not_found<E>(err: &SdkError<E, HttpResponse>) -> bool
where
    E: ProvideErrorMetadata,
{
    let code_matches = err
        .as_service_error()
        .and_then(|service| service.code())
        .is_some_and(|code| NOT_FOUND_CODES.contains(&code));
    code_matches
        || err
            .raw_response()
            .is_some_and(|raw| raw.status().as_u16() == 404)
}

#[async_trait]
impl ObjectClient for S3ObjectClient {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<bool, BoxError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(err) => Err(backend_error(err)),
        }
    }

    async fn get_object_to_file(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), BoxError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(backend_error)?;

        let mut body = response.body.into_async_read();
        let mut file = tokio::fs::File::create(dest).await?;
        let bytes = tokio::io::copy(&mut body, &mut file).await?;
        file.sync_all().await?;

        debug!("Downloaded {} bytes from s3://{}/{}", bytes, bucket, key);
        Ok(())
    }

    async fn put_object_from_file(&self, src: &Path, bucket: &str, key: &str) -> Result<(), BoxError> {
        let body = ByteStream::from_path(src).await?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(backend_error)?;

        debug!("Uploaded {} to s3://{}/{}", src.display(), bucket, key);
        Ok(())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage, BoxError> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(backend_error)?;

        let keys = response
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();
        let next_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage { keys, next_token })
    }
}
