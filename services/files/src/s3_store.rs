use crate::config::S3Config;
use crate::object_store::{ObjectStore, ObjectStoreError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
};
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info, instrument, warn};

/// Object store backed by S3 or an S3-compatible server such as MinIO
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    region: String,
    multipart_threshold_bytes: usize,
    part_size_bytes: usize,
}

impl S3ObjectStore {
    /// Create a new S3 object store client
    pub async fn new(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "files-service",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let endpoint_url = config.endpoint_url();
        let s3_config = S3ConfigBuilder::from(&aws_config)
            .endpoint_url(&endpoint_url)
            // Path-style access for MinIO compatibility
            .force_path_style(config.force_path_style)
            .build();
        let client = S3Client::from_conf(s3_config);

        info!(
            bucket = %config.bucket,
            endpoint = %endpoint_url,
            region = %config.region,
            "S3 object store initialized"
        );

        Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            multipart_threshold_bytes: config.multipart_threshold_bytes,
            part_size_bytes: config.part_size_bytes,
        }
    }

    /// Create the bucket if it does not exist yet
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn ensure_bucket(&self) -> Result<(), ObjectStoreError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!("Bucket already exists");
                return Ok(());
            }
            Err(e) if e.as_service_error().map(|e| e.is_not_found()).unwrap_or(false) => {}
            Err(e) => return Err(classify_sdk_error(e)),
        }

        let mut request = self.client.create_bucket().bucket(&self.bucket);
        // us-east-1 is the one region that rejects an explicit constraint
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        request.send().await.map_err(classify_sdk_error)?;

        info!("Bucket created");
        Ok(())
    }

    /// Simple single-part upload for small files
    async fn simple_upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(classify_sdk_error)?;

        Ok(())
    }

    /// Multipart upload for large files
    ///
    /// A failed part aborts the whole upload so no partial object is left
    /// behind under `key`.
    async fn multipart_upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(classify_sdk_error)?;

        let upload_id = create_response
            .upload_id()
            .ok_or_else(|| ObjectStoreError::Backend("No upload ID in response".to_string()))?
            .to_string();

        match self.upload_parts(key, &upload_id, &data).await {
            Ok(completed_parts) => {
                let completed_upload = CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build();

                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed_upload)
                    .send()
                    .await
                    .map_err(classify_sdk_error)?;

                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(
                        key = %key,
                        upload_id = %upload_id,
                        error = %DisplayErrorContext(&abort_err),
                        "Failed to abort multipart upload"
                    );
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        data: &[u8],
    ) -> Result<Vec<CompletedPart>, ObjectStoreError> {
        let mut completed_parts = Vec::new();

        for (index, chunk) in data.chunks(self.part_size_bytes).enumerate() {
            let part_number = index as i32 + 1;

            let upload_part_response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk.to_vec()))
                .send()
                .await
                .map_err(classify_sdk_error)?;

            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(upload_part_response.e_tag().unwrap_or_default())
                    .build(),
            );
        }

        Ok(completed_parts)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, data), fields(key = %key, size_bytes = data.len()))]
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let size_bytes = data.len();

        if size_bytes > self.multipart_threshold_bytes {
            self.multipart_upload(key, data, content_type).await?;
        } else {
            self.simple_upload(key, data, content_type).await?;
        }

        debug!(key = %key, size_bytes, "Object uploaded");
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_service_error().map(|e| e.is_no_such_key()).unwrap_or(false) => {
                return Err(ObjectStoreError::NotFound(key.to_string()));
            }
            Err(e) => return Err(classify_sdk_error(e)),
        };

        // A body that breaks off mid-stream is a transport failure
        let body = response
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Unavailable(e.to_string()))?;

        Ok(body.into_bytes().to_vec())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(classify_sdk_error)?;

        debug!(key = %key, "Object deleted");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().map(|e| e.is_not_found()).unwrap_or(false) => Ok(false),
            Err(e) => Err(classify_sdk_error(e)),
        }
    }

    async fn ping(&self) -> Result<(), ObjectStoreError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(classify_sdk_error)?;
        Ok(())
    }
}

/// Map an SDK error onto the object store error taxonomy
fn classify_sdk_error<E, R>(err: SdkError<E, R>) -> ObjectStoreError
where
    E: std::error::Error + ProvideErrorMetadata + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let unavailable = match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(service) => is_throttle_or_outage(service.err().code()),
        _ => false,
    };

    let message = DisplayErrorContext(&err).to_string();
    if unavailable {
        ObjectStoreError::Unavailable(message)
    } else {
        ObjectStoreError::Backend(message)
    }
}

fn is_throttle_or_outage(code: Option<&str>) -> bool {
    matches!(
        code,
        Some("ServiceUnavailable" | "SlowDown" | "InternalError" | "RequestTimeout")
    )
}
