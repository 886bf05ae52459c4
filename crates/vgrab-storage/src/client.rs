//! S3-compatible client implementation.

use std::collections::HashMap;
use std::path::Path;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use chrono::{DateTime, TimeZone, Utc};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::keys::storage_key;

/// Multipart part size: 10 MiB.
const PART_SIZE: usize = 10 * 1024 * 1024;

/// Maximum parts uploading concurrently.
const PART_QUEUE_SIZE: usize = 4;

/// User-metadata keys attached to every uploaded object.
const META_VIDEO_URL: &str = "x-video-url";
const META_SOURCE_URL: &str = "x-source-url";
const META_UPLOADED_AT: &str = "x-uploaded-at";

/// User metadata attached to an upload.
#[derive(Debug, Clone, Default)]
pub struct UploadMetadata {
    /// Media URL the object was downloaded from
    pub video_url: Option<String>,
    /// Page the media was discovered on
    pub source_url: Option<String>,
    /// Upload timestamp (RFC 3339)
    pub uploaded_at: Option<String>,
}

impl UploadMetadata {
    fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        if let Some(v) = &self.video_url {
            map.insert(META_VIDEO_URL.to_string(), v.clone());
        }
        if let Some(v) = &self.source_url {
            map.insert(META_SOURCE_URL.to_string(), v.clone());
        }
        map.insert(
            META_UPLOADED_AT.to_string(),
            self.uploaded_at.clone().unwrap_or_else(|| Utc::now().to_rfc3339()),
        );
        map
    }

    /// Project the fields of interest out of a raw metadata map.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        Self {
            video_url: map.get(META_VIDEO_URL).cloned(),
            source_url: map.get(META_SOURCE_URL).cloned(),
            uploaded_at: map.get(META_UPLOADED_AT).cloned(),
        }
    }
}

/// Result of a HEAD on one object.
#[derive(Debug, Clone, Default)]
pub struct ObjectStat {
    pub exists: bool,
    pub size: u64,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

/// One object in a listing.
#[derive(Debug, Clone)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct ObjectListing {
    pub objects: Vec<ObjectSummary>,
    pub next_token: Option<String>,
    pub is_truncated: bool,
}

/// S3-compatible object store client.
///
/// Holds no connection when unconfigured; every operation then returns
/// `StorageError::NotConfigured` so admin actions can 400 and background
/// work can skip.
#[derive(Clone)]
pub struct StorageClient {
    inner: Option<Client>,
    config: StorageConfig,
}

impl StorageClient {
    /// Create a client from configuration. An incomplete configuration
    /// yields a client whose operations fail with `NotConfigured`.
    pub fn new(config: StorageConfig) -> Self {
        let inner = if config.is_configured() {
            let credentials = Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None,
                None,
                "vgrab",
            );
            let sdk_config = Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .endpoint_url(&config.endpoint)
                .region(Region::new(config.region.clone()))
                .credentials_provider(credentials)
                .force_path_style(config.path_style)
                .build();
            Some(Client::from_conf(sdk_config))
        } else {
            None
        };

        Self { inner, config }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self::new(StorageConfig::from_env())
    }

    /// Whether the client can talk to a bucket.
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }

    /// Effective configuration.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Deterministic key for a media URL under the configured prefix.
    pub fn key_for(&self, url: &str) -> String {
        storage_key(&self.config.key_prefix, url)
    }

    fn client(&self) -> StorageResult<&Client> {
        self.inner
            .as_ref()
            .ok_or_else(|| StorageError::not_configured("object storage is not configured"))
    }

    /// HEAD the bucket to verify connectivity and credentials.
    pub async fn validate_connection(&self) -> StorageResult<()> {
        self.client()?
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("bucket check failed: {}", e)))?;
        Ok(())
    }

    /// Upload a local file under `key` using multipart upload.
    pub async fn upload_from_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
        metadata: &UploadMetadata,
    ) -> StorageResult<String> {
        self.upload_from_file_with_progress(path, key, content_type, metadata, |_, _| {})
            .await
    }

    /// Upload a local file with a progress callback `(bytes_done, total)`.
    ///
    /// Parts of `PART_SIZE` bytes are uploaded with at most
    /// `PART_QUEUE_SIZE` in flight. On any part failure the multipart
    /// upload is aborted so no orphaned parts accumulate.
    pub async fn upload_from_file_with_progress<F>(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
        metadata: &UploadMetadata,
        on_progress: F,
    ) -> StorageResult<String>
    where
        F: Fn(u64, u64) + Send + Sync,
    {
        let client = self.client()?;
        let path = path.as_ref();
        let total = tokio::fs::metadata(path).await?.len();

        debug!(key, total, "starting multipart upload");

        let create = client
            .create_multipart_upload()
            .bucket(&self.config.bucket)
            .key(key)
            .content_type(content_type)
            .set_metadata(Some(metadata.to_map()))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        let upload_id = create
            .upload_id()
            .ok_or_else(|| StorageError::upload_failed("no upload id returned"))?
            .to_string();

        match self
            .upload_parts(client, path, key, &upload_id, total, &on_progress)
            .await
        {
            Ok(parts) => {
                let completed = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();
                client
                    .complete_multipart_upload()
                    .bucket(&self.config.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await
                    .map_err(|e| StorageError::upload_failed(e.to_string()))?;

                info!(key, total, "multipart upload complete");
                Ok(self.get_public_url(key))
            }
            Err(e) => {
                if let Err(abort_err) = client
                    .abort_multipart_upload()
                    .bucket(&self.config.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(key, "failed to abort multipart upload: {}", abort_err);
                }
                Err(e)
            }
        }
    }

    async fn upload_parts<F>(
        &self,
        client: &Client,
        path: &Path,
        key: &str,
        upload_id: &str,
        total: u64,
        on_progress: &F,
    ) -> StorageResult<Vec<CompletedPart>>
    where
        F: Fn(u64, u64) + Send + Sync,
    {
        let mut file = tokio::fs::File::open(path).await?;
        let mut parts: Vec<CompletedPart> = Vec::new();
        let mut in_flight = tokio::task::JoinSet::new();
        let mut part_number: i32 = 0;
        let mut bytes_done: u64 = 0;
        let mut eof = false;

        while !eof || !in_flight.is_empty() {
            // Fill the queue up to PART_QUEUE_SIZE.
            while !eof && in_flight.len() < PART_QUEUE_SIZE {
                let mut buf = vec![0u8; PART_SIZE];
                let mut read = 0usize;
                while read < buf.len() {
                    let n = file.read(&mut buf[read..]).await?;
                    if n == 0 {
                        eof = true;
                        break;
                    }
                    read += n;
                }
                buf.truncate(read);
                if buf.is_empty() && part_number > 0 {
                    break;
                }

                part_number += 1;
                let number = part_number;
                let len = buf.len() as u64;
                let request = client
                    .upload_part()
                    .bucket(&self.config.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(number)
                    .body(ByteStream::from(buf));

                in_flight.spawn(async move {
                    let response = request
                        .send()
                        .await
                        .map_err(|e| StorageError::upload_failed(e.to_string()))?;
                    Ok::<_, StorageError>((number, len, response.e_tag().map(String::from)))
                });

                if eof {
                    break;
                }
            }

            // Drain one completion before reading more.
            if let Some(joined) = in_flight.join_next().await {
                let (number, len, etag) = joined
                    .map_err(|e| StorageError::upload_failed(format!("part task failed: {}", e)))??;
                bytes_done += len;
                on_progress(bytes_done, total);
                parts.push(
                    CompletedPart::builder()
                        .part_number(number)
                        .set_e_tag(etag)
                        .build(),
                );
            }
        }

        parts.sort_by_key(|p| p.part_number());
        Ok(parts)
    }

    /// Delete an object, handling versioned buckets: every version and
    /// delete marker for the key is removed, falling back to a single
    /// unversioned delete when version listing is unsupported.
    pub async fn delete_object(&self, key: &str) -> StorageResult<()> {
        let client = self.client()?;

        match client
            .list_object_versions()
            .bucket(&self.config.bucket)
            .prefix(key)
            .send()
            .await
        {
            Ok(listing) => {
                let mut deleted = 0usize;
                for version in listing.versions() {
                    if version.key() != Some(key) {
                        continue;
                    }
                    let mut req = client
                        .delete_object()
                        .bucket(&self.config.bucket)
                        .key(key);
                    if let Some(id) = version.version_id() {
                        req = req.version_id(id);
                    }
                    req.send()
                        .await
                        .map_err(|e| StorageError::delete_failed(e.to_string()))?;
                    deleted += 1;
                }
                for marker in listing.delete_markers() {
                    if marker.key() != Some(key) {
                        continue;
                    }
                    let mut req = client
                        .delete_object()
                        .bucket(&self.config.bucket)
                        .key(key);
                    if let Some(id) = marker.version_id() {
                        req = req.version_id(id);
                    }
                    req.send()
                        .await
                        .map_err(|e| StorageError::delete_failed(e.to_string()))?;
                    deleted += 1;
                }

                if deleted == 0 {
                    // Unversioned bucket or already gone; plain delete.
                    client
                        .delete_object()
                        .bucket(&self.config.bucket)
                        .key(key)
                        .send()
                        .await
                        .map_err(|e| StorageError::delete_failed(e.to_string()))?;
                }
                debug!(key, deleted, "deleted object");
                Ok(())
            }
            Err(e) => {
                debug!(key, "version listing failed ({}), plain delete", e);
                client
                    .delete_object()
                    .bucket(&self.config.bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| StorageError::delete_failed(e.to_string()))?;
                Ok(())
            }
        }
    }

    /// HEAD one object; a 404 maps to `exists: false`.
    pub async fn check_object_exists(&self, key: &str) -> StorageResult<ObjectStat> {
        let client = self.client()?;
        match client
            .head_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(head) => Ok(ObjectStat {
                exists: true,
                size: head.content_length().unwrap_or(0).max(0) as u64,
                content_type: head.content_type().map(String::from),
                metadata: head.metadata().cloned().unwrap_or_default(),
                last_modified: head
                    .last_modified()
                    .and_then(|t| t.to_millis().ok())
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
                etag: head.e_tag().map(String::from),
            }),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("NotFound") || msg.contains("NoSuchKey") || msg.contains("404") {
                    Ok(ObjectStat::default())
                } else {
                    Err(StorageError::head_failed(msg))
                }
            }
        }
    }

    /// List one page of objects.
    pub async fn list_objects(
        &self,
        continuation_token: Option<String>,
        prefix: Option<&str>,
        max_keys: i32,
    ) -> StorageResult<ObjectListing> {
        let client = self.client()?;
        let mut request = client
            .list_objects_v2()
            .bucket(&self.config.bucket)
            .max_keys(max_keys);

        if let Some(prefix) = prefix {
            request = request.prefix(prefix);
        }
        if let Some(token) = continuation_token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::ListFailed(e.to_string()))?;

        let objects = response
            .contents()
            .iter()
            .map(|obj| ObjectSummary {
                key: obj.key().unwrap_or_default().to_string(),
                size: obj.size().unwrap_or(0).max(0) as u64,
                last_modified: obj
                    .last_modified()
                    .and_then(|t| t.to_millis().ok())
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            })
            .collect();

        Ok(ObjectListing {
            objects,
            is_truncated: response.is_truncated() == Some(true),
            next_token: response.next_continuation_token().map(String::from),
        })
    }

    /// Fetch the user metadata of interest for one object.
    pub async fn get_object_metadata(&self, key: &str) -> StorageResult<UploadMetadata> {
        let stat = self.check_object_exists(key).await?;
        if !stat.exists {
            return Err(StorageError::not_found(key));
        }
        Ok(UploadMetadata::from_map(&stat.metadata))
    }

    /// Public URL for an object key, honoring the CDN base when set.
    pub fn get_public_url(&self, key: &str) -> String {
        if let Some(cdn) = &self.config.cdn_url {
            return format!("{}/{}", cdn.trim_end_matches('/'), key);
        }
        let endpoint = self.config.endpoint.trim_end_matches('/');
        if self.config.path_style {
            format!("{}/{}/{}", endpoint, self.config.bucket, key)
        } else {
            // Virtual-hosted style: scheme://bucket.host/key
            match endpoint.split_once("://") {
                Some((scheme, host)) => {
                    format!("{}://{}.{}/{}", scheme, self.config.bucket, host, key)
                }
                None => format!("{}/{}/{}", endpoint, self.config.bucket, key),
            }
        }
    }

    /// Inverse of `get_public_url`.
    pub fn extract_key_from_url(&self, url: &str) -> Option<String> {
        if let Some(cdn) = &self.config.cdn_url {
            let base = format!("{}/", cdn.trim_end_matches('/'));
            if let Some(key) = url.strip_prefix(&base) {
                return Some(key.to_string());
            }
        }

        let endpoint = self.config.endpoint.trim_end_matches('/');
        if self.config.path_style {
            let base = format!("{}/{}/", endpoint, self.config.bucket);
            url.strip_prefix(&base).map(String::from)
        } else {
            match endpoint.split_once("://") {
                Some((scheme, host)) => {
                    let base = format!("{}://{}.{}/", scheme, self.config.bucket, host);
                    url.strip_prefix(&base).map(String::from)
                }
                None => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(cdn: Option<&str>, path_style: bool) -> StorageConfig {
        StorageConfig {
            endpoint: "https://s3.example.com".into(),
            bucket: "media".into(),
            region: "auto".into(),
            access_key_id: "id".into(),
            secret_access_key: "secret".into(),
            key_prefix: "videos/".into(),
            cdn_url: cdn.map(String::from),
            path_style,
        }
    }

    #[test]
    fn test_unconfigured_client_reports_it() {
        let client = StorageClient::new(StorageConfig::default());
        assert!(!client.is_configured());
    }

    #[test]
    fn test_public_url_path_style_roundtrip() {
        let client = StorageClient::new(test_config(None, true));
        let key = client.key_for("https://v.com/a/clip.mp4?x=1");
        let url = client.get_public_url(&key);
        assert_eq!(client.extract_key_from_url(&url).as_deref(), Some(key.as_str()));
    }

    #[test]
    fn test_public_url_virtual_style_roundtrip() {
        let client = StorageClient::new(test_config(None, false));
        let key = client.key_for("https://v.com/a/clip.mp4");
        let url = client.get_public_url(&key);
        assert!(url.starts_with("https://media.s3.example.com/"));
        assert_eq!(client.extract_key_from_url(&url).as_deref(), Some(key.as_str()));
    }

    #[test]
    fn test_public_url_cdn_roundtrip() {
        let client = StorageClient::new(test_config(Some("https://cdn.example.com"), true));
        let key = client.key_for("https://v.com/a/clip.m3u8?token=1");
        let url = client.get_public_url(&key);
        assert!(url.starts_with("https://cdn.example.com/"));
        assert_eq!(client.extract_key_from_url(&url).as_deref(), Some(key.as_str()));
    }

    #[test]
    fn test_key_for_applies_prefix() {
        let client = StorageClient::new(test_config(None, true));
        assert!(client.key_for("https://v.com/clip.mp4").starts_with("videos/"));
    }

    #[test]
    fn test_metadata_map_roundtrip() {
        let meta = UploadMetadata {
            video_url: Some("https://v.com/clip.mp4".into()),
            source_url: Some("https://page.com".into()),
            uploaded_at: Some("2026-01-01T00:00:00Z".into()),
        };
        let round = UploadMetadata::from_map(&meta.to_map());
        assert_eq!(round.video_url, meta.video_url);
        assert_eq!(round.source_url, meta.source_url);
        assert_eq!(round.uploaded_at, meta.uploaded_at);
    }
}
