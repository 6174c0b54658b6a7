//! # S3互換ブロブストア実装
//!
//! AWS S3, MinIO, Cloudflare R2 等のS3互換APIを使用するブロブストア実装。
//!
//! - 署名付きURLと再開可能アップロードのURIはクライアント向けバケットで発行する
//! - 一覧・読み書きは内部通信用バケットで行う

use std::time::Duration;

use blobgate_types::ObjectDescriptor;
use futures::{StreamExt, TryStreamExt};
use s3::error::S3Error;
use tokio_util::io::StreamReader;

use super::{BlobStore, ByteStream, ObjectStream, SignedUrlAction};
use crate::error::StoreError;

/// S3の署名付きURL有効期限の上限（SigV4: 7日）。
pub const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// 再開可能アップロード用URIの有効期限（1時間）。
pub const DEFAULT_UPLOAD_SESSION_EXPIRY: Duration = Duration::from_secs(60 * 60);

/// ダウンロード中継用の内部署名付きURLの有効期限（5分）。
const INTERNAL_READ_EXPIRY_SECS: u32 = 300;

/// 一覧取得時にHEADを並行発行する上限。
const LIST_HEAD_CONCURRENCY: usize = 16;

/// S3互換ストレージによるブロブストア実装。
pub struct S3BlobStore {
    /// 内部通信用バケット（一覧・読み書き）
    bucket_internal: s3::Bucket,
    /// クライアント向けバケット（署名付きURL生成用）。
    /// Docker内部ホスト名と外部ホスト名が異なる場合に使用。
    /// Noneの場合はbucket_internalを使用する。
    bucket_public: Option<s3::Bucket>,
    /// 読み取りストリーム中継用HTTPクライアント
    http_client: reqwest::Client,
    /// 再開可能アップロード用URIの有効期限
    upload_session_expiry: Duration,
}

impl S3BlobStore {
    /// S3互換バケットからブロブストアを構築する。
    pub fn new(bucket_internal: s3::Bucket, bucket_public: Option<s3::Bucket>) -> Self {
        Self {
            bucket_internal,
            bucket_public,
            http_client: reqwest::Client::new(),
            upload_session_expiry: DEFAULT_UPLOAD_SESSION_EXPIRY,
        }
    }

    /// 再開可能アップロード用URIの有効期限を変更する。
    pub fn with_upload_session_expiry(mut self, expiry: Duration) -> Self {
        self.upload_session_expiry = expiry;
        self
    }

    /// S3互換バケットを初期化する。
    fn init_bucket(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        bucket_name: &str,
    ) -> Result<s3::Bucket, StoreError> {
        // AWS S3エンドポイント（s3.REGION.amazonaws.com）からリージョンを自動検出。
        // 非AWSエンドポイントではus-east-1をフォールバックとして使用。
        let detected_region = std::env::var("S3_REGION").ok().unwrap_or_else(|| {
            endpoint
                .find("s3.")
                .and_then(|start| {
                    let rest = &endpoint[start + 3..];
                    rest.find(".amazonaws.com").map(|end| rest[..end].to_string())
                })
                .unwrap_or_else(|| "us-east-1".to_string())
        });
        let region = s3::Region::Custom {
            region: detected_region,
            endpoint: endpoint.to_string(),
        };

        let credentials =
            s3::creds::Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StoreError::Backend(format!("S3認証情報の構築に失敗: {e}")))?;

        let bucket = s3::Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StoreError::Backend(format!("S3バケットの初期化に失敗: {e}")))?
            .with_path_style();

        Ok(*bucket)
    }

    /// 環境変数から構築する。
    ///
    /// - `S3_ENDPOINT`, `S3_ACCESS_KEY`, `S3_SECRET_KEY`, `S3_BUCKET`
    /// - `S3_PUBLIC_ENDPOINT`: クライアント向け署名付きURLのエンドポイント（任意）
    /// - `S3_REGION`: リージョン（任意、未指定時はエンドポイントから推定）
    pub fn from_env() -> Result<Self, StoreError> {
        let endpoint = std::env::var("S3_ENDPOINT")
            .unwrap_or_else(|_| "http://localhost:9000".to_string());
        let access_key =
            std::env::var("S3_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".to_string());
        let secret_key =
            std::env::var("S3_SECRET_KEY").unwrap_or_else(|_| "minioadmin".to_string());
        let bucket_name =
            std::env::var("S3_BUCKET").unwrap_or_else(|_| "blobgate".to_string());

        let bucket_internal =
            Self::init_bucket(&endpoint, &access_key, &secret_key, &bucket_name)?;

        let bucket_public = std::env::var("S3_PUBLIC_ENDPOINT")
            .ok()
            .map(|public_ep| {
                tracing::info!(
                    s3_public_endpoint = %public_ep,
                    "クライアント向けS3エンドポイントを設定"
                );
                Self::init_bucket(&public_ep, &access_key, &secret_key, &bucket_name)
            })
            .transpose()?;

        tracing::info!(s3_endpoint = %endpoint, bucket = %bucket_name, "S3ブロブストアを初期化");
        Ok(Self::new(bucket_internal, bucket_public))
    }

    fn public_bucket(&self) -> &s3::Bucket {
        self.bucket_public.as_ref().unwrap_or(&self.bucket_internal)
    }

    async fn describe(&self, name: String, size: u64) -> Result<ObjectDescriptor, StoreError> {
        let (head, status) = self
            .bucket_internal
            .head_object(&name)
            .await
            .map_err(|e| map_s3_error(&name, "メタデータ取得", e))?;
        match status {
            200..=299 => {}
            404 => return Err(StoreError::NotFound(name)),
            other => {
                return Err(StoreError::Backend(format!(
                    "メタデータ取得に失敗 ({name}): HTTP {other}"
                )))
            }
        }
        let content_type = head
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Ok(ObjectDescriptor::new(name, content_type, size))
    }
}

/// S3エラーをStoreErrorに変換する。404はNotFoundとして扱う。
fn map_s3_error(name: &str, context: &str, e: S3Error) -> StoreError {
    match e {
        S3Error::HttpFailWithBody(404, _) => StoreError::NotFound(name.to_string()),
        other => StoreError::Backend(format!("{context}に失敗 ({name}): {other}")),
    }
}

/// 有効期限をS3の上限に切り詰めて秒数に変換する。
fn clamp_expiry_secs(expires_in: Duration) -> u32 {
    if expires_in > MAX_PRESIGN_EXPIRY {
        tracing::warn!(
            requested_secs = expires_in.as_secs(),
            max_secs = MAX_PRESIGN_EXPIRY.as_secs(),
            "署名付きURLの有効期限をS3の上限に切り詰めます"
        );
    }
    let secs = expires_in.min(MAX_PRESIGN_EXPIRY).as_secs().max(1);
    u32::try_from(secs).unwrap_or(u32::MAX)
}

#[async_trait::async_trait]
impl BlobStore for S3BlobStore {
    async fn list_objects(&self) -> Result<Vec<ObjectDescriptor>, StoreError> {
        let pages = self
            .bucket_internal
            .list(String::new(), None)
            .await
            .map_err(|e| StoreError::Backend(format!("オブジェクト一覧の取得に失敗: {e}")))?;

        let objects: Vec<(String, u64)> = pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| (object.key, object.size))
            .collect();

        futures::stream::iter(objects)
            .map(|(name, size)| self.describe(name, size))
            .buffered(LIST_HEAD_CONCURRENCY)
            .try_collect()
            .await
    }

    async fn open_read_stream(&self, name: &str) -> Result<ObjectStream, StoreError> {
        let url = self
            .bucket_internal
            .presign_get(name, INTERNAL_READ_EXPIRY_SECS, None)
            .await
            .map_err(|e| map_s3_error(name, "読み取りURL生成", e))?;

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("読み取りリクエストに失敗 ({name}): {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Backend(format!(
                "S3がエラーを返しました ({name}): HTTP {status} - {body}"
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let size = response.content_length();

        Ok(ObjectStream {
            content_type,
            size,
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map_err(std::io::Error::other))
                .boxed(),
        })
    }

    async fn put_stream<'a>(
        &self,
        name: &str,
        content_type: &str,
        body: ByteStream<'a>,
    ) -> Result<(), StoreError> {
        let mut reader = StreamReader::new(body);
        self.bucket_internal
            .put_object_stream_with_content_type(&mut reader, name, content_type)
            .await
            .map_err(|e| StoreError::Backend(format!("ストリーム書き込みに失敗 ({name}): {e}")))?;
        Ok(())
    }

    async fn begin_resumable_upload(
        &self,
        name: &str,
        content_type: &str,
    ) -> Result<String, StoreError> {
        tracing::debug!(object = %name, content_type = %content_type, "アップロードURIを発行");
        // Content-Typeを署名対象に含め、クライアントに同じ値での送信を強制する
        let mut headers = http::HeaderMap::new();
        let value = http::HeaderValue::from_str(content_type).map_err(|e| {
            StoreError::Backend(format!("Content-Typeが不正です ({content_type}): {e}"))
        })?;
        headers.insert(http::header::CONTENT_TYPE, value);
        self.public_bucket()
            .presign_put(
                name,
                clamp_expiry_secs(self.upload_session_expiry),
                Some(headers),
                None,
            )
            .await
            .map_err(|e| map_s3_error(name, "アップロードURI生成", e))
    }

    async fn sign_url(
        &self,
        name: &str,
        action: SignedUrlAction,
        expires_in: Duration,
    ) -> Result<String, StoreError> {
        let expiry_secs = clamp_expiry_secs(expires_in);
        match action {
            SignedUrlAction::Read => self
                .public_bucket()
                .presign_get(name, expiry_secs, None)
                .await
                .map_err(|e| map_s3_error(name, "署名付きURL生成", e)),
        }
    }
}
