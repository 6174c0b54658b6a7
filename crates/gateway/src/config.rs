//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use blobgate_core::resolver::{DEFAULT_RESOLVE_CONCURRENCY, DEFAULT_SIGNED_URL_EXPIRY};
use blobgate_core::{BlobStore, ResolverOptions, SignedUrlResolver, StreamingUploader, UrlCache};

/// アップロード最大サイズの既定値（2GB）。
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 2 * 1024 * 1024 * 1024;

/// ブロブストアのバックエンド。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobBackend {
    /// S3互換ストレージ
    S3,
    /// プロセス内メモリ（開発環境用）
    Memory,
}

impl FromStr for BlobBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(BlobBackend::S3),
            "memory" => Ok(BlobBackend::Memory),
            other => anyhow::bail!("BLOB_BACKENDは s3 または memory である必要があります: {other}"),
        }
    }
}

/// 一覧取得で一部の署名付きURL解決が失敗したときの扱い。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingPolicy {
    /// 1件でも失敗したら一覧全体を失敗させる
    FailFast,
    /// 成功分を返し、失敗分は `failures` に記録する
    Partial,
}

impl FromStr for ListingPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fail-fast" | "failfast" => Ok(ListingPolicy::FailFast),
            "partial" => Ok(ListingPolicy::Partial),
            other => anyhow::bail!(
                "LISTING_POLICYは fail-fast または partial である必要があります: {other}"
            ),
        }
    }
}

/// 起動時に環境変数から読み込む設定。
///
/// S3の接続情報（`S3_*`）は `S3BlobStore::from_env` が直接読む。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// 待ち受けアドレス
    pub listen_addr: String,
    /// ブロブストアのバックエンド
    pub backend: BlobBackend,
    /// メモリバックエンドのバケット名
    pub memory_bucket: String,
    /// URLキャッシュファイルのパス
    pub url_cache_path: String,
    /// 新規発行する署名付きURLの有効期限
    pub signed_url_expiry: Duration,
    /// 同時に実行する解決タスク数の上限
    pub resolve_concurrency: usize,
    /// キーごとに実行中の署名を1つに束ねるか
    pub dedupe_signing: bool,
    /// 一覧取得の失敗ポリシー
    pub listing_policy: ListingPolicy,
    /// 再開可能アップロードの対象オブジェクト名
    pub resumable_object_name: String,
    /// 再開可能アップロードのMIMEタイプ
    pub resumable_content_type: String,
    /// リクエストボディの最大サイズ（バイト）
    pub max_upload_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            backend: BlobBackend::S3,
            memory_bucket: "blobgate".to_string(),
            url_cache_path: "./filename-to-url.jsonl".to_string(),
            signed_url_expiry: DEFAULT_SIGNED_URL_EXPIRY,
            resolve_concurrency: DEFAULT_RESOLVE_CONCURRENCY,
            dedupe_signing: false,
            listing_policy: ListingPolicy::FailFast,
            resumable_object_name: "file.jpg".to_string(),
            resumable_content_type: "application/jpg".to_string(),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }
}

impl GatewayConfig {
    /// 環境変数から構築する。未設定の項目は既定値を使う。
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意のキー参照関数から構築する。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let parse = |key: &str| -> Option<String> {
            lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        };

        let signed_url_expiry = match parse("SIGNED_URL_EXPIRY_SECS") {
            Some(v) => Duration::from_secs(parse_number(&v, "SIGNED_URL_EXPIRY_SECS")?),
            None => defaults.signed_url_expiry,
        };
        let resolve_concurrency = match parse("RESOLVE_CONCURRENCY") {
            Some(v) => parse_number(&v, "RESOLVE_CONCURRENCY")?,
            None => defaults.resolve_concurrency,
        };
        if resolve_concurrency == 0 {
            anyhow::bail!("RESOLVE_CONCURRENCYは1以上である必要があります");
        }
        let max_upload_size = match parse("MAX_UPLOAD_SIZE") {
            Some(v) => parse_number(&v, "MAX_UPLOAD_SIZE")?,
            None => defaults.max_upload_size,
        };

        Ok(Self {
            listen_addr: parse("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            backend: parse("BLOB_BACKEND")
                .map(|v| v.parse::<BlobBackend>())
                .transpose()?
                .unwrap_or(defaults.backend),
            memory_bucket: parse("S3_BUCKET").unwrap_or(defaults.memory_bucket),
            url_cache_path: parse("URL_CACHE_PATH").unwrap_or(defaults.url_cache_path),
            signed_url_expiry,
            resolve_concurrency,
            dedupe_signing: parse("DEDUPE_SIGNING")
                .map(|v| parse_bool(&v, "DEDUPE_SIGNING"))
                .transpose()?
                .unwrap_or(defaults.dedupe_signing),
            listing_policy: parse("LISTING_POLICY")
                .map(|v| v.parse::<ListingPolicy>())
                .transpose()?
                .unwrap_or(defaults.listing_policy),
            resumable_object_name: parse("RESUMABLE_OBJECT_NAME")
                .unwrap_or(defaults.resumable_object_name),
            resumable_content_type: parse("RESUMABLE_CONTENT_TYPE")
                .unwrap_or(defaults.resumable_content_type),
            max_upload_size,
        })
    }

    /// リゾルバの設定。
    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            expires_in: self.signed_url_expiry,
            concurrency: self.resolve_concurrency,
            dedupe_signing: self.dedupe_signing,
        }
    }
}

fn parse_number<T: FromStr>(value: &str, key: &str) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| anyhow::anyhow!("{key}の値が不正です ({value}): {e}"))
}

fn parse_bool(value: &str, key: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("{key}は true または false である必要があります: {value}"),
    }
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// ブロブストア（S3互換等、トレイトで抽象化）
    pub store: Arc<dyn BlobStore>,
    /// 署名付きURLリゾルバ
    pub resolver: SignedUrlResolver,
    /// アップロードアダプタ
    pub uploader: StreamingUploader,
    /// 一覧取得の失敗ポリシー
    pub listing_policy: ListingPolicy,
    /// 再開可能アップロードの対象オブジェクト名
    pub resumable_object_name: String,
    /// 再開可能アップロードのMIMEタイプ
    pub resumable_content_type: String,
    /// リクエストボディの最大サイズ（バイト）
    pub max_upload_size: usize,
}

impl GatewayState {
    /// ブロブストアとURLキャッシュを注入して構築する。
    pub fn new(
        store: Arc<dyn BlobStore>,
        cache: Arc<dyn UrlCache>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            resolver: SignedUrlResolver::new(store.clone(), cache, config.resolver_options()),
            uploader: StreamingUploader::new(store.clone()),
            store,
            listing_policy: config.listing_policy,
            resumable_object_name: config.resumable_object_name.clone(),
            resumable_content_type: config.resumable_content_type.clone(),
            max_upload_size: config.max_upload_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.backend, BlobBackend::S3);
        assert_eq!(config.url_cache_path, "./filename-to-url.jsonl");
        assert_eq!(config.signed_url_expiry, Duration::from_secs(604_800));
        assert_eq!(config.listing_policy, ListingPolicy::FailFast);
        assert_eq!(config.resumable_object_name, "file.jpg");
        assert_eq!(config.resumable_content_type, "application/jpg");
        assert!(!config.dedupe_signing);
    }

    #[test]
    fn test_values_are_parsed() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("LISTEN_ADDR", "127.0.0.1:9999"),
            ("BLOB_BACKEND", "memory"),
            ("SIGNED_URL_EXPIRY_SECS", "3600"),
            ("RESOLVE_CONCURRENCY", "4"),
            ("DEDUPE_SIGNING", "true"),
            ("LISTING_POLICY", "partial"),
            ("MAX_UPLOAD_SIZE", "1048576"),
        ]))
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:9999");
        assert_eq!(config.backend, BlobBackend::Memory);
        assert_eq!(config.signed_url_expiry, Duration::from_secs(3600));
        assert_eq!(config.resolve_concurrency, 4);
        assert!(config.dedupe_signing);
        assert_eq!(config.listing_policy, ListingPolicy::Partial);
        assert_eq!(config.max_upload_size, 1_048_576);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(GatewayConfig::from_lookup(lookup(&[("BLOB_BACKEND", "gcs")])).is_err());
        assert!(GatewayConfig::from_lookup(lookup(&[("RESOLVE_CONCURRENCY", "0")])).is_err());
        assert!(GatewayConfig::from_lookup(lookup(&[("DEDUPE_SIGNING", "maybe")])).is_err());
        assert!(
            GatewayConfig::from_lookup(lookup(&[("SIGNED_URL_EXPIRY_SECS", "soon")])).is_err()
        );
    }
}
