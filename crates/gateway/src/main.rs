//! # Blobgate Gateway
//!
//! ブロブストアへのアップロード・ダウンロードを中継し、
//! 一覧取得時の署名付きURLをキャッシュするHTTPサーバー。
//!
//! ## API エンドポイント
//! - `GET /files`: オブジェクト一覧（署名付きURL付き）
//! - `POST /upload`: マルチパートアップロード
//! - `GET /file/{*name}`: ダウンロード
//! - `GET /resumable`: 再開可能アップロードのセッション作成
//! - `GET /health`: 死活監視

mod config;
mod endpoints;
mod error;

use std::sync::Arc;

use blobgate_core::{BlobStore, FileUrlCache, MemoryBlobStore};

use crate::config::{BlobBackend, GatewayConfig, GatewayState};

/// 設定に従ってブロブストアを構築する。
fn build_store(config: &GatewayConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
    match config.backend {
        BlobBackend::Memory => {
            tracing::warn!(
                bucket = %config.memory_bucket,
                "メモリ内ブロブストアで起動します（開発環境用、内容は再起動で失われます）"
            );
            Ok(Arc::new(MemoryBlobStore::new(config.memory_bucket.clone())))
        }
        #[cfg(feature = "vendor-aws")]
        BlobBackend::S3 => Ok(Arc::new(blobgate_core::S3BlobStore::from_env()?)),
        #[cfg(not(feature = "vendor-aws"))]
        BlobBackend::S3 => {
            anyhow::bail!("S3バックエンドを使うには vendor-aws feature を有効にしてください")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::from_env()?;
    let store = build_store(&config)?;
    let cache = Arc::new(FileUrlCache::open(&config.url_cache_path).await?);
    tracing::info!(
        path = %cache.path().display(),
        entries = cache.entries().await.len(),
        "URLキャッシュを開きました"
    );

    tracing::info!(
        listing_policy = ?config.listing_policy,
        resolve_concurrency = config.resolve_concurrency,
        dedupe_signing = config.dedupe_signing,
        signed_url_expiry_secs = config.signed_url_expiry.as_secs(),
        "リゾルバ設定"
    );
    let state = Arc::new(GatewayState::new(store, cache, &config));
    let app = endpoints::router(state);

    tracing::info!("Gatewayを {} で起動します", config.listen_addr);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
