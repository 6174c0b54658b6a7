//! # エンドポイントテスト用共通ヘルパー
//!
//! メモリ内ブロブストアとURLキャッシュでGatewayを起動する。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use blobgate_core::{
    BlobStore, ByteStream, MemoryBlobStore, MemoryUrlCache, ObjectStream, SignedUrlAction,
    StoreError,
};
use blobgate_types::ObjectDescriptor;

use crate::config::{GatewayConfig, GatewayState};

/// 起動済みのテスト用Gateway。
pub struct TestGateway {
    pub base_url: String,
    pub store: Arc<MemoryBlobStore>,
    pub cache: Arc<MemoryUrlCache>,
}

/// メモリバックエンドの既定設定。
pub fn memory_config() -> GatewayConfig {
    GatewayConfig {
        memory_bucket: "test".to_string(),
        ..GatewayConfig::default()
    }
}

/// メモリ内ストアでGatewayを起動する。
pub async fn spawn_gateway(config: GatewayConfig) -> TestGateway {
    let store = Arc::new(MemoryBlobStore::new(config.memory_bucket.clone()));
    let cache = Arc::new(MemoryUrlCache::new());
    let base_url = spawn_gateway_with(store.clone(), cache.clone(), &config).await;
    TestGateway {
        base_url,
        store,
        cache,
    }
}

/// 任意のストアでGatewayを起動し、ベースURLを返す。
pub async fn spawn_gateway_with(
    store: Arc<dyn BlobStore>,
    cache: Arc<MemoryUrlCache>,
    config: &GatewayConfig,
) -> String {
    let state = Arc::new(GatewayState::new(store, cache, config));
    let app = super::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    format!("http://127.0.0.1:{port}")
}

/// 指定した名前の署名と、全ての書き込みを拒否するストア。
pub struct FlakyStore {
    pub inner: MemoryBlobStore,
    pub unsignable: HashSet<String>,
    pub reject_writes: bool,
}

impl FlakyStore {
    pub fn new(unsignable: &[&str]) -> Self {
        Self {
            inner: MemoryBlobStore::new("test"),
            unsignable: unsignable.iter().map(|s| s.to_string()).collect(),
            reject_writes: false,
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for FlakyStore {
    async fn list_objects(&self) -> Result<Vec<ObjectDescriptor>, StoreError> {
        self.inner.list_objects().await
    }

    async fn open_read_stream(&self, name: &str) -> Result<ObjectStream, StoreError> {
        self.inner.open_read_stream(name).await
    }

    async fn put_stream<'a>(
        &self,
        name: &str,
        content_type: &str,
        body: ByteStream<'a>,
    ) -> Result<(), StoreError> {
        if self.reject_writes {
            return Err(StoreError::Backend("バケットは読み取り専用です".to_string()));
        }
        self.inner.put_stream(name, content_type, body).await
    }

    async fn begin_resumable_upload(
        &self,
        name: &str,
        content_type: &str,
    ) -> Result<String, StoreError> {
        self.inner.begin_resumable_upload(name, content_type).await
    }

    async fn sign_url(
        &self,
        name: &str,
        action: SignedUrlAction,
        expires_in: Duration,
    ) -> Result<String, StoreError> {
        if self.unsignable.contains(name) {
            return Err(StoreError::Backend(format!("署名を拒否: {name}")));
        }
        self.inner.sign_url(name, action, expires_in).await
    }
}
