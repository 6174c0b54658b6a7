//! # メモリ内URLキャッシュ

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::UrlCache;
use crate::error::CacheError;

/// プロセス内メモリのURLキャッシュ。プロセス終了で内容は失われる。
#[derive(Default)]
pub struct MemoryUrlCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryUrlCache {
    /// 空のキャッシュを作成する。
    pub fn new() -> Self {
        Self::default()
    }

    /// 保持しているエントリ数。
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// エントリが空かどうか。
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl UrlCache for MemoryUrlCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
