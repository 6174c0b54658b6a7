//! # メモリ内ブロブストア実装
//!
//! プロセス内のマップにオブジェクトを保持するブロブストア。
//! 開発環境（`BLOB_BACKEND=memory`）とテストで使用する。
//!
//! 署名付きURLは `memory://` スキームで、ストアごとのランダム鍵による
//! HMAC-SHA256署名を含む。

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use blobgate_types::ObjectDescriptor;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use tokio::sync::RwLock;

use super::{BlobStore, ByteStream, ObjectStream, SignedUrlAction};
use crate::error::StoreError;
use crate::object_name::encode_path;

/// 読み取りストリームのチャンクサイズ（64 KiB）。
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

/// 格納済みオブジェクト。
#[derive(Debug, Clone)]
struct StoredObject {
    content_type: String,
    data: Bytes,
}

/// メモリ内ブロブストア。
pub struct MemoryBlobStore {
    bucket: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    signing_key: [u8; 32],
    read_chunk_size: usize,
}

impl MemoryBlobStore {
    /// 新しい空のストアを作成する。
    pub fn new(bucket: impl Into<String>) -> Self {
        let mut signing_key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut signing_key);
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(BTreeMap::new()),
            signing_key,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }

    /// 読み取りストリームのチャンクサイズを変更する。
    pub fn with_read_chunk_size(mut self, chunk_size: usize) -> Self {
        self.read_chunk_size = chunk_size.max(1);
        self
    }

    /// オブジェクトを直接格納する。
    pub async fn insert(&self, name: &str, content_type: &str, data: impl Into<Bytes>) {
        self.objects.write().await.insert(
            name.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                data: data.into(),
            },
        );
    }

    /// オブジェクトの内容を取得する。
    pub async fn get_bytes(&self, name: &str) -> Option<Bytes> {
        self.objects.read().await.get(name).map(|o| o.data.clone())
    }

    /// 署名付きURLが本ストアで発行されたものか検証する。
    pub fn verify_signed_url(&self, url: &str) -> bool {
        let Some((base, query)) = url.split_once('?') else {
            return false;
        };
        let Some(name) = base.strip_prefix(&format!("memory://{}/", self.bucket)) else {
            return false;
        };

        let mut action = None;
        let mut expires = None;
        let mut signature = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("action", v)) => action = Some(v),
                Some(("expires", v)) => expires = v.parse::<u64>().ok(),
                Some(("signature", v)) => signature = Some(v),
                _ => {}
            }
        }
        let (Some(action), Some(expires), Some(signature)) = (action, expires, signature) else {
            return false;
        };
        let Ok(signature) = hex::decode(signature) else {
            return false;
        };

        match self.mac(name, action, expires) {
            Ok(mac) => mac.verify_slice(&signature).is_ok(),
            Err(_) => false,
        }
    }

    fn mac(&self, name: &str, action: &str, expires: u64) -> Result<Hmac<Sha256>, StoreError> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.signing_key)
            .map_err(|e| StoreError::Backend(format!("HMAC初期化失敗: {e}")))?;
        mac.update(self.bucket.as_bytes());
        mac.update(b"\n");
        mac.update(name.as_bytes());
        mac.update(b"\n");
        mac.update(action.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list_objects(&self) -> Result<Vec<ObjectDescriptor>, StoreError> {
        Ok(self
            .objects
            .read()
            .await
            .iter()
            .map(|(name, o)| ObjectDescriptor::new(name, &o.content_type, o.data.len() as u64))
            .collect())
    }

    async fn open_read_stream(&self, name: &str) -> Result<ObjectStream, StoreError> {
        let object = self
            .objects
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let data = object.data;

        let chunk_size = self.read_chunk_size;
        let chunks: Vec<std::io::Result<Bytes>> = (0..data.len())
            .step_by(chunk_size)
            .map(|start| Ok(data.slice(start..(start + chunk_size).min(data.len()))))
            .collect();
        Ok(ObjectStream {
            content_type: Some(object.content_type),
            size: Some(data.len() as u64),
            body: futures::stream::iter(chunks).boxed(),
        })
    }

    async fn put_stream<'a>(
        &self,
        name: &str,
        content_type: &str,
        mut body: ByteStream<'a>,
    ) -> Result<(), StoreError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| {
                StoreError::Backend(format!("書き込みストリームが中断されました ({name}): {e}"))
            })?;
            buf.extend_from_slice(&chunk);
        }
        self.insert(name, content_type, buf.freeze()).await;
        Ok(())
    }

    async fn begin_resumable_upload(
        &self,
        name: &str,
        content_type: &str,
    ) -> Result<String, StoreError> {
        Ok(format!(
            "memory://{}/upload/{}?upload_id={}&content_type={}",
            self.bucket,
            encode_path(name),
            uuid::Uuid::new_v4(),
            urlencoding::encode(content_type)
        ))
    }

    async fn sign_url(
        &self,
        name: &str,
        action: SignedUrlAction,
        expires_in: Duration,
    ) -> Result<String, StoreError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| StoreError::Backend(format!("時刻取得失敗: {e}")))?;
        let expires = now.as_secs().saturating_add(expires_in.as_secs());
        let signature = hex::encode(self.mac(name, action.as_str(), expires)?.finalize().into_bytes());

        Ok(format!(
            "memory://{}/{}?action={}&expires={}&signature={}",
            self.bucket,
            name,
            action.as_str(),
            expires,
            signature
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(mut stream: ByteStream<'static>) -> (Vec<u8>, usize) {
        let mut out = Vec::new();
        let mut chunks = 0;
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
            chunks += 1;
        }
        (out, chunks)
    }

    #[tokio::test]
    async fn test_read_stream_is_chunked() {
        let store = MemoryBlobStore::new("test").with_read_chunk_size(4);
        store.insert("a.bin", "application/octet-stream", vec![7u8; 10]).await;

        let object = store.open_read_stream("a.bin").await.unwrap();
        assert_eq!(object.size, Some(10));
        assert_eq!(object.content_type.as_deref(), Some("application/octet-stream"));

        let (data, chunks) = collect(object.body).await;
        assert_eq!(data, vec![7u8; 10]);
        assert_eq!(chunks, 3);
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let store = MemoryBlobStore::new("test");
        let err = store.open_read_stream("nope").await.err().unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_reports_size_and_content_type() {
        let store = MemoryBlobStore::new("test");
        store.insert("b.txt", "text/plain", "hello").await;
        store.insert("a.jpg", "image/jpeg", vec![0u8; 3]).await;

        let objects = store.list_objects().await.unwrap();
        assert_eq!(
            objects,
            vec![
                ObjectDescriptor::new("a.jpg", "image/jpeg", 3),
                ObjectDescriptor::new("b.txt", "text/plain", 5),
            ]
        );
    }

    #[tokio::test]
    async fn test_signed_url_verifies_only_for_issuing_store() {
        let store = MemoryBlobStore::new("test");
        let other = MemoryBlobStore::new("test");
        let url = store
            .sign_url("a.jpg", SignedUrlAction::Read, Duration::from_secs(60))
            .await
            .unwrap();

        assert!(url.starts_with("memory://test/a.jpg?action=read&expires="));
        assert!(store.verify_signed_url(&url));
        assert!(!other.verify_signed_url(&url));
        assert!(!store.verify_signed_url(&url.replace("a.jpg", "b.jpg")));
    }

    #[tokio::test]
    async fn test_failed_put_does_not_commit() {
        let store = MemoryBlobStore::new("test");
        let body: ByteStream<'static> = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "切断")),
        ])
        .boxed();

        let result = store.put_stream("x.bin", "application/octet-stream", body).await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert!(store.get_bytes("x.bin").await.is_none());
    }

    #[tokio::test]
    async fn test_resumable_uri_escapes_query_values() {
        let store = MemoryBlobStore::new("test");
        let uri = store
            .begin_resumable_upload("my file.jpg", "image/jpeg; charset=x&y")
            .await
            .unwrap();

        assert!(uri.starts_with("memory://test/upload/my%20file.jpg?upload_id="), "{uri}");
        assert!(
            uri.ends_with("&content_type=image%2Fjpeg%3B%20charset%3Dx%26y"),
            "{uri}"
        );
        assert_eq!(uri.matches('&').count(), 1);
    }
}
