//! # ダウンロードパススルー

use crate::error::StoreError;
use crate::storage::{BlobStore, ObjectStream};

/// オブジェクトの読み取りストリームを開く。
///
/// 内容は加工せず届いた順に流す。存在しない場合は `StoreError::NotFound`。
/// Rangeリクエストには対応しない。
pub async fn download(store: &dyn BlobStore, name: &str) -> Result<ObjectStream, StoreError> {
    match store.open_read_stream(name).await {
        Ok(object) => {
            tracing::debug!(object = %name, size = ?object.size, "ダウンロード開始");
            Ok(object)
        }
        Err(e) => {
            if e.is_not_found() {
                tracing::debug!(object = %name, "ダウンロード対象が存在しません");
            } else {
                tracing::warn!(object = %name, error = %e, "読み取りストリームを開けません");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::StreamExt;

    use super::*;
    use crate::storage::MemoryBlobStore;
    use crate::transfer::StreamingUploader;

    async fn read_all(object: ObjectStream) -> Vec<u8> {
        let mut body = object.body;
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_upload_then_download_returns_same_bytes() {
        let store = Arc::new(MemoryBlobStore::new("test").with_read_chunk_size(1000));
        let uploader = StreamingUploader::new(store.clone());

        for size in [0usize, 1, 999, 1000, 1001, 256 * 1024 + 3] {
            let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let name = format!("blob-{size}.bin");
            let parts: Vec<Result<bytes::Bytes, std::io::Error>> = data
                .chunks(777)
                .map(|c| Ok(bytes::Bytes::copy_from_slice(c)))
                .collect();

            uploader
                .accept_upload(futures::stream::iter(parts), &name, "application/octet-stream")
                .await
                .unwrap();

            let object = download(store.as_ref(), &name).await.unwrap();
            assert_eq!(object.size, Some(size as u64));
            assert_eq!(read_all(object).await, data, "size={size}");
        }
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let store = MemoryBlobStore::new("test");
        let err = download(&store, "missing.jpg").await.err().unwrap();
        assert!(err.is_not_found());
    }
}
