//! # 再開可能アップロードのセッション作成
//!
//! セッションURIを発行するだけで、チャンクの追跡や再開処理は行わない。
//! 再開はブロブストアとクライアントに委ねる。

use blobgate_types::ResumableSessionResponse;

use crate::error::StoreError;
use crate::storage::BlobStore;

/// 作成したセッション。
pub type ResumableSession = ResumableSessionResponse;

/// 固定のオブジェクト名に対する再開可能アップロードのセッションを作成する。
pub async fn begin_resumable(
    store: &dyn BlobStore,
    name: &str,
    content_type: &str,
) -> Result<ResumableSession, StoreError> {
    let uri = store.begin_resumable_upload(name, content_type).await?;
    if uri.is_empty() {
        return Err(StoreError::Backend(
            "空のセッションURIが返されました".to_string(),
        ));
    }
    tracing::info!(object = %name, content_type = %content_type, "再開可能アップロードのセッションを作成");
    Ok(ResumableSessionResponse {
        uri,
        name: name.to_string(),
        content_type: content_type.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    #[tokio::test]
    async fn test_session_uri_targets_requested_object() {
        let store = MemoryBlobStore::new("test");
        let session = begin_resumable(&store, "file.jpg", "application/jpg")
            .await
            .unwrap();

        assert!(session.uri.starts_with("memory://test/upload/file.jpg?upload_id="));
        assert_eq!(session.name, "file.jpg");
        assert_eq!(session.content_type, "application/jpg");
    }

    #[tokio::test]
    async fn test_each_call_allocates_a_new_session() {
        let store = MemoryBlobStore::new("test");
        let a = begin_resumable(&store, "file.jpg", "application/jpg").await.unwrap();
        let b = begin_resumable(&store, "file.jpg", "application/jpg").await.unwrap();
        assert_ne!(a.uri, b.uri);
    }
}
