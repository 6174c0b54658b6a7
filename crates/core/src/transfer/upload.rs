//! # ストリーミングアップロード
//!
//! 受信ストリームのチャンクを受け取り次第ブロブストアの書き込みへ流す。
//!
//! ## 失敗の扱い
//! - 受信側のエラーは `UploadError::Inbound`、書き込み側のエラーは `UploadError::Outbound`
//! - 失敗時にブロブストアに書きかけのオブジェクトが残る場合がある。ロールバックはしない。
//!   呼び出し側は「オブジェクトの状態は不定」とみなし、同じ名前で再アップロードする

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::UploadError;
use crate::object_name::validate_object_name;
use crate::storage::BlobStore;

/// Content-Typeが申告されなかった場合に使うMIMEタイプ。
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// 完了したアップロードの記録。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// 書き込んだオブジェクト名
    pub name: String,
    /// 保存したMIMEタイプ
    pub content_type: String,
    /// 書き込んだバイト数
    pub size: u64,
}

/// ストリーミングアップロードアダプタ。
#[derive(Clone)]
pub struct StreamingUploader {
    store: Arc<dyn BlobStore>,
}

impl StreamingUploader {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// 1ファイルパートをブロブストアへ書き込む。
    ///
    /// `declared_name` はクライアント申告のファイル名で、検証のみ行いそのまま使う。
    /// ブロブストアの書き込みが正常に完了した場合のみ `Ok` を返す。
    pub async fn accept_upload<'a, S, E>(
        &self,
        body: S,
        declared_name: &str,
        content_type: &str,
    ) -> Result<UploadReceipt, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'a,
        E: std::fmt::Display + Send + 'a,
    {
        validate_object_name(declared_name)?;
        let content_type = if content_type.trim().is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            content_type
        };

        let received = Arc::new(AtomicU64::new(0));
        let inbound_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let counter = Arc::clone(&received);
        let slot = Arc::clone(&inbound_error);
        let relayed = body
            .map(move |chunk| match chunk {
                Ok(bytes) => {
                    counter.fetch_add(bytes.len() as u64, Ordering::Relaxed);
                    Ok(bytes)
                }
                Err(e) => {
                    let message = e.to_string();
                    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.clone());
                    Err(std::io::Error::other(message))
                }
            })
            .boxed();

        tracing::info!(object = %declared_name, content_type = %content_type, "アップロード開始");
        let written = self
            .store
            .put_stream(declared_name, content_type, relayed)
            .await;

        let inbound = inbound_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(message) = inbound {
            tracing::warn!(object = %declared_name, error = %message, "受信ストリームが失敗しました");
            return Err(UploadError::Inbound(message));
        }
        if let Err(e) = written {
            tracing::warn!(object = %declared_name, error = %e, "ブロブストアへの書き込みが失敗しました");
            return Err(UploadError::Outbound(e));
        }

        let size = received.load(Ordering::Relaxed);
        tracing::info!(object = %declared_name, size, "アップロード完了");
        Ok(UploadReceipt {
            name: declared_name.to_string(),
            content_type: content_type.to_string(),
            size,
        })
    }
}
