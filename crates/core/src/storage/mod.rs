//! # ブロブストア
//!
//! 一覧取得・ストリーム読み書き・署名付きURL生成・再開可能アップロードの
//! セッション作成を抽象化するインターフェース。
//!
//! ## 実装
//! - `S3BlobStore`: S3互換ストレージ（AWS S3, MinIO, Cloudflare R2等）。`vendor-aws` feature
//! - `MemoryBlobStore`: プロセス内メモリ（開発・テスト用）

pub mod memory;
#[cfg(feature = "vendor-aws")]
pub mod s3;

pub use memory::MemoryBlobStore;
#[cfg(feature = "vendor-aws")]
pub use s3::S3BlobStore;

use std::time::Duration;

use blobgate_types::ObjectDescriptor;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::StoreError;

/// バイトストリーム。
///
/// アップロード時はリクエストボディを借用するため寿命パラメータを持つ。
/// ダウンロード時は `ByteStream<'static>` を返す。
pub type ByteStream<'a> = BoxStream<'a, std::io::Result<Bytes>>;

/// 読み取りストリームとオブジェクトのメタデータ。
pub struct ObjectStream {
    /// MIMEタイプ（バックエンドが返した場合）
    pub content_type: Option<String>,
    /// サイズ（バイト、バックエンドが返した場合）
    pub size: Option<u64>,
    /// オブジェクトの内容
    pub body: ByteStream<'static>,
}

/// 署名付きURLで許可する操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedUrlAction {
    /// 読み取り（GET）
    Read,
}

impl SignedUrlAction {
    /// 操作名。
    pub fn as_str(&self) -> &'static str {
        match self {
            SignedUrlAction::Read => "read",
        }
    }
}

/// ブロブストアの抽象インターフェース。
///
/// 運用者はS3互換ストレージやその他のバックエンドを実装として選択できる。
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// バケット内の全オブジェクトを列挙する。`signed_url` は未設定で返す。
    async fn list_objects(&self) -> Result<Vec<ObjectDescriptor>, StoreError>;

    /// オブジェクトの読み取りストリームを開く。
    ///
    /// 存在しない場合は `StoreError::NotFound` を返す。
    async fn open_read_stream(&self, name: &str) -> Result<ObjectStream, StoreError>;

    /// `body` を消費しながらオブジェクトに書き込む。
    ///
    /// 書き込みが正常に完了した時点でのみ `Ok` を返す。
    /// 途中で失敗した場合、書きかけのオブジェクトが残る可能性がある。
    async fn put_stream<'a>(
        &self,
        name: &str,
        content_type: &str,
        body: ByteStream<'a>,
    ) -> Result<(), StoreError>;

    /// クライアントが直接アップロードするためのセッションURIを発行する。
    async fn begin_resumable_upload(
        &self,
        name: &str,
        content_type: &str,
    ) -> Result<String, StoreError>;

    /// 署名付きURLを生成する。
    ///
    /// バックエンドの上限を超える `expires_in` は上限に切り詰められる。
    async fn sign_url(
        &self,
        name: &str,
        action: SignedUrlAction,
        expires_in: Duration,
    ) -> Result<String, StoreError>;
}
