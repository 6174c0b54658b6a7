//! # Blobgate Core
//!
//! 署名付きURLキャッシュとストリーミング転送を実装する。
//!
//! ## 構成
//! - `storage`: ブロブストアの抽象インターフェースと実装（S3互換、メモリ内）
//! - `cache`: オブジェクト名 → 署名付きURL のキャッシュストア
//! - `resolver`: キャッシュを優先して署名付きURLを付与するリゾルバ
//! - `transfer`: アップロード・ダウンロード・再開可能アップロードのセッション作成
//!
//! ブロブストアとキャッシュストアは構築時に注入する。グローバル状態は持たない。

pub mod cache;
pub mod error;
pub mod object_name;
pub mod resolver;
pub mod storage;
pub mod transfer;

pub use cache::{FileUrlCache, MemoryUrlCache, UrlCache};
pub use error::{CacheError, ResolveError, StoreError, UploadError};
pub use resolver::{ResolverOptions, SignedUrlResolver};
pub use storage::{BlobStore, ByteStream, MemoryBlobStore, ObjectStream, SignedUrlAction};
#[cfg(feature = "vendor-aws")]
pub use storage::S3BlobStore;
pub use transfer::{StreamingUploader, UploadReceipt};
