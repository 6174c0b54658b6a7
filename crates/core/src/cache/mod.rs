//! # URLキャッシュストア
//!
//! オブジェクト名 → 署名付きURL の対応を保持するキーバリューストア。
//!
//! エントリに有効期限は持たせない。存在するエントリはプロセスの生存期間中
//! 有効とみなし、読み取り時に鮮度は再確認しない。エントリの削除は
//! 外部からの管理操作（CLIの `cache purge` 等）でのみ行われる。
//!
//! ## 実装
//! - `FileUrlCache`: 追記型JSON Linesファイルによる永続キャッシュ（本番用）
//! - `MemoryUrlCache`: プロセス内メモリ（開発・テスト用）

pub mod file;
pub mod memory;

pub use file::FileUrlCache;
pub use memory::MemoryUrlCache;

use crate::error::CacheError;

/// URLキャッシュストアの抽象インターフェース。
///
/// 同一キーへの並行書き込みは許容し、最後の書き込みが残る。
#[async_trait::async_trait]
pub trait UrlCache: Send + Sync {
    /// キーに対応するURLを取得する。存在しない場合は `None`。
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// キーにURLを書き込む（既存値は上書き）。
    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError>;
}
