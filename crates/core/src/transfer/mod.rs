//! # 転送アダプタ
//!
//! クライアントとブロブストアの間でバイト列を中継する。
//! いずれもオブジェクト全体をメモリやローカルディスクに展開しない。
//!
//! - `upload`: 受信したマルチパートのファイルパートをブロブストアへ書き込む
//! - `download`: ブロブストアの読み取りストリームをそのまま返す
//! - `resumable`: クライアント直送用の再開可能アップロードセッションを作成する

pub mod download;
pub mod resumable;
pub mod upload;

pub use download::download;
pub use resumable::{begin_resumable, ResumableSession};
pub use upload::{StreamingUploader, UploadReceipt};
