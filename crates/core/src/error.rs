//! # Coreエラー型
//!
//! ブロブストア・キャッシュストア・署名付きURL解決・転送の各エラー。
//! HTTP境界がステータスコードを選べるよう、種別ごとに型を分ける。

/// ブロブストア操作のエラー。
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// 指定オブジェクトが存在しない
    #[error("オブジェクトが見つかりません: {0}")]
    NotFound(String),
    /// ブロブストアに到達できない、または操作が拒否された
    #[error("ブロブストア操作に失敗: {0}")]
    Backend(String),
}

impl StoreError {
    /// NotFoundかどうか。
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// URLキャッシュストア操作のエラー。
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// 読み取りに失敗
    #[error("キャッシュの読み取りに失敗: {0}")]
    Read(String),
    /// 書き込みに失敗
    #[error("キャッシュの書き込みに失敗: {0}")]
    Write(String),
}

/// 署名付きURL解決のエラー。どのオブジェクトで失敗したかを保持する。
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    /// 署名付きURL生成（ブロブストア側）に失敗
    #[error("署名付きURLの生成に失敗 ({name}): {source}")]
    Store {
        /// 失敗したオブジェクト名
        name: String,
        /// 原因
        source: StoreError,
    },
    /// キャッシュの読み書きに失敗
    #[error("URLキャッシュの操作に失敗 ({name}): {source}")]
    Cache {
        /// 失敗したオブジェクト名
        name: String,
        /// 原因
        source: CacheError,
    },
    /// 解決タスクが異常終了した
    #[error("解決タスクが異常終了しました ({name}): {reason}")]
    Aborted {
        /// 失敗したオブジェクト名
        name: String,
        /// 原因
        reason: String,
    },
}

impl ResolveError {
    /// 失敗したオブジェクト名。
    pub fn name(&self) -> &str {
        match self {
            ResolveError::Store { name, .. }
            | ResolveError::Cache { name, .. }
            | ResolveError::Aborted { name, .. } => name,
        }
    }
}

/// ストリーミングアップロードのエラー。
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// クライアント申告のオブジェクト名が不正
    #[error("不正なオブジェクト名: {0}")]
    InvalidName(String),
    /// 受信側（クライアントからのストリーム）の失敗
    #[error("アップロードストリームの受信に失敗: {0}")]
    Inbound(String),
    /// 送信側（ブロブストアへの書き込み）の失敗
    #[error("ブロブストアへの書き込みに失敗: {0}")]
    Outbound(#[source] StoreError),
}
