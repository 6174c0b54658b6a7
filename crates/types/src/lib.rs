//! # Blobgate 共有型定義
//!
//! GatewayとCLIの間でやり取りされるデータ構造をRust構造体として提供する。
//!
//! ## 命名規則
//! - オブジェクト名: ブロブストア上のキーそのもの（リネーム・正規化は行わない）
//! - 署名付きURL: ブロブストアが発行した読み取り用URL（キャッシュ済みの値を含む）

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// オブジェクト記述子
// ---------------------------------------------------------------------------

/// ブロブストア上のオブジェクト1件を表す記述子。
///
/// リクエストごとに一覧取得から構築され、永続化はされない。
/// `signed_url` はResolverを通過した時点で必ず埋まっている。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    /// オブジェクト名（バケット内で一意）
    pub name: String,
    /// コンテンツのMIMEタイプ
    pub content_type: String,
    /// サイズ（バイト）
    pub size: u64,
    /// 読み取り用の署名付きURL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_url: Option<String>,
}

impl ObjectDescriptor {
    /// 署名付きURL未設定の記述子を作成する。
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size,
            signed_url: None,
        }
    }

    /// 署名付きURLを設定した記述子を返す。
    pub fn with_signed_url(mut self, url: impl Into<String>) -> Self {
        self.signed_url = Some(url.into());
        self
    }
}

// ---------------------------------------------------------------------------
// GET /files
// ---------------------------------------------------------------------------

/// GET /files レスポンス。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileListing {
    /// 署名付きURLが付与されたオブジェクト一覧
    pub files: Vec<ObjectDescriptor>,
    /// 署名付きURLの解決に失敗したオブジェクト（部分成功ポリシー時のみ）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ResolveFailure>,
}

/// オブジェクト単位の解決失敗。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveFailure {
    /// 失敗したオブジェクト名
    pub name: String,
    /// 失敗理由
    pub reason: String,
}

// ---------------------------------------------------------------------------
// GET /resumable
// ---------------------------------------------------------------------------

/// GET /resumable レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumableSessionResponse {
    /// クライアントが直接アップロードするセッションURI
    pub uri: String,
    /// アップロード先のオブジェクト名
    pub name: String,
    /// セッション作成時に指定したMIMEタイプ
    pub content_type: String,
}
