//! # Gateway エラー型
//!
//! Coreのエラー種別をHTTPステータスコードに対応付ける。

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use blobgate_core::{ResolveError, StoreError, UploadError};

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// オブジェクトが存在しない
    #[error("オブジェクトが見つかりません: {0}")]
    NotFound(String),
    /// 不正なリクエスト（オブジェクト名・マルチパート・受信ストリーム）
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),
    /// リクエストボディが上限を超えた
    #[error("リクエストボディが大きすぎます: {0}")]
    PayloadTooLarge(String),
    /// ブロブストア操作に失敗
    #[error("ブロブストア操作に失敗: {0}")]
    Store(String),
    /// URLキャッシュ操作に失敗
    #[error("URLキャッシュ操作に失敗: {0}")]
    Cache(String),
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Store(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Cache(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(name) => GatewayError::NotFound(name),
            StoreError::Backend(_) => GatewayError::Store(e.to_string()),
        }
    }
}

impl From<ResolveError> for GatewayError {
    fn from(e: ResolveError) -> Self {
        match &e {
            ResolveError::Store { .. } => GatewayError::Store(e.to_string()),
            ResolveError::Cache { .. } => GatewayError::Cache(e.to_string()),
            ResolveError::Aborted { .. } => GatewayError::Internal(e.to_string()),
        }
    }
}

impl From<UploadError> for GatewayError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::InvalidName(_) | UploadError::Inbound(_) => {
                GatewayError::BadRequest(e.to_string())
            }
            UploadError::Outbound(source) => GatewayError::Store(source.to_string()),
        }
    }
}

impl From<MultipartError> for GatewayError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return GatewayError::PayloadTooLarge(e.body_text());
        }
        GatewayError::BadRequest(format!("マルチパートの解析に失敗: {}", e.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;

    use super::*;
    use blobgate_core::CacheError;

    fn status_of(e: impl Into<GatewayError>) -> StatusCode {
        e.into().into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(StoreError::NotFound("a.jpg".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(StoreError::Backend("接続拒否".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(ResolveError::Cache {
                name: "a.jpg".into(),
                source: CacheError::Write("ディスクが一杯です".into()),
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(UploadError::InvalidName("..".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(UploadError::Inbound("切断".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(UploadError::Outbound(StoreError::Backend("拒否".into()))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::PayloadTooLarge("上限".into())
                .into_response()
                .status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
