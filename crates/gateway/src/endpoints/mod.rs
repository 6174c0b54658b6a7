//! # Gatewayエンドポイント
//!
//! - `GET /files`: 全オブジェクトの一覧（署名付きURL付き）
//! - `POST /upload`: マルチパートのファイルパートをブロブストアへ書き込む
//! - `GET /file/{*name}`: オブジェクトのダウンロード
//! - `GET /resumable`: 再開可能アップロードのセッション作成
//! - `GET /health`: 死活監視

pub mod download;
pub mod files;
pub mod health;
pub mod resumable;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use download::handle_download;
pub use files::handle_files;
pub use health::handle_health;
pub use resumable::handle_resumable;
pub use upload::handle_upload;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::config::GatewayState;

/// ルーターを構築する。リクエストボディの上限は `max_upload_size`。
pub fn router(state: Arc<GatewayState>) -> Router {
    let body_limit = state.max_upload_size;
    Router::new()
        .route("/files", get(handle_files))
        .route("/upload", post(handle_upload))
        .route("/file/{*name}", get(handle_download))
        .route("/resumable", get(handle_resumable))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
