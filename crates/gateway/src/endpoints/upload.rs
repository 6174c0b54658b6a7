//! # POST /upload
//!
//! マルチパートの各ファイルパートをストリーミングでブロブストアへ書き込む。
//! ファイル名のないフィールドは読み飛ばす。ファイルパートが0件でも成功とする。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use blobgate_core::transfer::upload::DEFAULT_CONTENT_TYPE;
use blobgate_core::UploadError;
use futures::TryStreamExt;

use crate::config::GatewayState;
use crate::error::GatewayError;

/// POST /upload: ファイルのアップロード。
///
/// 全パートの書き込み完了後に `303 See Other` で `/files` へリダイレクトする。
/// 途中のパートで失敗した場合、それ以前のパートは書き込み済みのまま残る。
pub async fn handle_upload(
    State(state): State<Arc<GatewayState>>,
    mut multipart: Multipart,
) -> Result<Redirect, GatewayError> {
    let mut uploaded = 0usize;

    while let Some(field) = multipart.next_field().await? {
        let Some(file_name) = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
        else {
            tracing::debug!(field = ?field.name(), "ファイル名のないフィールドを読み飛ばします");
            continue;
        };
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        // ボディ上限超過はパートの読み取り中に検出される
        let too_large = AtomicBool::new(false);
        let body = field.inspect_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                too_large.store(true, Ordering::Relaxed);
            }
        });
        let receipt = match state
            .uploader
            .accept_upload(body, &file_name, &content_type)
            .await
        {
            Ok(receipt) => receipt,
            Err(UploadError::Inbound(reason)) if too_large.load(Ordering::Relaxed) => {
                return Err(GatewayError::PayloadTooLarge(reason));
            }
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(object = %receipt.name, size = receipt.size, "ファイルパートを保存");
        uploaded += 1;
    }

    tracing::info!(files = uploaded, "アップロードリクエストを処理");
    Ok(Redirect::to("/files"))
}
