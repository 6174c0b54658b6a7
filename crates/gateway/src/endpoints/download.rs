//! # GET /file/{*name}
//!
//! ブロブストアの読み取りストリームをレスポンスボディとしてそのまま流す。

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use blobgate_core::transfer;
use blobgate_core::transfer::upload::DEFAULT_CONTENT_TYPE;

use crate::config::GatewayState;
use crate::error::GatewayError;

/// GET /file/{*name}: オブジェクトのダウンロード。
pub async fn handle_download(
    State(state): State<Arc<GatewayState>>,
    Path(name): Path<String>,
) -> Result<Response, GatewayError> {
    let object = transfer::download(state.store.as_ref(), &name).await?;

    let content_type = object
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or(HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    let mut response = Body::from_stream(object.body).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, content_type);
    if let Some(size) = object.size {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::endpoints::test_helpers::*;

    /// 保存済みの内容とContent-Typeをそのまま返す
    #[tokio::test]
    async fn test_download_returns_stored_bytes() {
        let gw = spawn_gateway(memory_config()).await;
        let data: Vec<u8> = (0..150_000u32).map(|i| (i * 7 % 256) as u8).collect();
        gw.store.insert("nested/dir/photo.jpg", "image/jpeg", data.clone()).await;

        let response = reqwest::get(format!("{}/file/nested/dir/photo.jpg", gw.base_url))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap().to_str().unwrap(),
            "image/jpeg"
        );
        assert_eq!(response.content_length(), Some(data.len() as u64));
        assert_eq!(response.bytes().await.unwrap().to_vec(), data);
    }

    /// アップロードした内容をそのままダウンロードできる（空ファイルを含む）
    #[tokio::test]
    async fn test_upload_download_round_trip() {
        let gw = spawn_gateway(memory_config()).await;
        let client = reqwest::Client::new();

        for (name, data) in [
            ("empty.bin", Vec::new()),
            ("one.bin", vec![42u8]),
            ("multi.bin", vec![9u8; 300_000]),
        ] {
            let part = reqwest::multipart::Part::bytes(data.clone())
                .file_name(name.to_string())
                .mime_str("application/octet-stream")
                .unwrap();
            let status = client
                .post(format!("{}/upload", gw.base_url))
                .multipart(reqwest::multipart::Form::new().part("file", part))
                .send()
                .await
                .unwrap()
                .status();
            assert!(status.is_success(), "{name}: {status}");

            let body = client
                .get(format!("{}/file/{name}", gw.base_url))
                .send()
                .await
                .unwrap()
                .bytes()
                .await
                .unwrap();
            assert_eq!(body.to_vec(), data, "{name}");
        }
    }

    /// 存在しないオブジェクトは404
    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let gw = spawn_gateway(memory_config()).await;
        let response = reqwest::get(format!("{}/file/missing.jpg", gw.base_url))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
