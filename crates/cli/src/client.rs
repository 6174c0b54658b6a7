//! # Gateway HTTPクライアント

use blobgate_core::object_name::encode_path;
use blobgate_types::{FileListing, ResumableSessionResponse};
use futures::Stream;
use reqwest::multipart::{Form, Part};

/// CLIのエラー型。
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Gatewayに到達できない
    #[error("Gatewayへのリクエストに失敗: {0}")]
    Request(#[from] reqwest::Error),
    /// Gatewayがエラーを返した
    #[error("Gatewayがエラーを返しました: HTTP {status} - {body}")]
    Status {
        /// HTTPステータス
        status: reqwest::StatusCode,
        /// レスポンスボディ
        body: String,
    },
}

/// Gatewayクライアント。
pub struct GatewayClient {
    base_url: String,
    http: reqwest::Client,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET /files
    pub async fn files(&self) -> Result<FileListing, CliError> {
        let response = check_status(self.http.get(self.url("/files")).send().await?).await?;
        Ok(response.json().await?)
    }

    /// POST /upload（1ファイル）。ボディはストリームのまま送る。
    pub async fn upload(&self, name: &str, content_type: &str, part: Part) -> Result<(), CliError> {
        let part = part.file_name(name.to_string()).mime_str(content_type)?;
        let form = Form::new().part("file", part);
        // 303の転送先（一覧）は読まない
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        check_status(http.post(self.url("/upload")).multipart(form).send().await?).await?;
        Ok(())
    }

    /// GET /file/{name}。レスポンスボディのストリームを返す。
    pub async fn download(
        &self,
        name: &str,
    ) -> Result<impl Stream<Item = reqwest::Result<bytes::Bytes>>, CliError> {
        let path = format!("/file/{}", encode_path(name));
        let response = check_status(self.http.get(self.url(&path)).send().await?).await?;
        Ok(response.bytes_stream())
    }

    /// GET /resumable
    pub async fn resumable(&self) -> Result<ResumableSessionResponse, CliError> {
        let response = check_status(self.http.get(self.url("/resumable")).send().await?).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CliError> {
    let status = response.status();
    if status.is_success() || status.is_redirection() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CliError::Status { status, body })
}
