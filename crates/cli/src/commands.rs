//! # サブコマンドの実装

use std::path::Path;

use anyhow::Context;
use blobgate_core::cache::file as url_cache_file;
use blobgate_types::FileListing;
use futures::StreamExt;
use reqwest::multipart::Part;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;

use crate::client::GatewayClient;

/// 一覧をタブ区切りで整形する（名前、サイズ、MIMEタイプ、署名付きURL）。
pub fn render_listing(listing: &FileListing) -> String {
    let mut out = String::new();
    for file in &listing.files {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            file.name,
            file.size,
            file.content_type,
            file.signed_url.as_deref().unwrap_or("-")
        ));
    }
    for failure in &listing.failures {
        out.push_str(&format!("{}\t失敗: {}\n", failure.name, failure.reason));
    }
    out
}

/// `files`
pub async fn files(client: &GatewayClient, json: bool) -> anyhow::Result<()> {
    let listing = client.files().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        print!("{}", render_listing(&listing));
    }
    Ok(())
}

/// `upload`。ファイルを読みながら送信する。保存したオブジェクト名を返す。
pub async fn upload(
    client: &GatewayClient,
    path: &Path,
    name: Option<String>,
    content_type: &str,
) -> anyhow::Result<String> {
    let name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("ファイル名を決定できません: {}", path.display()))?,
    };

    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("ファイルを開けません: {}", path.display()))?;
    let length = file.metadata().await?.len();
    let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

    client
        .upload(&name, content_type, Part::stream_with_length(body, length))
        .await?;
    tracing::info!(object = %name, size = length, "アップロード完了");
    Ok(name)
}

/// `download`。受信したチャンクを順に `out` へ書き込み、書き込んだバイト数を返す。
pub async fn download<W>(client: &GatewayClient, name: &str, out: &mut W) -> anyhow::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut stream = Box::pin(client.download(name).await?);
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("ダウンロード中に接続が切れました")?;
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(written)
}

/// `resumable`
pub async fn resumable(client: &GatewayClient) -> anyhow::Result<()> {
    let session = client.resumable().await?;
    println!("{}", session.uri);
    Ok(())
}

/// `cache list`。稼働中のGatewayが使っているファイルも書き換えずに読む。
pub async fn cache_list(path: &Path) -> anyhow::Result<Vec<(String, String)>> {
    Ok(url_cache_file::load_entries(path).await?)
}

/// `cache purge`。削除した件数を返す。
///
/// 稼働中のGatewayは次の参照時に切り詰めを検出し、メモリ上のエントリも破棄する。
pub async fn cache_purge(path: &Path) -> anyhow::Result<usize> {
    let removed = url_cache_file::purge(path).await?;
    tracing::info!(path = %path.display(), removed, "URLキャッシュを削除");
    Ok(removed)
}
