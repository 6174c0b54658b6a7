//! # オブジェクト名の検証
//!
//! クライアントが申告したファイル名をそのままオブジェクト名として使う。
//! リネームや衝突回避は行わないが、パストラバーサルに見える名前は拒否する。

use crate::error::UploadError;

/// オブジェクト名の最大長（バイト）。S3のキー上限に合わせる。
pub const MAX_OBJECT_NAME_BYTES: usize = 1024;

/// クライアント申告のオブジェクト名を検証する。
///
/// 拒否する名前:
/// - 空文字列、または上限長を超えるもの
/// - `/` で始まるもの
/// - `.` / `..` / 空のパスセグメントを含むもの
/// - バックスラッシュや制御文字を含むもの
pub fn validate_object_name(name: &str) -> Result<(), UploadError> {
    if name.is_empty() {
        return Err(UploadError::InvalidName("空のオブジェクト名".to_string()));
    }
    if name.len() > MAX_OBJECT_NAME_BYTES {
        return Err(UploadError::InvalidName(format!(
            "オブジェクト名が長すぎます: {} bytes (上限: {} bytes)",
            name.len(),
            MAX_OBJECT_NAME_BYTES
        )));
    }
    if name.starts_with('/') {
        return Err(UploadError::InvalidName(format!("絶対パスは使用できません: {name}")));
    }
    if name.contains('\\') || name.chars().any(char::is_control) {
        return Err(UploadError::InvalidName(format!(
            "使用できない文字が含まれています: {name:?}"
        )));
    }
    if name
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(UploadError::InvalidName(format!(
            "不正なパスセグメントが含まれています: {name}"
        )));
    }
    Ok(())
}

/// URLのパスに埋め込めるよう、`/` 区切りのセグメントごとにパーセントエンコードする。
pub fn encode_path(name: &str) -> String {
    name.split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}
