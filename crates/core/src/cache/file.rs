//! # ファイル永続URLキャッシュ
//!
//! 追記型のJSON Linesファイルにエントリを記録する永続キャッシュ。
//!
//! ## ファイル形式
//! 1行1レコード `{"key": "<オブジェクト名>", "value": "<署名付きURL>"}`。
//! 同じキーのレコードが複数ある場合は後の行が優先される。
//!
//! ## 動作
//! - 起動時に全行を読み込みメモリに展開する。上書きされた行が残っていれば書き直す
//! - `put` はレコードを追記し、fsync後にメモリへ反映する
//! - 末尾の書きかけ行（クラッシュ時）は読み飛ばす
//!
//! ## 外部プロセスからの操作
//! ファイルを書き直すのは [`FileUrlCache::open`] した所有プロセスのみ。
//! 他プロセスは [`load_entries`] で読み取り、[`purge`] で同じinodeのまま切り詰める。
//! 所有プロセスは `get`/`put` のたびにファイル長を確認し、
//! 自身が書いた長さより短くなっていればファイルから読み直す。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use super::UrlCache;
use crate::error::CacheError;

/// キャッシュファイルの1レコード。
#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    key: String,
    value: String,
}

/// ファイル永続URLキャッシュ。
pub struct FileUrlCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
    /// 追記用ハンドル。書き込みとメモリ反映はこのロック下で行う
    log: Mutex<AppendLog>,
}

struct AppendLog {
    file: File,
    /// このプロセスが把握しているファイル長
    len: u64,
}

impl FileUrlCache {
    /// キャッシュファイルを開く。存在しない場合は作成する。
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CacheError::Write(format!("ディレクトリ作成に失敗 ({}): {e}", parent.display()))
            })?;
        }

        let (entries, record_count) = load_records(&path).await?;
        if record_count > entries.len() {
            tracing::info!(
                path = %path.display(),
                records = record_count,
                entries = entries.len(),
                "キャッシュファイルを書き直します"
            );
            rewrite(&path, &entries).await?;
        }

        let file = open_append(&path).await?;
        let len = file_len(&file).await?;
        tracing::debug!(path = %path.display(), entries = entries.len(), "URLキャッシュを読み込み");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            log: Mutex::new(AppendLog { file, len }),
        })
    }

    /// キャッシュファイルのパス。
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 全エントリをキー順で返す。
    pub async fn entries(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort();
        entries
    }

    /// ファイルが外部で切り詰められていればメモリ上のエントリを読み直す。
    async fn reload_if_truncated(&self, log: &mut AppendLog) -> Result<(), CacheError> {
        let len = file_len(&log.file).await?;
        if len >= log.len {
            return Ok(());
        }
        let (entries, _) = load_records(&self.path).await?;
        tracing::warn!(
            path = %self.path.display(),
            entries = entries.len(),
            "キャッシュファイルが切り詰められたため読み直します"
        );
        *self.entries.write().await = entries;
        log.len = len;
        Ok(())
    }
}

#[async_trait::async_trait]
impl UrlCache for FileUrlCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        {
            let mut log = self.log.lock().await;
            self.reload_if_truncated(&mut log).await?;
        }
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut line = serde_json::to_vec(&CacheRecord {
            key: key.to_string(),
            value: value.to_string(),
        })
        .map_err(|e| CacheError::Write(format!("レコードのシリアライズに失敗: {e}")))?;
        line.push(b'\n');

        let mut log = self.log.lock().await;
        self.reload_if_truncated(&mut log).await?;
        log.file
            .write_all(&line)
            .await
            .map_err(|e| CacheError::Write(format!("キャッシュファイルへの追記に失敗: {e}")))?;
        log.file
            .sync_data()
            .await
            .map_err(|e| CacheError::Write(format!("fsyncに失敗: {e}")))?;
        log.len += line.len() as u64;

        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// キャッシュファイルの全エントリをキー順で返す。ファイルは書き換えない。
pub async fn load_entries(path: impl AsRef<Path>) -> Result<Vec<(String, String)>, CacheError> {
    let (entries, _) = load_records(path.as_ref()).await?;
    let mut entries: Vec<(String, String)> = entries.into_iter().collect();
    entries.sort();
    Ok(entries)
}

/// キャッシュファイルを同じinodeのまま切り詰める。削除したエントリ数を返す。
///
/// 稼働中の所有プロセスは次の `get`/`put` で切り詰めを検出する。
pub async fn purge(path: impl AsRef<Path>) -> Result<usize, CacheError> {
    let path = path.as_ref();
    let (entries, _) = load_records(path).await?;

    let file = match OpenOptions::new().write(true).open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(CacheError::Write(format!(
                "キャッシュファイルを開けません ({}): {e}",
                path.display()
            )))
        }
    };
    file.set_len(0)
        .await
        .map_err(|e| CacheError::Write(format!("キャッシュファイルの切り詰めに失敗: {e}")))?;
    file.sync_all()
        .await
        .map_err(|e| CacheError::Write(format!("fsyncに失敗: {e}")))?;
    Ok(entries.len())
}

/// キャッシュファイルを読み込む。(エントリ, 有効レコード数) を返す。
async fn load_records(path: &Path) -> Result<(HashMap<String, String>, usize), CacheError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(CacheError::Read(format!(
                "キャッシュファイルの読み込みに失敗 ({}): {e}",
                path.display()
            )))
        }
    };

    let mut entries = HashMap::new();
    let mut record_count = 0;
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CacheRecord>(line) {
            Ok(record) => {
                entries.insert(record.key, record.value);
                record_count += 1;
            }
            Err(e) => {
                // 不正な行は捨てる。次回の書き直しで消える
                tracing::warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "不正なキャッシュレコードを読み飛ばします"
                );
                record_count += 1;
            }
        }
    }
    Ok((entries, record_count))
}

/// エントリのみを含むファイルに置き換える（一時ファイル経由）。
async fn rewrite(path: &Path, entries: &HashMap<String, String>) -> Result<(), CacheError> {
    let mut buf = Vec::new();
    for (key, value) in entries {
        serde_json::to_writer(
            &mut buf,
            &CacheRecord {
                key: key.clone(),
                value: value.clone(),
            },
        )
        .map_err(|e| CacheError::Write(format!("レコードのシリアライズに失敗: {e}")))?;
        buf.push(b'\n');
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = File::create(&tmp)
        .await
        .map_err(|e| CacheError::Write(format!("一時ファイルの作成に失敗: {e}")))?;
    file.write_all(&buf)
        .await
        .map_err(|e| CacheError::Write(format!("一時ファイルへの書き込みに失敗: {e}")))?;
    file.sync_all()
        .await
        .map_err(|e| CacheError::Write(format!("fsyncに失敗: {e}")))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| CacheError::Write(format!("キャッシュファイルの置き換えに失敗: {e}")))
}

async fn file_len(file: &File) -> Result<u64, CacheError> {
    file.metadata()
        .await
        .map(|m| m.len())
        .map_err(|e| CacheError::Read(format!("キャッシュファイルの情報取得に失敗: {e}")))
}

async fn open_append(path: &Path) -> Result<File, CacheError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| {
            CacheError::Write(format!(
                "キャッシュファイルを開けません ({}): {e}",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("urls.jsonl");

        let cache = FileUrlCache::open(&path).await.unwrap();
        cache.put("a.jpg", "https://example.com/a?sig=1").await.unwrap();
        cache.put("b.jpg", "https://example.com/b?sig=2").await.unwrap();
        drop(cache);

        let cache = FileUrlCache::open(&path).await.unwrap();
        assert_eq!(
            cache.get("a.jpg").await.unwrap().as_deref(),
            Some("https://example.com/a?sig=1")
        );
        assert_eq!(cache.entries().await.len(), 2);
    }

    #[tokio::test]
    async fn test_last_record_wins_and_file_is_compacted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.jsonl");

        let cache = FileUrlCache::open(&path).await.unwrap();
        cache.put("a.jpg", "old").await.unwrap();
        cache.put("a.jpg", "new").await.unwrap();
        drop(cache);

        let cache = FileUrlCache::open(&path).await.unwrap();
        assert_eq!(cache.get("a.jpg").await.unwrap().as_deref(), Some("new"));

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_torn_trailing_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.jsonl");
        tokio::fs::write(&path, "{\"key\":\"a.jpg\",\"value\":\"u1\"}\n{\"key\":\"b.j")
            .await
            .unwrap();

        let cache = FileUrlCache::open(&path).await.unwrap();
        assert_eq!(cache.get("a.jpg").await.unwrap().as_deref(), Some("u1"));
        assert_eq!(cache.get("b.jpg").await.unwrap(), None);

        // 書き直し後も追記できる
        cache.put("b.jpg", "u2").await.unwrap();
        drop(cache);
        let cache = FileUrlCache::open(&path).await.unwrap();
        assert_eq!(cache.entries().await.len(), 2);
    }

    #[tokio::test]
    async fn test_load_entries_never_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.jsonl");

        let owner = FileUrlCache::open(&path).await.unwrap();
        owner.put("a.jpg", "u1").await.unwrap();
        owner.put("a.jpg", "u2").await.unwrap();

        let listed = load_entries(&path).await.unwrap();
        assert_eq!(listed, vec![("a.jpg".to_string(), "u2".to_string())]);
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 2);

        // 読み取り後も所有プロセスの追記は同じファイルに残る
        owner.put("b.jpg", "u3").await.unwrap();
        drop(owner);
        let reopened = FileUrlCache::open(&path).await.unwrap();
        assert_eq!(
            reopened.entries().await,
            vec![
                ("a.jpg".to_string(), "u2".to_string()),
                ("b.jpg".to_string(), "u3".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_purge_is_seen_by_running_owner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.jsonl");

        let owner = FileUrlCache::open(&path).await.unwrap();
        owner.put("a.jpg", "u1").await.unwrap();
        owner.put("b.jpg", "u2").await.unwrap();

        assert_eq!(purge(&path).await.unwrap(), 2);
        assert_eq!(owner.get("a.jpg").await.unwrap(), None);

        owner.put("c.jpg", "u3").await.unwrap();
        assert_eq!(owner.get("b.jpg").await.unwrap(), None);
        drop(owner);

        let reopened = FileUrlCache::open(&path).await.unwrap();
        assert_eq!(
            reopened.entries().await,
            vec![("c.jpg".to_string(), "u3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_purge_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(purge(dir.path().join("none.jsonl")).await.unwrap(), 0);
    }
}
