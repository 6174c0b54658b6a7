//! # 署名付きURLリゾルバ
//!
//! オブジェクト記述子の集合を受け取り、各オブジェクトに署名付きURLを付与して返す。
//!
//! ## 処理フロー（オブジェクトごと）
//! 1. URLキャッシュをオブジェクト名で引く
//! 2. ヒットした場合はキャッシュ済みURLを付与する
//! 3. ミスした場合はブロブストアに読み取り用の署名付きURLを要求し、
//!    キャッシュに書き込んでから付与する
//!
//! オブジェクトごとに1タスクを起動し、セマフォで同時実行数を制限する。
//! 1オブジェクト内では「キャッシュ読み取り → 署名 → キャッシュ書き込み」の順序を守る。
//!
//! ## 集約ポリシー
//! - `resolve`: 最初に完了したエラーで全体を失敗させる（fail-fast）。
//!   実行中の他タスクは完了まで走り続けるが、結果は破棄される
//! - `resolve_each`: オブジェクトごとの結果を返す（部分成功）
//!
//! ## 並行書き込み
//! 未解決の同一名を並行して解決すると、署名とキャッシュ書き込みが重複しうる
//! （最後の書き込みが残る）。同一オブジェクトのURLは互いに置き換え可能なので許容する。
//! `dedupe_signing` を有効にすると、キーごとに実行中の解決を1つに束ねる。


use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use blobgate_types::ObjectDescriptor;
use futures::future::{BoxFuture, Shared};
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::Semaphore;

use crate::cache::UrlCache;
use crate::error::{ResolveError, StoreError};
use crate::storage::{BlobStore, SignedUrlAction};

/// 署名付きURLの有効期限の既定値（7日）。
///
/// キャッシュ済みURLは再検証しないため、バックエンドが許す限り長く取る。
pub const DEFAULT_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// 同時に実行する解決タスク数の既定値。
pub const DEFAULT_RESOLVE_CONCURRENCY: usize = 32;

/// リゾルバの動作設定。
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// 新規に発行する署名付きURLの有効期限
    pub expires_in: Duration,
    /// 同時に実行する解決タスク数の上限
    pub concurrency: usize,
    /// キーごとに実行中の解決を1つに束ねるか
    pub dedupe_signing: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            expires_in: DEFAULT_SIGNED_URL_EXPIRY,
            concurrency: DEFAULT_RESOLVE_CONCURRENCY,
            dedupe_signing: false,
        }
    }
}

type SharedResolution = Shared<BoxFuture<'static, Result<String, ResolveError>>>;

/// 実行中の解決。`id` は自分が登録したエントリかの判定に使う。
struct Inflight {
    id: u64,
    resolution: SharedResolution,
}

struct ResolverInner {
    store: Arc<dyn BlobStore>,
    cache: Arc<dyn UrlCache>,
    permits: Semaphore,
    expires_in: Duration,
    inflight: Option<Mutex<HashMap<String, Inflight>>>,
    next_inflight_id: AtomicU64,
}

/// 署名付きURLリゾルバ。クローンは同じキャッシュ・セマフォを共有する。
#[derive(Clone)]
pub struct SignedUrlResolver {
    inner: Arc<ResolverInner>,
}

impl SignedUrlResolver {
    /// ブロブストアとURLキャッシュを注入してリゾルバを構築する。
    pub fn new(
        store: Arc<dyn BlobStore>,
        cache: Arc<dyn UrlCache>,
        options: ResolverOptions,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                store,
                cache,
                permits: Semaphore::new(options.concurrency.max(1)),
                expires_in: options.expires_in,
                inflight: options
                    .dedupe_signing
                    .then(|| Mutex::new(HashMap::new())),
                next_inflight_id: AtomicU64::new(0),
            }),
        }
    }

    /// 全オブジェクトに署名付きURLを付与する（fail-fast）。
    ///
    /// 入力順を保って返す。1件でも失敗した場合は最初に観測したエラーを返し、
    /// 部分的にURLが付与された記述子は返さない。
    pub async fn resolve(
        &self,
        objects: Vec<ObjectDescriptor>,
    ) -> Result<Vec<ObjectDescriptor>, ResolveError> {
        let mut urls: Vec<Option<String>> = vec![None; objects.len()];
        let mut pending = self.spawn_all(&objects);

        while let Some((index, result)) = pending.next().await {
            match result {
                Ok(url) => urls[index] = Some(url),
                Err(e) => {
                    tracing::warn!(
                        object = %e.name(),
                        error = %e,
                        outstanding = pending.len(),
                        "署名付きURLの解決に失敗。一覧全体を失敗として扱います"
                    );
                    return Err(e);
                }
            }
        }

        Ok(objects
            .into_iter()
            .zip(urls)
            .map(|(object, url)| match url {
                Some(url) => object.with_signed_url(url),
                None => object,
            })
            .collect())
    }

    /// オブジェクトごとに解決し、個別の結果を入力順で返す（部分成功）。
    pub async fn resolve_each(
        &self,
        objects: Vec<ObjectDescriptor>,
    ) -> Vec<Result<ObjectDescriptor, ResolveError>> {
        let mut results: Vec<Option<Result<String, ResolveError>>> =
            (0..objects.len()).map(|_| None).collect();
        let mut pending = self.spawn_all(&objects);

        while let Some((index, result)) = pending.next().await {
            results[index] = Some(result);
        }

        objects
            .into_iter()
            .zip(results)
            .map(|(object, result)| {
                let name = object.name.clone();
                match result {
                    Some(Ok(url)) => Ok(object.with_signed_url(url)),
                    Some(Err(e)) => Err(e),
                    None => Err(ResolveError::Aborted {
                        name,
                        reason: "結果が得られませんでした".to_string(),
                    }),
                }
            })
            .collect()
    }

    /// オブジェクト名1件の署名付きURLを取得する。
    pub async fn resolve_name(&self, name: &str) -> Result<String, ResolveError> {
        self.inner.resolve_with_permit(name.to_string()).await
    }

    /// オブジェクトごとに解決タスクを起動する。
    ///
    /// タスクは `tokio::spawn` で切り離して起動するため、呼び出し側が
    /// 途中で結果の待機をやめても各タスクは完了まで実行される。
    fn spawn_all(
        &self,
        objects: &[ObjectDescriptor],
    ) -> FuturesUnordered<BoxFuture<'static, (usize, Result<String, ResolveError>)>> {
        objects
            .iter()
            .enumerate()
            .map(|(index, object)| {
                let inner = Arc::clone(&self.inner);
                let name = object.name.clone();
                let task_name = name.clone();
                let handle =
                    tokio::spawn(async move { inner.resolve_with_permit(task_name).await });
                async move {
                    let result = handle.await.unwrap_or_else(|e| {
                        Err(ResolveError::Aborted {
                            name,
                            reason: e.to_string(),
                        })
                    });
                    (index, result)
                }
                .boxed()
            })
            .collect()
    }
}

impl ResolverInner {
    async fn resolve_with_permit(self: &Arc<Self>, name: String) -> Result<String, ResolveError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ResolveError::Aborted {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        match &self.inflight {
            Some(inflight) => self.resolve_deduplicated(inflight, name).await,
            None => self.lookup_or_sign(&name).await,
        }
    }

    /// 同一キーの実行中の解決があればそれに合流し、なければ新たに登録する。
    async fn resolve_deduplicated(
        self: &Arc<Self>,
        inflight: &Mutex<HashMap<String, Inflight>>,
        name: String,
    ) -> Result<String, ResolveError> {
        let (id, resolution) = {
            let mut map = inflight.lock().unwrap_or_else(PoisonError::into_inner);
            match map.get(&name) {
                Some(entry) => {
                    tracing::debug!(object = %name, "実行中の解決に合流");
                    (entry.id, entry.resolution.clone())
                }
                None => {
                    let id = self.next_inflight_id.fetch_add(1, Ordering::Relaxed);
                    let inner = Arc::clone(self);
                    let key = name.clone();
                    let resolution = async move { inner.lookup_or_sign(&key).await }
                        .boxed()
                        .shared();
                    map.insert(
                        name.clone(),
                        Inflight {
                            id,
                            resolution: resolution.clone(),
                        },
                    );
                    (id, resolution)
                }
            }
        };

        let result = resolution.await;

        let mut map = inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if map.get(&name).is_some_and(|entry| entry.id == id) {
            map.remove(&name);
        }
        result
    }

    async fn lookup_or_sign(&self, name: &str) -> Result<String, ResolveError> {
        let cached = self
            .cache
            .get(name)
            .await
            .map_err(|source| ResolveError::Cache {
                name: name.to_string(),
                source,
            })?;
        // 空の値はミスとして扱い、署名し直して上書きする
        if let Some(url) = cached.filter(|url| !url.is_empty()) {
            tracing::debug!(object = %name, "URLキャッシュにヒット");
            return Ok(url);
        }

        tracing::debug!(object = %name, "URLキャッシュにミス。署名付きURLを生成します");
        let url = self
            .store
            .sign_url(name, SignedUrlAction::Read, self.expires_in)
            .await
            .map_err(|source| ResolveError::Store {
                name: name.to_string(),
                source,
            })?;
        if url.is_empty() {
            return Err(ResolveError::Store {
                name: name.to_string(),
                source: StoreError::Backend("空の署名付きURLが返されました".to_string()),
            });
        }

        self.cache
            .put(name, &url)
            .await
            .map_err(|source| ResolveError::Cache {
                name: name.to_string(),
                source,
            })?;
        tracing::info!(object = %name, "署名付きURLを生成しキャッシュに保存");
        Ok(url)
    }
}
