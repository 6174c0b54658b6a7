//! # GET /files
//!
//! ブロブストアの全オブジェクトを列挙し、署名付きURLを付与して返す。

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use blobgate_types::{FileListing, ResolveFailure};

use crate::config::{GatewayState, ListingPolicy};
use crate::error::GatewayError;

/// GET /files: オブジェクト一覧。
///
/// `ListingPolicy::FailFast` では1件でも解決に失敗すると一覧全体がエラーになる。
/// `ListingPolicy::Partial` では失敗分を `failures` に入れて残りを返す。
pub async fn handle_files(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<FileListing>, GatewayError> {
    let objects = state.store.list_objects().await?;
    let total = objects.len();

    let listing = match state.listing_policy {
        ListingPolicy::FailFast => FileListing {
            files: state.resolver.resolve(objects).await?,
            failures: Vec::new(),
        },
        ListingPolicy::Partial => {
            let mut listing = FileListing::default();
            for result in state.resolver.resolve_each(objects).await {
                match result {
                    Ok(object) => listing.files.push(object),
                    Err(e) => listing.failures.push(ResolveFailure {
                        name: e.name().to_string(),
                        reason: e.to_string(),
                    }),
                }
            }
            listing
        }
    };

    tracing::info!(
        objects = total,
        failures = listing.failures.len(),
        "オブジェクト一覧を返却"
    );
    Ok(Json(listing))
}
