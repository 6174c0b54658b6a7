//! # GET /resumable
//!
//! 設定済みの固定オブジェクト名に対する再開可能アップロードのセッションを作成する。

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use blobgate_core::transfer;
use blobgate_types::ResumableSessionResponse;

use crate::config::GatewayState;
use crate::error::GatewayError;

/// GET /resumable: セッションURIの発行。
pub async fn handle_resumable(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<ResumableSessionResponse>, GatewayError> {
    let session = transfer::begin_resumable(
        state.store.as_ref(),
        &state.resumable_object_name,
        &state.resumable_content_type,
    )
    .await?;
    Ok(Json(session))
}

#[cfg(test)]
mod tests {
    use blobgate_types::ResumableSessionResponse;

    use crate::config::GatewayConfig;
    use crate::endpoints::test_helpers::*;

    #[tokio::test]
    async fn test_session_for_configured_object() {
        let config = GatewayConfig {
            resumable_object_name: "videos/raw.mp4".to_string(),
            resumable_content_type: "video/mp4".to_string(),
            ..memory_config()
        };
        let gw = spawn_gateway(config).await;

        let session: ResumableSessionResponse =
            reqwest::get(format!("{}/resumable", gw.base_url))
                .await
                .unwrap()
                .json()
                .await
                .unwrap();

        assert!(session.uri.starts_with("memory://test/upload/videos/raw.mp4?"));
        assert_eq!(session.name, "videos/raw.mp4");
        assert_eq!(session.content_type, "video/mp4");
    }
}
