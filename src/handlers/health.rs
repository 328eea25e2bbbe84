use axum::{Json, extract::State};
use serde::Serialize;

use crate::state::AppState;

/// ヘルスチェックレスポンス
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub version: &'static str,
}

impl HealthResponse {
    fn new(database_ok: bool) -> Self {
        Self {
            status: if database_ok { "ok" } else { "degraded" },
            database: if database_ok { "up" } else { "down" },
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// ヘルスチェックハンドラー
///
/// GET /api/health
///
/// データベース疎通を含めた稼働状況を返す
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_ok = match sqlx::query("SELECT 1").execute(&state.db_pool).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = ?e, "ヘルスチェック: データベース接続失敗");
            false
        }
    };

    Json(HealthResponse::new(database_ok))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_ok() {
        let response = HealthResponse::new(true);
        assert_eq!(response.status, "ok");
        assert_eq!(response.database, "up");
        assert_eq!(response.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_health_response_degraded() {
        let response = HealthResponse::new(false);
        assert_eq!(response.status, "degraded");
        assert_eq!(response.database, "down");
    }
}
