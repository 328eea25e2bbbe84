use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// ログインリクエスト
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// ユーザーのメールアドレス
    pub email: String,
    /// ユーザーのパスワード
    pub password: String,
    /// 2FA認証コードまたはバックアップコード（2FA有効ユーザーのみ必須）
    pub code: Option<String>,
}

/// ログインレスポンス
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    /// 認証が完了したかどうか
    pub authenticated: bool,
    /// 2FAコードの入力が必要かどうか
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_2fa: Option<bool>,
}

/// ログインハンドラー
///
/// POST /api/login
///
/// 処理フロー:
/// 1. リクエストバリデーション
/// 2. ユーザー認証（DB照合）
/// 3. 2FA有効チェック（有効でコードなしなら requires_2fa: true を返却）
/// 4. 2FAコード検証（バックアップコードは消費）
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    // 1. リクエストバリデーション
    validate_login_request(&request)?;

    // 2. ユーザー認証
    let user = state
        .auth_service
        .authenticate(&request.email, &request.password)
        .await?;

    // 3. 2FA有効チェック
    let status = state.two_factor_service.status(user.id).await?;
    if status.is_active {
        let Some(code) = request.code.as_deref().filter(|c| !c.trim().is_empty()) else {
            return Ok(Json(LoginResponse {
                user_id: user.id,
                authenticated: false,
                requires_2fa: Some(true),
            }));
        };

        // 4. 2FAコード検証
        let valid = state.two_factor_service.verify(user.id, code).await?;
        ensure_second_factor(user.id, valid)?;
    }

    tracing::info!(user_id = %user.id, "ログイン成功");

    Ok(Json(LoginResponse {
        user_id: user.id,
        authenticated: true,
        requires_2fa: None,
    }))
}

/// 2FAコード検証結果の判定
///
/// パスワードは確認済みのため、認証コード固有のエラーを返す
fn ensure_second_factor(user_id: Uuid, valid: bool) -> Result<(), AppError> {
    if !valid {
        tracing::warn!(user_id = %user_id, "ログイン失敗: 2FAコード不一致");
        return Err(AppError::TotpInvalid);
    }
    Ok(())
}

/// ログインリクエストのバリデーション
fn validate_login_request(request: &LoginRequest) -> Result<(), AppError> {
    // email: 必須、メール形式
    if request.email.trim().is_empty() {
        return Err(AppError::Validation("メールアドレスは必須です".to_string()));
    }

    // 簡易的なメール形式チェック（@ が含まれているか）
    if !request.email.contains('@') {
        return Err(AppError::Validation(
            "有効なメールアドレスを入力してください".to_string(),
        ));
    }

    // password: 必須
    if request.password.is_empty() {
        return Err(AppError::Validation("パスワードは必須です".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
            code: None,
        }
    }

    #[test]
    fn test_validate_empty_email() {
        assert!(validate_login_request(&request("", "password123")).is_err());
    }

    #[test]
    fn test_validate_invalid_email() {
        assert!(validate_login_request(&request("invalid-email", "password123")).is_err());
    }

    #[test]
    fn test_validate_empty_password() {
        assert!(validate_login_request(&request("test@example.com", "")).is_err());
    }

    #[test]
    fn test_validate_valid_request() {
        assert!(validate_login_request(&request("test@example.com", "password123")).is_ok());
    }

    #[test]
    fn test_wrong_2fa_code_is_not_a_password_error() {
        assert!(ensure_second_factor(Uuid::nil(), true).is_ok());

        let error = ensure_second_factor(Uuid::nil(), false).unwrap_err();
        assert!(matches!(error, AppError::TotpInvalid));
        assert_eq!(error.to_string(), "認証コードが無効です");
    }

    #[test]
    fn test_requires_2fa_response_shape() {
        let response = LoginResponse {
            user_id: Uuid::nil(),
            authenticated: false,
            requires_2fa: Some(true),
        };
        let json = serde_json::to_value(response).unwrap();
        assert_eq!(json["authenticated"], false);
        assert_eq!(json["requires_2fa"], true);
    }
}
