use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;
use crate::services::auth::confirm_password;
use crate::services::provisioning;
use crate::services::{TransitionOutcome, TwoFactorStatus};
use crate::state::AppState;

/// 入力コードの最大長（バックアップコード + 区切り文字の余裕）
const MAX_CODE_LEN: usize = 32;

// === 2FA Status ===

/// GET /api/users/{user_id}/2fa
pub async fn get_2fa_status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<TwoFactorStatus>, AppError> {
    let user = find_user(&state, user_id).await?;
    let status = state.two_factor_service.status(user.id).await?;
    Ok(Json(status))
}

// === 2FA Update (enable / disable) ===

/// パスワード再確認のみのリクエスト
#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub password: String,
    pub is_active: bool,
    #[serde(default)]
    pub otp_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub outcome: TransitionOutcome,
    #[serde(flatten)]
    pub status: TwoFactorStatus,
}

/// PUT /api/users/{user_id}/2fa
///
/// 2FAの有効化・無効化
///
/// # Security
/// - パスワード再確認必須
/// - 有効化はTOTPコード必須、無効化はTOTPコードまたはバックアップコード必須
/// - コードはログ出力禁止
pub async fn update_2fa(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<UpdateResponse>, AppError> {
    validate_code_length(request.otp_code.as_deref())?;

    let user = verify_user_password(&state, user_id, &request.password).await?;

    let outcome = state
        .two_factor_service
        .enable_or_disable(user.id, request.is_active, request.otp_code.as_deref())
        .await?;

    let status = state.two_factor_service.status(user.id).await?;

    Ok(Json(UpdateResponse { outcome, status }))
}

// === Provisioning ===

#[derive(Debug, Serialize)]
pub struct ProvisioningResponse {
    pub provisioning_uri: String,
    pub qr_code: String,
}

/// POST /api/users/{user_id}/2fa/provisioning
///
/// 認証アプリ登録用のURIとQRコード（2FA無効時のみ）
///
/// # Security
/// - パスワード再確認必須
/// - シークレット平文はログ出力禁止
pub async fn request_provisioning(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<PasswordRequest>,
) -> Result<Json<ProvisioningResponse>, AppError> {
    let user = verify_user_password(&state, user_id, &request.password).await?;
    let credential = state.two_factor_service.ensure_credential(user.id).await?;

    if credential.is_active {
        return Err(AppError::TotpAlreadyEnabled);
    }

    let issuer = state.provisioning_service.issuer().await?;
    let provisioning_uri =
        provisioning::provisioning_uri(&issuer, &user.email, &credential.secret_key)?;
    let qr_code = provisioning::qr_code_data_uri(&issuer, &user.email, &credential.secret_key)?;

    tracing::info!(user_id = %user.id, "2FAプロビジョニング情報を返却");

    Ok(Json(ProvisioningResponse {
        provisioning_uri,
        qr_code,
    }))
}

// === Backup codes ===

#[derive(Debug, Serialize)]
pub struct BackupCodesResponse {
    pub backup_codes: Vec<String>,
}

/// POST /api/users/{user_id}/2fa/backup-codes/reveal
///
/// 発行後に一度だけバックアップコードを返す。2回目以降は空リスト
///
/// 本人以外に表示枠を消費されないようパスワード再確認必須
pub async fn reveal_backup_codes(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<PasswordRequest>,
) -> Result<Json<BackupCodesResponse>, AppError> {
    let user = verify_user_password(&state, user_id, &request.password).await?;
    let backup_codes = state
        .two_factor_service
        .reveal_backup_codes_once(user.id)
        .await?;

    Ok(Json(BackupCodesResponse { backup_codes }))
}

// === Verify ===

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub password: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
}

/// POST /api/users/{user_id}/2fa/verify
///
/// TOTPコードまたはバックアップコードの検証（バックアップコードは消費される）
///
/// パスワード再確認必須
pub async fn verify_2fa(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    validate_code_length(Some(request.code.as_str()))?;

    let user = verify_user_password(&state, user_id, &request.password).await?;
    let valid = state
        .two_factor_service
        .verify(user.id, &request.code)
        .await?;

    Ok(Json(VerifyResponse { valid }))
}

// === Helper Functions ===

/// コード長バリデーション（内容の検証はサービス側で行う）
fn validate_code_length(code: Option<&str>) -> Result<(), AppError> {
    if code.is_some_and(|code| code.len() > MAX_CODE_LEN) {
        return Err(AppError::Validation(
            "認証コードが長すぎます".to_string(),
        ));
    }
    Ok(())
}

/// パスワードバリデーション
fn validate_password(password: &str) -> Result<(), AppError> {
    if password.is_empty() {
        return Err(AppError::Validation("パスワードは必須です".to_string()));
    }
    Ok(())
}

/// ユーザー取得とパスワード再確認
async fn verify_user_password(
    state: &AppState,
    user_id: Uuid,
    password: &str,
) -> Result<User, AppError> {
    validate_password(password)?;

    let user = find_user(state, user_id).await?;
    confirm_password(&user, password)?;
    Ok(user)
}

async fn find_user(state: &AppState, user_id: Uuid) -> Result<User, AppError> {
    state
        .user_repo
        .find_by_id(user_id)
        .await?
        .ok_or(AppError::UserNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_missing_code() {
        assert!(validate_code_length(None).is_ok());
    }

    #[test]
    fn test_validate_normal_codes() {
        assert!(validate_code_length(Some("123 456")).is_ok());
        assert!(validate_code_length(Some("AB12-CD34")).is_ok());
    }

    #[test]
    fn test_validate_too_long_code() {
        let code = "1".repeat(MAX_CODE_LEN + 1);
        assert!(validate_code_length(Some(code.as_str())).is_err());
    }

    #[test]
    fn test_validate_empty_password() {
        assert!(matches!(
            validate_password(""),
            Err(AppError::Validation(_))
        ));
        assert!(validate_password("password123").is_ok());
    }

    #[test]
    fn test_update_request_without_code() {
        let request: UpdateRequest =
            serde_json::from_str(r#"{"password": "password123", "is_active": true}"#).unwrap();
        assert!(request.is_active);
        assert!(request.otp_code.is_none());
    }

    #[test]
    fn test_requests_without_password_are_rejected() {
        assert!(serde_json::from_str::<UpdateRequest>(r#"{"is_active": false}"#).is_err());
        assert!(serde_json::from_str::<VerifyRequest>(r#"{"code": "123456"}"#).is_err());
        assert!(serde_json::from_str::<PasswordRequest>("{}").is_err());
    }

    #[test]
    fn test_update_response_shape() {
        let response = UpdateResponse {
            outcome: TransitionOutcome::Enabled,
            status: TwoFactorStatus {
                is_active: true,
                backup_codes_remaining: 10,
                backup_codes_viewed: false,
            },
        };
        let json = serde_json::to_value(response).unwrap();
        assert_eq!(json["outcome"], "enabled");
        assert_eq!(json["is_active"], true);
        assert_eq!(json["backup_codes_remaining"], 10);
    }
}
