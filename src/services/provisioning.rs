use data_encoding::BASE32_NOPAD;
use totp_rs::{Algorithm, TOTP};

use crate::error::AppError;
use crate::repositories::SiteSettingsRepository;
use crate::services::totp::{TOTP_DIGITS, TOTP_STEP};

/// プロビジョニングURIとQRコードの生成（表示専用）
///
/// 常に現在のシークレットから生成すること。ローテーション後の古いQRコードは再利用しない
#[derive(Clone)]
pub struct ProvisioningService {
    site_repo: SiteSettingsRepository,
    default_issuer: String,
}

impl ProvisioningService {
    pub fn new(site_repo: SiteSettingsRepository, default_issuer: String) -> Self {
        Self {
            site_repo,
            default_issuer,
        }
    }

    /// 発行者名を解決（サイト名、未登録なら設定値）
    pub async fn issuer(&self) -> Result<String, AppError> {
        let site_name = self
            .site_repo
            .first()
            .await?
            .map(|settings| settings.site_name)
            .filter(|name| !name.trim().is_empty());

        Ok(site_name.unwrap_or_else(|| self.default_issuer.clone()))
    }
}

/// `otpauth://totp/{issuer}:{account}?secret=...&issuer=...` 形式のURIを生成
pub fn provisioning_uri(issuer: &str, account: &str, secret: &str) -> Result<String, AppError> {
    Ok(create_totp(issuer, account, secret)?.get_url())
}

/// QRコードを生成（PNG形式、data URI）
pub fn qr_code_data_uri(issuer: &str, account: &str, secret: &str) -> Result<String, AppError> {
    let qr_code = create_totp(issuer, account, secret)?
        .get_qr_base64()
        .map_err(|e| {
            tracing::error!(error = %e, "QRコード生成エラー");
            AppError::Internal(anyhow::anyhow!("qr code generation error"))
        })?;

    Ok(format!("data:image/png;base64,{}", qr_code))
}

/// TOTP オブジェクトを作成（発行者・アカウント名付き）
fn create_totp(issuer: &str, account: &str, secret: &str) -> Result<TOTP, AppError> {
    let secret_bytes = BASE32_NOPAD.decode(secret.as_bytes()).map_err(|e| {
        tracing::error!(error = ?e, "シークレットのBase32デコードエラー");
        AppError::Internal(anyhow::anyhow!("invalid base32 secret"))
    })?;

    TOTP::new(
        Algorithm::SHA1,
        TOTP_DIGITS,
        1,
        TOTP_STEP,
        secret_bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| {
        tracing::error!(error = %e, "TOTP作成エラー");
        AppError::Internal(anyhow::anyhow!("totp creation error"))
    })
}
