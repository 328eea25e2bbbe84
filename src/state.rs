use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppError;
use crate::repositories::{PgTwoFactorStore, SiteSettingsRepository, UserRepository};
use crate::services::{AuthService, ProvisioningService, SecretCipher, TwoFactorService};
use secrecy::ExposeSecret;

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL コネクションプール
    pub db_pool: PgPool,
    /// ユーザーリポジトリ
    pub user_repo: UserRepository,
    /// 認証・アカウント作成サービス
    pub auth_service: AuthService,
    /// 2FAライフサイクルサービス
    pub two_factor_service: TwoFactorService<PgTwoFactorStore>,
    /// プロビジョニングURI・QRコード
    pub provisioning_service: ProvisioningService,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(db_pool: PgPool, config: Config) -> Result<Self, AppError> {
        let cipher = SecretCipher::new(config.encryption_key.expose_secret())?;

        let user_repo = UserRepository::new(db_pool.clone());
        let auth_service = AuthService::new(db_pool.clone(), user_repo.clone(), cipher.clone());

        let store = PgTwoFactorStore::new(db_pool.clone(), cipher);
        let two_factor_service = TwoFactorService::new(
            store,
            config.totp_valid_window,
            config.backup_code_count,
            config.backup_code_length,
        );

        let provisioning_service = ProvisioningService::new(
            SiteSettingsRepository::new(db_pool.clone()),
            config.totp_issuer.clone(),
        );

        Ok(Self {
            db_pool,
            user_repo,
            auth_service,
            two_factor_service,
            provisioning_service,
        })
    }
}
