use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::TwoFactorCredential;
use crate::repositories::{TransitionGuard, TwoFactorStore};
use crate::services::backup_codes::{BackupCodeManager, normalize_backup_code};
use crate::services::secret::{generate_secret, rotate_secret};
use crate::services::totp;

/// 有効化・無効化リクエストの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOutcome {
    Enabled,
    Disabled,
    Unchanged,
}

/// 2FAの状態（シークレット・コードは含まない）
#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorStatus {
    pub is_active: bool,
    pub backup_codes_remaining: usize,
    pub backup_codes_viewed: bool,
}

impl From<&TwoFactorCredential> for TwoFactorStatus {
    fn from(credential: &TwoFactorCredential) -> Self {
        Self {
            is_active: credential.is_active,
            backup_codes_remaining: credential.remaining_backup_codes(),
            backup_codes_viewed: credential.backup_codes_viewed,
        }
    }
}

/// 二要素認証のライフサイクル（Inactive ⇄ Active）
///
/// # Security
/// - コード・シークレットはログ出力禁止
/// - 状態変更は条件付きの単一書き込みで行い、失敗時は何も保存しない
#[derive(Clone)]
pub struct TwoFactorService<S> {
    store: S,
    backup_codes: BackupCodeManager<S>,
    valid_window: u8,
}

impl<S: TwoFactorStore> TwoFactorService<S> {
    pub fn new(store: S, valid_window: u8, backup_code_count: usize, backup_code_length: usize) -> Self {
        let backup_codes =
            BackupCodeManager::new(store.clone(), backup_code_count, backup_code_length);
        Self {
            store,
            backup_codes,
            valid_window,
        }
    }

    /// クレデンシャルを取得（存在しなければ作成）
    pub async fn ensure_credential(&self, user_id: Uuid) -> Result<TwoFactorCredential, AppError> {
        if let Some(credential) = self.store.find_by_user_id(user_id).await? {
            return Ok(credential);
        }

        tracing::info!(user_id = %user_id, "2FAクレデンシャルを作成");
        self.store.create(user_id, &generate_secret()).await
    }

    pub async fn status(&self, user_id: Uuid) -> Result<TwoFactorStatus, AppError> {
        let credential = self.ensure_credential(user_id).await?;
        Ok(TwoFactorStatus::from(&credential))
    }

    /// 2FAの有効化・無効化
    ///
    /// 処理フロー:
    /// 1. 現在の状態と要求された状態を比較（同じなら何もしない）
    /// 2. コードの有無を確認
    /// 3. 有効化: TOTPコードを検証 / 無効化: TOTPコード、次にバックアップコードを検証
    /// 4. 条件付きで保存（バックアップコードは同じ書き込みで消費）
    pub async fn enable_or_disable(
        &self,
        user_id: Uuid,
        desired_active: bool,
        submitted_code: Option<&str>,
    ) -> Result<TransitionOutcome, AppError> {
        let credential = self.ensure_credential(user_id).await?;

        if credential.is_active == desired_active {
            return Ok(TransitionOutcome::Unchanged);
        }

        let code = submitted_code.map(str::trim).filter(|code| !code.is_empty());

        if desired_active {
            let code = code.ok_or(AppError::EnableCodeRequired)?;
            self.enable(credential, code).await
        } else {
            let code = code.ok_or(AppError::DisableCodeRequired)?;
            self.disable(credential, code).await
        }
    }

    async fn enable(
        &self,
        credential: TwoFactorCredential,
        code: &str,
    ) -> Result<TransitionOutcome, AppError> {
        let user_id = credential.user_id;

        if !totp::verify_code(&credential.secret_key, code, self.valid_window) {
            tracing::warn!(user_id = %user_id, "2FA有効化失敗: コード不一致");
            return Err(AppError::TotpInvalid);
        }

        let guard = TransitionGuard::Version(credential.version);
        let mut pending = credential;
        pending.is_active = true;
        self.backup_codes.regenerate(&mut pending);

        self.persist(pending, &guard).await?;

        tracing::info!(user_id = %user_id, "2FA有効化完了");
        Ok(TransitionOutcome::Enabled)
    }

    async fn disable(
        &self,
        credential: TwoFactorCredential,
        code: &str,
    ) -> Result<TransitionOutcome, AppError> {
        let user_id = credential.user_id;

        let guard = if totp::verify_code(&credential.secret_key, code, self.valid_window) {
            TransitionGuard::Version(credential.version)
        } else {
            let backup_code = normalize_backup_code(code);
            if !credential.backup_codes.contains(&backup_code) {
                tracing::warn!(user_id = %user_id, "2FA無効化失敗: コード不一致");
                return Err(AppError::TotpInvalid);
            }
            TransitionGuard::BackupCode(backup_code)
        };

        let mut pending = credential;
        pending.is_active = false;
        rotate_secret(&mut pending);
        pending.backup_codes.clear();
        pending.backup_codes_viewed = false;

        self.persist(pending, &guard).await?;

        tracing::info!(
            user_id = %user_id,
            via_backup_code = matches!(guard, TransitionGuard::BackupCode(_)),
            "2FA無効化完了"
        );
        Ok(TransitionOutcome::Disabled)
    }

    /// 条件付き保存。競合時は無効なコードとして扱う
    async fn persist(
        &self,
        pending: TwoFactorCredential,
        guard: &TransitionGuard,
    ) -> Result<TwoFactorCredential, AppError> {
        match self.store.save_transition(&pending, guard).await? {
            Some(saved) => Ok(saved),
            None => {
                tracing::warn!(user_id = %pending.user_id, "2FA状態変更の競合");
                Err(AppError::TotpInvalid)
            }
        }
    }

    /// ログイン時のコード検証（TOTP、次にバックアップコード）
    ///
    /// 2FAが無効なユーザーは常に false
    pub async fn verify(&self, user_id: Uuid, code: &str) -> Result<bool, AppError> {
        let Some(credential) = self.store.find_by_user_id(user_id).await? else {
            return Ok(false);
        };
        if !credential.is_active {
            return Ok(false);
        }

        if totp::verify_code(&credential.secret_key, code, self.valid_window) {
            return Ok(true);
        }

        self.backup_codes.consume(user_id, code).await
    }

    /// 未表示のバックアップコードを一度だけ返す
    pub async fn reveal_backup_codes_once(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        self.backup_codes.reveal_once(user_id).await
    }
}
