use std::future::Future;

use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{TwoFactorCredential, User2faRow};
use crate::services::secret::SecretCipher;

/// 状態遷移の書き込み条件
///
/// 条件を満たさない場合は何も書き込まれず、競合として扱う
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionGuard {
    /// 読み込み時のバージョンから変化していないこと
    Version(i64),
    /// 2FAが有効で、指定のバックアップコードがまだ残っていること
    BackupCode(String),
}

/// 二要素認証クレデンシャルの永続化
///
/// 更新系はすべて単一の条件付き書き込みで完結すること
pub trait TwoFactorStore: Clone + Send + Sync + 'static {
    /// ユーザーIDでクレデンシャルを検索
    fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Option<TwoFactorCredential>, AppError>> + Send;

    /// 未有効化のクレデンシャルを作成（既存の場合はそれを返す）
    fn create(
        &self,
        user_id: Uuid,
        secret_key: &str,
    ) -> impl Future<Output = Result<TwoFactorCredential, AppError>> + Send;

    /// `guard` を満たす場合のみ is_active / secret_key / backup_codes /
    /// backup_codes_viewed を書き込む
    ///
    /// # Returns
    /// 書き込み後のクレデンシャル。条件不成立なら None
    fn save_transition(
        &self,
        credential: &TwoFactorCredential,
        guard: &TransitionGuard,
    ) -> impl Future<Output = Result<Option<TwoFactorCredential>, AppError>> + Send;

    /// バックアップコードが残っていれば取り除く（チェックと削除は不可分）
    fn consume_backup_code(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// 未表示なら viewed を立てて現在のバックアップコードを返す
    ///
    /// 2FA無効、または表示済みの場合は None
    fn reveal_backup_codes(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Option<Vec<String>>, AppError>> + Send;
}

const COLUMNS: &str =
    "user_id, is_active, secret_encrypted, backup_codes, backup_codes_viewed, version, created_at, updated_at";

/// PostgreSQL 実装
#[derive(Clone)]
pub struct PgTwoFactorStore {
    pool: PgPool,
    cipher: SecretCipher,
}

impl PgTwoFactorStore {
    pub fn new(pool: PgPool, cipher: SecretCipher) -> Self {
        Self { pool, cipher }
    }

    /// 任意のエグゼキューター（トランザクション含む）でクレデンシャルを作成
    ///
    /// ユーザー作成と同一トランザクションで呼び出すこと
    pub async fn insert<'e, E: PgExecutor<'e>>(
        executor: E,
        cipher: &SecretCipher,
        user_id: Uuid,
        secret_key: &str,
    ) -> Result<TwoFactorCredential, AppError> {
        let secret_encrypted = cipher.encrypt(secret_key)?;

        let row = sqlx::query_as::<_, User2faRow>(&format!(
            r#"
            INSERT INTO user_2fa (user_id, secret_encrypted)
            VALUES ($1, $2)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(secret_encrypted)
        .fetch_one(executor)
        .await?;

        Self::into_credential(cipher, row)
    }

    fn into_credential(
        cipher: &SecretCipher,
        row: User2faRow,
    ) -> Result<TwoFactorCredential, AppError> {
        Ok(TwoFactorCredential {
            user_id: row.user_id,
            is_active: row.is_active,
            secret_key: cipher.decrypt(&row.secret_encrypted)?,
            backup_codes: row.backup_codes,
            backup_codes_viewed: row.backup_codes_viewed,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TwoFactorStore for PgTwoFactorStore {
    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<TwoFactorCredential>, AppError> {
        let row = sqlx::query_as::<_, User2faRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM user_2fa
            WHERE user_id = $1
            "#
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| Self::into_credential(&self.cipher, row))
            .transpose()
    }

    async fn create(
        &self,
        user_id: Uuid,
        secret_key: &str,
    ) -> Result<TwoFactorCredential, AppError> {
        let secret_encrypted = self.cipher.encrypt(secret_key)?;

        // 同時作成時は既存行を優先する
        let inserted = sqlx::query_as::<_, User2faRow>(&format!(
            r#"
            INSERT INTO user_2fa (user_id, secret_encrypted)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO NOTHING
            RETURNING {COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(secret_encrypted)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => Self::into_credential(&self.cipher, row),
            None => self.find_by_user_id(user_id).await?.ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("user_2fa row vanished after conflict"))
            }),
        }
    }

    async fn save_transition(
        &self,
        credential: &TwoFactorCredential,
        guard: &TransitionGuard,
    ) -> Result<Option<TwoFactorCredential>, AppError> {
        let secret_encrypted = self.cipher.encrypt(&credential.secret_key)?;

        let (condition, guard_value) = match guard {
            TransitionGuard::Version(version) => ("version = $6", GuardValue::Version(*version)),
            TransitionGuard::BackupCode(code) => (
                "is_active AND $6 = ANY(backup_codes)",
                GuardValue::Code(code.as_str()),
            ),
        };

        let sql = format!(
            r#"
            UPDATE user_2fa
            SET is_active = $2,
                secret_encrypted = $3,
                backup_codes = $4,
                backup_codes_viewed = $5,
                version = version + 1,
                updated_at = NOW()
            WHERE user_id = $1 AND {condition}
            RETURNING {COLUMNS}
            "#
        );

        let query = sqlx::query_as::<_, User2faRow>(&sql)
            .bind(credential.user_id)
            .bind(credential.is_active)
            .bind(secret_encrypted)
            .bind(&credential.backup_codes)
            .bind(credential.backup_codes_viewed);

        let query = match guard_value {
            GuardValue::Version(version) => query.bind(version),
            GuardValue::Code(code) => query.bind(code),
        };

        let row = query.fetch_optional(&self.pool).await?;

        row.map(|row| Self::into_credential(&self.cipher, row))
            .transpose()
    }

    async fn consume_backup_code(&self, user_id: Uuid, code: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE user_2fa
            SET backup_codes = array_remove(backup_codes, $2),
                version = version + 1,
                updated_at = NOW()
            WHERE user_id = $1 AND is_active AND $2 = ANY(backup_codes)
            "#,
        )
        .bind(user_id)
        .bind(code)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn reveal_backup_codes(&self, user_id: Uuid) -> Result<Option<Vec<String>>, AppError> {
        let codes = sqlx::query_scalar::<_, Vec<String>>(
            r#"
            UPDATE user_2fa
            SET backup_codes_viewed = true,
                version = version + 1,
                updated_at = NOW()
            WHERE user_id = $1 AND is_active AND NOT backup_codes_viewed
            RETURNING backup_codes
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(codes)
    }
}

enum GuardValue<'a> {
    Version(i64),
    Code(&'a str),
}
