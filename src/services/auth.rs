use std::sync::LazyLock;

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::User;
use crate::repositories::{PgTwoFactorStore, UserRepository};
use crate::services::secret::{SecretCipher, generate_secret};

/// タイミング攻撃対策用のダミーハッシュ
///
/// 実在ユーザーと同じパラメータで生成し、検証コストを揃える
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| {
    hash_password("eskoz-dummy-password").unwrap_or_else(|e| {
        tracing::error!(error = ?e, "ダミーハッシュ生成エラー");
        String::new()
    })
});

/// パスワードをargon2idでハッシュ化
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!(error = ?e, "パスワードハッシュ生成エラー");
            AppError::Internal(anyhow::anyhow!("password hash error"))
        })?;
    Ok(hash.to_string())
}

/// パスワードを検証
fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| {
        tracing::error!(error = ?e, "パスワードハッシュのパースエラー");
        AppError::Internal(anyhow::anyhow!("password hash parse error"))
    })?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// 認証・アカウント作成サービス
#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    user_repo: UserRepository,
    cipher: SecretCipher,
}

impl AuthService {
    pub fn new(pool: PgPool, user_repo: UserRepository, cipher: SecretCipher) -> Self {
        Self {
            pool,
            user_repo,
            cipher,
        }
    }

    /// ユーザーと2FAクレデンシャル（未有効化）を同一トランザクションで作成
    ///
    /// # Security
    /// - パスワードはログに出力しない
    pub async fn register(&self, email: &str, password: &str) -> Result<User, AppError> {
        let password_hash = hash_password(password)?;

        let mut tx = self.pool.begin().await?;

        let user = UserRepository::insert_user(&mut *tx, email, &password_hash)
            .await
            .map_err(|e| {
                // UNIQUE制約違反チェック
                if let sqlx::Error::Database(db_err) = &e
                    && db_err.constraint() == Some("users_email_key")
                {
                    return AppError::EmailAlreadyExists;
                }
                AppError::Database(e)
            })?;

        PgTwoFactorStore::insert(&mut *tx, &self.cipher, user.id, &generate_secret()).await?;

        tx.commit().await?;

        tracing::info!(user_id = %user.id, "ユーザー登録成功");
        Ok(user)
    }

    /// ユーザー認証を実行
    ///
    /// タイミング攻撃対策: ユーザーが存在しない場合もダミーのパスワード検証を実行
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AppError> {
        let Some(user) = self.user_repo.find_by_email(email).await? else {
            let _ = verify_password(password, &DUMMY_HASH);
            tracing::warn!(email = %email, "認証失敗: ユーザー不在");
            return Err(AppError::Authentication("invalid_credentials".to_string()));
        };

        confirm_password(&user, password)?;
        Ok(user)
    }
}

/// 取得済みユーザーのパスワードを再確認（2FA操作の本人確認用）
pub fn confirm_password(user: &User, password: &str) -> Result<(), AppError> {
    if verify_password(password, &user.password_hash)? {
        tracing::info!(user_id = %user.id, "パスワード認証成功");
        Ok(())
    } else {
        tracing::warn!(user_id = %user.id, "認証失敗: パスワード不一致");
        Err(AppError::Authentication("invalid_credentials".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("password123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("password123", &hash).unwrap());
        assert!(!verify_password("password124", &hash).unwrap());
    }

    #[test]
    fn test_verify_password_with_invalid_hash() {
        assert!(verify_password("password123", "invalid_hash_format").is_err());
    }

    #[test]
    fn test_dummy_hash_is_verifiable() {
        // パースに失敗すると argon2 の計算が走らず応答時間に差が出る
        let result = verify_password("password123", &DUMMY_HASH);
        assert!(result.is_ok());
        assert!(!result.unwrap());
    }

    #[test]
    fn test_dummy_hash_uses_default_params() {
        let real = hash_password("password123").unwrap();
        let dummy = PasswordHash::new(&DUMMY_HASH).unwrap();
        let real = PasswordHash::new(&real).unwrap();
        assert_eq!(dummy.algorithm, real.algorithm);
        assert_eq!(dummy.params, real.params);
    }

    fn user_with_password(password: &str) -> User {
        User {
            id: uuid::Uuid::new_v4(),
            email: "admin@example.com".to_string(),
            password_hash: hash_password(password).unwrap(),
            created_at: time::OffsetDateTime::now_utc(),
            updated_at: time::OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn test_confirm_password() {
        let user = user_with_password("password123");
        assert!(confirm_password(&user, "password123").is_ok());
    }

    #[test]
    fn test_confirm_password_rejects_wrong_password() {
        let user = user_with_password("password123");
        let result = confirm_password(&user, "password124");
        assert!(matches!(result, Err(AppError::Authentication(_))));
    }
}
