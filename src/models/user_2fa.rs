use std::fmt;

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// user_2fa テーブルの行
///
/// シークレットは AES-256-GCM で暗号化されて保存される
#[derive(Debug, FromRow)]
pub struct User2faRow {
    pub user_id: Uuid,
    pub is_active: bool,
    pub secret_encrypted: Vec<u8>,
    pub backup_codes: Vec<String>,
    pub backup_codes_viewed: bool,
    pub version: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// ユーザーの二要素認証クレデンシャル（ユーザーと1:1）
///
/// `secret_key` は復号済みの Base32 文字列。
/// シークレットとバックアップコードはシリアライズ・ログ出力しない
#[derive(Clone, Serialize)]
pub struct TwoFactorCredential {
    pub user_id: Uuid,
    pub is_active: bool,
    #[serde(skip)]
    pub secret_key: String,
    #[serde(skip)]
    pub backup_codes: Vec<String>,
    pub backup_codes_viewed: bool,
    /// 楽観的排他制御用のバージョン（更新ごとに +1）
    pub version: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TwoFactorCredential {
    /// 未有効化状態の新しいクレデンシャル
    pub fn new_inactive(user_id: Uuid, secret_key: String) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            user_id,
            is_active: false,
            secret_key,
            backup_codes: Vec::new(),
            backup_codes_viewed: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn remaining_backup_codes(&self) -> usize {
        self.backup_codes.len()
    }
}

impl fmt::Debug for TwoFactorCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoFactorCredential")
            .field("user_id", &self.user_id)
            .field("is_active", &self.is_active)
            .field("secret_key", &"[REDACTED]")
            .field("backup_codes", &self.backup_codes.len())
            .field("backup_codes_viewed", &self.backup_codes_viewed)
            .field("version", &self.version)
            .finish()
    }
}
