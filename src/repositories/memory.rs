use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::TwoFactorCredential;
use crate::repositories::{TransitionGuard, TwoFactorStore};

/// テスト用のインメモリ実装
///
/// ロック内でチェックと書き込みを行い、PostgreSQL の条件付き UPDATE と同じ不可分性を持つ
#[derive(Clone, Default)]
pub struct MemoryTwoFactorStore {
    records: Arc<Mutex<HashMap<Uuid, TwoFactorCredential>>>,
}

impl MemoryTwoFactorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// テストデータを直接投入
    pub fn insert(&self, credential: TwoFactorCredential) {
        self.lock().insert(credential.user_id, credential);
    }

    pub fn get(&self, user_id: Uuid) -> Option<TwoFactorCredential> {
        self.lock().get(&user_id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, TwoFactorCredential>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TwoFactorStore for MemoryTwoFactorStore {
    async fn find_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<TwoFactorCredential>, AppError> {
        Ok(self.get(user_id))
    }

    async fn create(
        &self,
        user_id: Uuid,
        secret_key: &str,
    ) -> Result<TwoFactorCredential, AppError> {
        let mut records = self.lock();
        let credential = records
            .entry(user_id)
            .or_insert_with(|| TwoFactorCredential::new_inactive(user_id, secret_key.to_string()));
        Ok(credential.clone())
    }

    async fn save_transition(
        &self,
        credential: &TwoFactorCredential,
        guard: &TransitionGuard,
    ) -> Result<Option<TwoFactorCredential>, AppError> {
        let mut records = self.lock();
        let Some(stored) = records.get_mut(&credential.user_id) else {
            return Ok(None);
        };

        let allowed = match guard {
            TransitionGuard::Version(version) => stored.version == *version,
            TransitionGuard::BackupCode(code) => {
                stored.is_active && stored.backup_codes.iter().any(|c| c == code)
            }
        };
        if !allowed {
            return Ok(None);
        }

        stored.is_active = credential.is_active;
        stored.secret_key = credential.secret_key.clone();
        stored.backup_codes = credential.backup_codes.clone();
        stored.backup_codes_viewed = credential.backup_codes_viewed;
        stored.version += 1;
        stored.updated_at = OffsetDateTime::now_utc();

        Ok(Some(stored.clone()))
    }

    async fn consume_backup_code(&self, user_id: Uuid, code: &str) -> Result<bool, AppError> {
        let mut records = self.lock();
        let Some(stored) = records.get_mut(&user_id) else {
            return Ok(false);
        };
        if !stored.is_active || !stored.backup_codes.iter().any(|c| c == code) {
            return Ok(false);
        }

        stored.backup_codes.retain(|c| c != code);
        stored.version += 1;
        stored.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn reveal_backup_codes(&self, user_id: Uuid) -> Result<Option<Vec<String>>, AppError> {
        let mut records = self.lock();
        let Some(stored) = records.get_mut(&user_id) else {
            return Ok(None);
        };
        if !stored.is_active || stored.backup_codes_viewed {
            return Ok(None);
        }

        stored.backup_codes_viewed = true;
        stored.version += 1;
        stored.updated_at = OffsetDateTime::now_utc();
        Ok(Some(stored.backup_codes.clone()))
    }
}
