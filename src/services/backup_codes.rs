use rand::Rng;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::TwoFactorCredential;
use crate::repositories::TwoFactorStore;

const CODE_ALPHABET: &[u8] = b"0123456789ABCDEF";

/// 大文字16進数のバックアップコードを `count` 個生成
///
/// コードごとに新しい乱数を使い、バッチ内の重複は取り除く
pub fn generate_batch(count: usize, length: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let mut codes = Vec::with_capacity(count);

    while codes.len() < count {
        let code: String = (0..length)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        if !codes.contains(&code) {
            codes.push(code);
        }
    }

    codes
}

/// 入力されたバックアップコードを正規化（大文字化、空白・ハイフン除去）
pub fn normalize_backup_code(code: &str) -> String {
    code.trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// バックアップコードの発行・消費・一度限りの表示
#[derive(Clone)]
pub struct BackupCodeManager<S> {
    store: S,
    count: usize,
    length: usize,
}

impl<S: TwoFactorStore> BackupCodeManager<S> {
    pub fn new(store: S, count: usize, length: usize) -> Self {
        Self {
            store,
            count,
            length,
        }
    }

    /// クレデンシャルのバックアップコードを新しいバッチで置き換える（未保存）
    pub fn regenerate(&self, credential: &mut TwoFactorCredential) {
        credential.backup_codes = generate_batch(self.count, self.length);
        credential.backup_codes_viewed = false;
    }

    /// バックアップコードを消費
    ///
    /// # Returns
    /// コードが残っていて削除できた場合のみ true。同じコードの2回目以降は false
    pub async fn consume(&self, user_id: Uuid, code: &str) -> Result<bool, AppError> {
        let code = normalize_backup_code(code);
        if code.is_empty() {
            return Ok(false);
        }

        let consumed = self.store.consume_backup_code(user_id, &code).await?;
        if consumed {
            tracing::info!(user_id = %user_id, "バックアップコード使用");
        } else {
            tracing::warn!(user_id = %user_id, "無効なバックアップコード");
        }
        Ok(consumed)
    }

    /// 未表示のバックアップコードを一度だけ返す
    ///
    /// 表示した時点で viewed になり、以降は空リストを返す
    pub async fn reveal_once(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        match self.store.reveal_backup_codes(user_id).await? {
            Some(codes) => {
                tracing::info!(user_id = %user_id, count = codes.len(), "バックアップコード表示");
                Ok(codes)
            }
            None => Ok(Vec::new()),
        }
    }
}
