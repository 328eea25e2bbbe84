use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, OsRng},
};
use data_encoding::BASE32_NOPAD;
use rand::RngCore;

use crate::error::AppError;
use crate::models::TwoFactorCredential;

/// シークレットのバイト長（160ビット）
const SECRET_BYTES: usize = 20;
const NONCE_LEN: usize = 12;

/// 160ビットのランダムシークレットを生成し、Base32（パディングなし）でエンコード
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes)
}

/// シークレットを新しい値に置き換える
///
/// 無効化時のみ呼び出す。旧シークレットから作られたQRコードは以後使えない
pub fn rotate_secret(credential: &mut TwoFactorCredential) {
    credential.secret_key = generate_secret();
}

/// TOTPシークレットの保存用暗号化
///
/// # Security
/// - 保存形式は 96ビットnonce (12バイト) + 暗号文
/// - シークレット平文はログに出力しない
#[derive(Clone)]
pub struct SecretCipher {
    encryption_key: [u8; 32],
}

impl SecretCipher {
    /// # Arguments
    /// * `encryption_key_base64` - Base64エンコードされた32バイトの暗号化キー
    pub fn new(encryption_key_base64: &str) -> Result<Self, AppError> {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        let key_bytes = STANDARD.decode(encryption_key_base64).map_err(|e| {
            tracing::error!(error = ?e, "TOTP暗号化キーのBase64デコードエラー");
            AppError::Internal(anyhow::anyhow!("invalid encryption key format"))
        })?;

        let encryption_key: [u8; 32] = key_bytes.as_slice().try_into().map_err(|_| {
            tracing::error!(
                expected = 32,
                actual = key_bytes.len(),
                "TOTP暗号化キーの長さが不正"
            );
            AppError::Internal(anyhow::anyhow!("encryption key must be 32 bytes"))
        })?;

        Ok(Self { encryption_key })
    }

    fn cipher(&self) -> Result<Aes256Gcm, AppError> {
        Aes256Gcm::new_from_slice(&self.encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })
    }

    /// シークレットを暗号化
    pub fn encrypt(&self, secret: &str) -> Result<Vec<u8>, AppError> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, secret.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "シークレット暗号化エラー");
            AppError::Internal(anyhow::anyhow!("encryption error"))
        })?;

        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// 暗号化されたシークレットを復号
    pub fn decrypt(&self, encrypted: &[u8]) -> Result<String, AppError> {
        if encrypted.len() < NONCE_LEN {
            tracing::error!(len = encrypted.len(), "暗号化データが短すぎる");
            return Err(AppError::Internal(anyhow::anyhow!(
                "encrypted data too short"
            )));
        }

        let cipher = self.cipher()?;
        let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|e| {
            tracing::error!(error = ?e, "シークレット復号エラー");
            AppError::Internal(anyhow::anyhow!("decryption error"))
        })?;

        String::from_utf8(plaintext).map_err(|e| {
            tracing::error!(error = ?e, "復号データのUTF-8変換エラー");
            AppError::Internal(anyhow::anyhow!("invalid utf8 after decryption"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use uuid::Uuid;

    fn create_test_cipher() -> SecretCipher {
        SecretCipher::new(&STANDARD.encode([7u8; 32])).unwrap()
    }

    #[test]
    fn test_generate_secret() {
        let secret = generate_secret();
        // 20バイト = Base32で32文字
        assert_eq!(secret.len(), 32);
        assert!(
            secret
                .chars()
                .all(|c| "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567".contains(c))
        );
    }

    #[test]
    fn test_generate_secret_is_random() {
        assert_ne!(generate_secret(), generate_secret());
    }

    #[test]
    fn test_rotate_secret_replaces_value() {
        let mut credential = TwoFactorCredential::new_inactive(Uuid::new_v4(), generate_secret());
        let old = credential.secret_key.clone();

        rotate_secret(&mut credential);

        assert_ne!(credential.secret_key, old);
        assert_eq!(credential.secret_key.len(), 32);
    }

    #[test]
    fn test_encrypt_decrypt_secret() {
        let cipher = create_test_cipher();
        let original = generate_secret();

        let encrypted = cipher.encrypt(&original).unwrap();
        assert!(encrypted.len() > NONCE_LEN);
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), original);
    }

    #[test]
    fn test_encrypt_uses_fresh_nonce() {
        let cipher = create_test_cipher();
        let secret = generate_secret();
        assert_ne!(cipher.encrypt(&secret).unwrap(), cipher.encrypt(&secret).unwrap());
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let encrypted = create_test_cipher().encrypt(&generate_secret()).unwrap();
        let other = SecretCipher::new(&STANDARD.encode([9u8; 32])).unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_decrypt_too_short() {
        assert!(create_test_cipher().decrypt(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_new_with_invalid_key_length() {
        let short_key = STANDARD.encode([0u8; 16]);
        assert!(SecretCipher::new(&short_key).is_err());
    }

    #[test]
    fn test_new_with_invalid_base64() {
        assert!(SecretCipher::new("not-valid-base64!!!").is_err());
    }
}
