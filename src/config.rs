use secrecy::SecretBox;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    // 2FA (TOTP) 設定
    /// TOTP発行者名（site_settings が未登録の場合のフォールバック）
    #[serde(default = "default_totp_issuer")]
    pub totp_issuer: String,
    /// AES-256暗号化キー（Base64エンコード、32バイト）
    pub encryption_key: SecretBox<String>,
    /// 検証時に許容する前後のステップ数（1ステップ = 30秒）
    #[serde(default = "default_totp_valid_window")]
    pub totp_valid_window: u8,

    // バックアップコード設定
    #[serde(default = "default_backup_code_count")]
    pub backup_code_count: usize,
    #[serde(default = "default_backup_code_length")]
    pub backup_code_length: usize,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_TOTP_ISSUER: &str = "Eskoz";
const DEFAULT_TOTP_VALID_WINDOW: u8 = 2;
const DEFAULT_BACKUP_CODE_COUNT: usize = 10;
const DEFAULT_BACKUP_CODE_LENGTH: usize = 8;
/// バッチあたりのバックアップコード上限
const MAX_BACKUP_CODE_COUNT: usize = 1000;
/// 認証コード入力欄の最大長に合わせる
const MAX_BACKUP_CODE_LENGTH: usize = 32;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_database_max_connections() -> u32 {
    DEFAULT_DATABASE_MAX_CONNECTIONS
}

fn default_totp_issuer() -> String {
    DEFAULT_TOTP_ISSUER.to_string()
}

fn default_totp_valid_window() -> u8 {
    DEFAULT_TOTP_VALID_WINDOW
}

fn default_backup_code_count() -> usize {
    DEFAULT_BACKUP_CODE_COUNT
}

fn default_backup_code_length() -> usize {
    DEFAULT_BACKUP_CODE_LENGTH
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// 設定値の整合性チェック
    pub fn validate(&self) -> Result<(), String> {
        if self.backup_code_count == 0 {
            return Err("BACKUP_CODE_COUNT must be greater than 0".to_string());
        }
        if self.backup_code_count > MAX_BACKUP_CODE_COUNT {
            return Err(format!(
                "BACKUP_CODE_COUNT must be at most {}",
                MAX_BACKUP_CODE_COUNT
            ));
        }
        if !(6..=MAX_BACKUP_CODE_LENGTH).contains(&self.backup_code_length) {
            return Err(format!(
                "BACKUP_CODE_LENGTH must be between 6 and {}",
                MAX_BACKUP_CODE_LENGTH
            ));
        }
        if self.totp_issuer.contains(':') {
            return Err("TOTP_ISSUER must not contain ':'".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn load_from(vars: &[(&str, &str)]) -> Result<Config, envy::Error> {
        envy::from_iter(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_load_with_defaults() {
        let config = load_from(&[
            ("database_url", "postgres://localhost/eskoz"),
            ("encryption_key", "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="),
        ])
        .unwrap();

        assert_eq!(config.database_url.expose_secret(), "postgres://localhost/eskoz");
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.totp_issuer, "Eskoz");
        assert_eq!(config.totp_valid_window, 2);
        assert_eq!(config.backup_code_count, 10);
        assert_eq!(config.backup_code_length, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_encryption_key() {
        let result = load_from(&[("database_url", "postgres://localhost/eskoz")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_issuer_with_colon() {
        let config = load_from(&[
            ("database_url", "postgres://localhost/eskoz"),
            ("encryption_key", "key"),
            ("totp_issuer", "Eskoz:Admin"),
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_backup_codes() {
        let config = load_from(&[
            ("database_url", "postgres://localhost/eskoz"),
            ("encryption_key", "key"),
            ("backup_code_count", "0"),
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_too_many_backup_codes() {
        let config = load_from(&[
            ("database_url", "postgres://localhost/eskoz"),
            ("encryption_key", "key"),
            ("backup_code_count", "1001"),
        ])
        .unwrap();
        assert!(config.validate().is_err());

        let config = load_from(&[
            ("database_url", "postgres://localhost/eskoz"),
            ("encryption_key", "key"),
            ("backup_code_count", "1000"),
        ])
        .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_backup_code_length_bounds() {
        for (length, ok) in [("5", false), ("6", true), ("32", true), ("33", false)] {
            let config = load_from(&[
                ("database_url", "postgres://localhost/eskoz"),
                ("encryption_key", "key"),
                ("backup_code_length", length),
            ])
            .unwrap();
            assert_eq!(config.validate().is_ok(), ok, "length {}", length);
        }
    }
}
