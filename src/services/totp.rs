use data_encoding::BASE32_NOPAD;
use totp_rs::{Algorithm, TOTP};

/// コード桁数
pub const TOTP_DIGITS: usize = 6;
/// 1ステップの秒数
pub const TOTP_STEP: u64 = 30;

/// 入力されたコードを正規化（前後空白・空白・ハイフンを除去）
pub fn normalize_otp_code(code: &str) -> String {
    code.trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// 現在時刻でTOTPコードを検証
///
/// `valid_window` ステップ分の前後のずれを許容する（2なら ±60秒）。
/// 不正な形式のコードやシークレットは常に false
pub fn verify_code(secret: &str, code: &str, valid_window: u8) -> bool {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(now) => verify_code_at(secret, code, valid_window, now.as_secs()),
        Err(e) => {
            tracing::error!(error = ?e, "システム時刻取得エラー");
            false
        }
    }
}

/// 指定時刻でTOTPコードを検証
pub fn verify_code_at(secret: &str, code: &str, valid_window: u8, unix_time: u64) -> bool {
    let code = normalize_otp_code(code);
    if code.len() != TOTP_DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    // ウィンドウ下限が 0 未満になる時刻は扱わない
    if unix_time / TOTP_STEP < u64::from(valid_window) {
        return false;
    }

    match build_totp(secret, valid_window) {
        Some(totp) => totp.check(&code, unix_time),
        None => false,
    }
}

/// 指定時刻のコードを生成（テスト・診断用）
pub fn generate_code_at(secret: &str, unix_time: u64) -> Option<String> {
    build_totp(secret, 0).map(|totp| totp.generate(unix_time))
}

/// 検証用 TOTP オブジェクト（発行者・アカウント名なし）
fn build_totp(secret: &str, skew: u8) -> Option<TOTP> {
    let secret_bytes = BASE32_NOPAD
        .decode(secret.trim_end_matches('=').as_bytes())
        .map_err(|e| {
            tracing::warn!(error = ?e, "シークレットのBase32デコードエラー");
        })
        .ok()?;

    TOTP::new(
        Algorithm::SHA1,
        TOTP_DIGITS,
        skew,
        TOTP_STEP,
        secret_bytes,
        None,
        String::new(),
    )
    .map_err(|e| {
        tracing::warn!(error = %e, "TOTP作成エラー");
    })
    .ok()
}
