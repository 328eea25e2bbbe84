use sqlx::FromRow;

/// サイト設定（TOTP発行者名の供給元）
#[derive(Debug, FromRow)]
pub struct SiteSettings {
    pub id: i32,
    pub site_name: String,
}
