use sqlx::PgPool;

use crate::models::SiteSettings;

#[derive(Clone)]
pub struct SiteSettingsRepository {
    pool: PgPool,
}

impl SiteSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 最初に登録されたサイト設定を取得
    pub async fn first(&self) -> Result<Option<SiteSettings>, sqlx::Error> {
        sqlx::query_as::<_, SiteSettings>(
            r#"
            SELECT id, site_name
            FROM site_settings
            ORDER BY id
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
    }
}
