use sqlx::SqlitePool;

use crate::db::models::NotificationTemplate;
use crate::error::{AppError, AppResult};

pub struct TemplateRepository;

impl TemplateRepository {
    pub async fn active_templates_for_event(
        pool: &SqlitePool,
        event_type: &str,
    ) -> AppResult<Vec<NotificationTemplate>> {
        let rows = sqlx::query_as::<_, NotificationTemplate>(
            r#"
            SELECT id, event_type, channel, subject_template, body_template,
                   is_active, created_at, updated_at
            FROM notification_templates
            WHERE event_type = ? AND is_active = TRUE
            ORDER BY channel
            "#,
        )
        .bind(event_type)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}
