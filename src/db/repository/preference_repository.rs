use sqlx::{Sqlite, Transaction};

use crate::db::models::{UserPreference, ALL_CHANNELS};
use crate::error::{AppError, AppResult};

pub struct PreferenceRepository;

impl PreferenceRepository {
    pub async fn get_by_user_id(
        tx: &mut Transaction<'_, Sqlite>,
        user_id: &str,
    ) -> AppResult<Option<UserPreference>> {
        let row = sqlx::query_as::<_, UserPreference>(
            r#"
            SELECT user_id, channels, quiet_hours_start, quiet_hours_end, timezone
            FROM user_preferences WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Fetch preferences, inserting the default row (all channels enabled,
    /// UTC, no quiet hours) if absent. `user_id` is the primary key, so a
    /// concurrent insert loses the race cleanly: the unique-violation branch
    /// re-reads the now-existing row within the same transaction.
    pub async fn get_or_create_default(
        tx: &mut Transaction<'_, Sqlite>,
        user_id: &str,
    ) -> AppResult<UserPreference> {
        if let Some(existing) = Self::get_by_user_id(tx, user_id).await? {
            return Ok(existing);
        }

        let channels = serde_json::to_string(ALL_CHANNELS)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("channels serialize: {}", e)))?;

        let inserted = sqlx::query_as::<_, UserPreference>(
            r#"
            INSERT INTO user_preferences (user_id, channels, quiet_hours_start, quiet_hours_end, timezone)
            VALUES (?, ?, NULL, NULL, 'UTC')
            RETURNING user_id, channels, quiet_hours_start, quiet_hours_end, timezone
            "#,
        )
        .bind(user_id)
        .bind(channels)
        .fetch_one(&mut **tx)
        .await;

        match inserted {
            Ok(row) => Ok(row),
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                Self::get_by_user_id(tx, user_id)
                    .await?
                    .ok_or_else(|| AppError::Internal(anyhow::anyhow!(
                        "preference insert conflicted but row is missing for {}",
                        user_id
                    )))
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }
}
