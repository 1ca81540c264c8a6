use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Created on first event for a user (defaults: all channels enabled, UTC,
/// no quiet hours); updated externally. `channels` is stored as a JSON array
/// of channel strings.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserPreference {
    pub user_id: String,
    pub channels: String,
    pub quiet_hours_start: Option<NaiveTime>,
    pub quiet_hours_end: Option<NaiveTime>,
    pub timezone: String,
}

impl UserPreference {
    pub fn enabled_channels(&self) -> Vec<String> {
        serde_json::from_str(&self.channels).unwrap_or_default()
    }
}
