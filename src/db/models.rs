use crate::error::OptionsResult;
use crate::settings::ConfigMap;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// One persisted options blob
#[derive(Debug, Clone, FromRow)]
pub struct StoredOptions {
    pub option_key: String,
    pub option_value: String, // JSON object
    pub updated_at: DateTime<Utc>,
}

impl StoredOptions {
    /// Decode the JSON blob into an options map
    pub fn decode(&self) -> OptionsResult<ConfigMap> {
        Ok(serde_json::from_str(&self.option_value)?)
    }
}
