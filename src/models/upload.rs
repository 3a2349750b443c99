use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored upload. Only `file` and `uploaded_at` are part of the JSON form.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UploadRecord {
    #[serde(skip)]
    pub id: i64,
    pub file: String,
    pub uploaded_at: DateTime<Utc>,
}
