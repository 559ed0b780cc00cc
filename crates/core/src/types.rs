/// Primary keys in the task store are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps handled by the orchestrator are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
