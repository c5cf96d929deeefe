/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier of a multi-step lifecycle command, reused as the idempotency
/// key of every row the command inserts.
pub type CommandId = uuid::Uuid;

/// Identifier of a running station process.
pub type ClientId = uuid::Uuid;
