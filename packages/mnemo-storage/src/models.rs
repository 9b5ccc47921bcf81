use serde_json::Value;
use time::OffsetDateTime;

#[derive(Debug, sqlx::FromRow)]
pub struct KvEntry {
	pub key: String,
	pub value: Value,
	pub expires_at: Option<OffsetDateTime>,
	pub updated_at: OffsetDateTime,
}
