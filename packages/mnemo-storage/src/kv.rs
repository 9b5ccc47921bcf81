use std::time::Duration;

use serde_json::Value;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::{Error, Result, models::KvEntry};

/// Exact-match key-value store backed by the `context_kv` table.
#[derive(Clone)]
pub struct KvStore {
	pool: PgPool,
}
impl KvStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &PgPool {
		&self.pool
	}

	pub async fn get(&self, key: &str) -> Result<Option<Value>> {
		let row: Option<(Value,)> = sqlx::query_as(
			"\
SELECT value
FROM context_kv
WHERE key = $1
	AND (expires_at IS NULL OR expires_at > now())",
		)
		.bind(key)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row.map(|(value,)| value))
	}

	pub async fn scan(&self, prefix: &str, limit: u32) -> Result<Vec<KvEntry>> {
		if prefix.is_empty() {
			return Err(Error::InvalidArgument("Scan prefix must be non-empty.".to_string()));
		}

		let pattern = format!("{}%", escape_like(prefix));
		let rows = sqlx::query_as::<_, KvEntry>(
			"\
SELECT key, value, expires_at, updated_at
FROM context_kv
WHERE key LIKE $1 ESCAPE '\\'
	AND (expires_at IS NULL OR expires_at > now())
ORDER BY key ASC
LIMIT $2",
		)
		.bind(pattern)
		.bind(i64::from(limit))
		.fetch_all(&self.pool)
		.await?;

		Ok(rows)
	}

	pub async fn put(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()> {
		let now = OffsetDateTime::now_utc();
		let expires_at = ttl.map(|ttl| now + ttl);

		sqlx::query(
			"\
INSERT INTO context_kv (key, value, expires_at, updated_at)
VALUES ($1, $2, $3, $4)
ON CONFLICT (key) DO UPDATE
SET value = EXCLUDED.value,
	expires_at = EXCLUDED.expires_at,
	updated_at = EXCLUDED.updated_at",
		)
		.bind(key)
		.bind(value)
		.bind(expires_at)
		.bind(now)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	pub async fn health(&self) -> Result<()> {
		sqlx::query("SELECT 1").execute(&self.pool).await?;

		Ok(())
	}
}

fn escape_like(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());

	for ch in raw.chars() {
		if matches!(ch, '%' | '_' | '\\') {
			out.push('\\');
		}

		out.push(ch);
	}

	out
}
