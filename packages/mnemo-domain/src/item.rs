use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_RETIRED: &str = "retired";

/// A stored unit of agent context. Items are never edited in place; see [`ContextItem::next_version`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ContextItem {
	pub id: String,
	pub content: ItemContent,
	#[serde(default)]
	pub relationships: Vec<Relationship>,
	pub metadata: ItemMetadata,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub supersedes: Option<String>,
	#[serde(default = "default_status")]
	pub status: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ItemContent {
	pub text: String,
	#[serde(rename = "type", default)]
	pub content_type: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fact_type: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Relationship {
	pub kind: String,
	pub target_id: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ItemMetadata {
	pub author: String,
	pub author_type: String,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
	pub checksum: String,
}

impl ContextItem {
	pub fn new(
		content: ItemContent,
		author: impl Into<String>,
		author_type: impl Into<String>,
		now: OffsetDateTime,
	) -> Self {
		let checksum = content_checksum(&content);

		Self {
			id: Uuid::new_v4().to_string(),
			content,
			relationships: Vec::new(),
			metadata: ItemMetadata {
				author: author.into(),
				author_type: author_type.into(),
				created_at: now,
				updated_at: now,
				checksum,
			},
			supersedes: None,
			status: STATUS_ACTIVE.to_string(),
		}
	}

	/// Builds the successor of this item. The caller persists the new item and then
	/// [`retire`](Self::retire)s this one.
	pub fn next_version(
		&self,
		content: ItemContent,
		author: impl Into<String>,
		now: OffsetDateTime,
	) -> Self {
		let checksum = content_checksum(&content);

		Self {
			id: Uuid::new_v4().to_string(),
			content,
			relationships: self.relationships.clone(),
			metadata: ItemMetadata {
				author: author.into(),
				author_type: self.metadata.author_type.clone(),
				created_at: self.metadata.created_at,
				updated_at: now,
				checksum,
			},
			supersedes: Some(self.id.clone()),
			status: STATUS_ACTIVE.to_string(),
		}
	}

	pub fn retire(&mut self) {
		self.status = STATUS_RETIRED.to_string();
	}

	pub fn is_searchable(&self) -> bool {
		self.status != STATUS_RETIRED
	}
}

/// Hex blake3 digest over the content fields, separated so that moving text between
/// fields changes the checksum.
pub fn content_checksum(content: &ItemContent) -> String {
	let mut hasher = blake3::Hasher::new();

	for part in [
		content.text.as_str(),
		content.content_type.as_str(),
		content.title.as_deref().unwrap_or_default(),
		content.fact_type.as_deref().unwrap_or_default(),
	] {
		hasher.update(&(part.len() as u64).to_le_bytes());
		hasher.update(part.as_bytes());
	}

	hasher.finalize().to_hex().to_string()
}

fn default_status() -> String {
	STATUS_ACTIVE.to_string()
}
