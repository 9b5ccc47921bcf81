use serde::{Deserialize, Serialize};

use crate::{item::ItemContent, query::BackendKind};

/// One ranked entry of a search response. `score` is always in `[0, 1]`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SearchResult {
	pub id: String,
	pub content: ItemContent,
	pub score: f32,
	pub source: BackendKind,
}
