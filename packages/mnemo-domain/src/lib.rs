pub mod cypher_gate;
pub mod health;
pub mod item;
pub mod query;
pub mod result;
pub mod time_serde;
