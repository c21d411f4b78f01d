// Database module
// SQLite holds the document fingerprint table; LanceDB holds the vector index

pub mod lancedb;
pub mod sqlite;
