use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::corpus::DocumentCategory;

/// Persisted fingerprint record for an indexed document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DocumentRecord {
    pub id: String,
    pub category: String,
    pub fingerprint: String,
    pub chunk_count: i64,
    pub indexed_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocumentRecord {
    pub id: String,
    pub category: String,
    pub fingerprint: String,
    pub chunk_count: i64,
}

impl DocumentRecord {
    #[inline]
    pub fn category(&self) -> DocumentCategory {
        DocumentCategory::parse(&self.category)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn category_parsing() {
        let record = DocumentRecord {
            id: "infrastructure/disk-full.md".to_string(),
            category: "infrastructure".to_string(),
            fingerprint: "abc123".to_string(),
            chunk_count: 4,
            indexed_date: Utc::now().naive_utc(),
        };

        assert_eq!(record.category(), DocumentCategory::Infrastructure);

        let unknown = DocumentRecord {
            category: "something-else".to_string(),
            ..record
        };
        assert_eq!(unknown.category(), DocumentCategory::General);
    }
}
