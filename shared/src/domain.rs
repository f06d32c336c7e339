//! The `Domain` entity (§3 Data Model)
//!
//! A row in the ranked domain list ingested by the (out-of-scope) CSV
//! importer. The scan executor only mutates `has_been_scanned`; everything
//! else is owned by ingestion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single domain from the ranked target list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub id: i64,
    /// Lowercase, unique domain name (e.g. `"example.com"`).
    pub name: String,
    /// Rank in the source list; lower is higher priority.
    pub rank: i64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_in_csv_at: DateTime<Utc>,
    pub has_been_scanned: bool,
}

impl Domain {
    /// Constructs a freshly-ingested domain (as the CSV importer would),
    /// with `has_been_scanned = false`.
    pub fn new(id: i64, name: impl Into<String>, rank: i64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into().to_lowercase(),
            rank,
            first_seen_at: now,
            last_seen_in_csv_at: now,
            has_been_scanned: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_domain_is_lowercased_and_unscanned() {
        let now = Utc::now();
        let d = Domain::new(1, "EXAMPLE.com", 10, now);
        assert_eq!(d.name, "example.com");
        assert!(!d.has_been_scanned);
    }
}
