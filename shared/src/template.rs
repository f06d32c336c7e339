//! The `PathTemplate` entity (§3 Data Model) and its filter policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named URL path template with content-type and size filters.
///
/// A template is matched against a concrete URL by exact string equality of
/// its `template` source against the template that produced the URL — see
/// `scanner::placeholder` for materialization and the executor for the
/// lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathTemplate {
    pub id: i64,
    pub name: String,
    pub template: String,
    pub description: Option<String>,
    /// Substring the response `Content-Type` is expected to contain (or, in
    /// exclude mode, must not contain).
    pub expected_content_type: Option<String>,
    /// When `true`, the content-type filter is inverted: the result is
    /// rejected when `expected_content_type` *is* present instead of absent.
    pub exclude_content_type: bool,
    pub min_size: i64,
    pub max_size: Option<i64>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why a result was rejected by a template's filter, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterRejection {
    ContentTypeMismatch,
    TooSmall,
    TooLarge,
}

impl PathTemplate {
    /// `maxSize`, when present, must be `>= minSize`. Validated on
    /// construction paths that accept operator input (the repository layer
    /// enforces this at the storage boundary; this is the in-process check).
    pub fn validate_size_bounds(&self) -> Result<(), String> {
        if let Some(max) = self.max_size {
            if max < self.min_size {
                return Err(format!(
                    "max_size ({max}) must be >= min_size ({})",
                    self.min_size
                ));
            }
        }
        Ok(())
    }

    /// Applies the §4.8 filtering rule for a single status-200 result.
    /// Returns `Ok(())` if the result should be persisted, or the rejection
    /// reason otherwise. A `None` content-type or size bypasses the
    /// corresponding check (per spec: "a null size bypasses size checks").
    pub fn evaluate(&self, content_type: Option<&str>, size: Option<i64>) -> Result<(), FilterRejection> {
        if let (Some(expected), Some(actual)) = (&self.expected_content_type, content_type) {
            let contains = actual.contains(expected.as_str());
            let reject = if self.exclude_content_type { contains } else { !contains };
            if reject {
                return Err(FilterRejection::ContentTypeMismatch);
            }
        }

        if let Some(size) = size {
            if size < self.min_size {
                return Err(FilterRejection::TooSmall);
            }
            if let Some(max) = self.max_size {
                if size > max {
                    return Err(FilterRejection::TooLarge);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(expected: Option<&str>, exclude: bool, min: i64, max: Option<i64>) -> PathTemplate {
        let now = Utc::now();
        PathTemplate {
            id: 1,
            name: "t".into(),
            template: "(domain)/backup.zip".into(),
            description: None,
            expected_content_type: expected.map(str::to_string),
            exclude_content_type: exclude,
            min_size: min,
            max_size: max,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn include_mode_rejects_mismatched_content_type() {
        let t = template(Some("application/zip"), false, 0, None);
        assert_eq!(
            t.evaluate(Some("text/html"), Some(100)),
            Err(FilterRejection::ContentTypeMismatch)
        );
        assert_eq!(t.evaluate(Some("application/zip"), Some(100)), Ok(()));
    }

    #[test]
    fn exclude_mode_rejects_matching_content_type() {
        let t = template(Some("text/html"), true, 0, None);
        assert_eq!(
            t.evaluate(Some("text/html; charset=utf-8"), Some(100)),
            Err(FilterRejection::ContentTypeMismatch)
        );
        assert_eq!(t.evaluate(Some("application/json"), Some(100)), Ok(()));
    }

    #[test]
    fn null_size_bypasses_size_checks() {
        let t = template(None, false, 1024, Some(2048));
        assert_eq!(t.evaluate(None, None), Ok(()));
    }

    #[test]
    fn size_bounds_enforced() {
        let t = template(None, false, 1024, Some(2048));
        assert_eq!(t.evaluate(None, Some(100)), Err(FilterRejection::TooSmall));
        assert_eq!(t.evaluate(None, Some(4096)), Err(FilterRejection::TooLarge));
        assert_eq!(t.evaluate(None, Some(1500)), Ok(()));
    }

    #[test]
    fn validate_size_bounds_rejects_inverted_range() {
        let t = template(None, false, 2048, Some(1024));
        assert!(t.validate_size_bounds().is_err());
    }
}
