//! Header-name heuristics for guessing the fax and "to" columns.

use crate::types::{ColumnMapping, HeaderSet};
use once_cell::sync::Lazy;
use regex::Regex;

/// A named, case-insensitive header predicate.
#[derive(Debug)]
pub struct HeaderPattern {
    pub name: &'static str,
    regex: Regex,
}

impl HeaderPattern {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            regex: Regex::new(&format!("(?i){pattern}")).expect("Invalid header pattern"),
        }
    }

    /// Surrounding whitespace is ignored.
    pub fn matches(&self, header: &str) -> bool {
        self.regex.is_match(header.trim())
    }
}

// Pattern tables - compiled once, checked in order
static FAX_PATTERNS: Lazy<Vec<HeaderPattern>> = Lazy::new(|| {
    vec![
        HeaderPattern::new("fax", r"^fax$"),
        HeaderPattern::new("fax_number", r"^fax.*number$"),
        HeaderPattern::new("fax_hash", r"^fax.*#$"),
    ]
});

static TO_PATTERNS: Lazy<Vec<HeaderPattern>> = Lazy::new(|| {
    vec![
        HeaderPattern::new("to", r"^to$"),
        HeaderPattern::new("name", r"^name$"),
        HeaderPattern::new("last_name", r"^(last|last.*name)$"),
        HeaderPattern::new("company", r"^company$"),
        HeaderPattern::new("organization", r"^organization$"),
        HeaderPattern::new("physician", r"^physician$"),
        HeaderPattern::new("office", r"^office$"),
    ]
});

static BLOCK_LIST_FAX_PATTERN: Lazy<HeaderPattern> =
    Lazy::new(|| HeaderPattern::new("block_list_fax", r"^(fax|faxnumber|fax.?number|fax.?#)$"));

/// Semantic field a header can be classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    FaxNumber,
    ToHeader,
}

impl HeaderField {
    pub fn patterns(&self) -> &'static [HeaderPattern] {
        match self {
            Self::FaxNumber => FAX_PATTERNS.as_slice(),
            Self::ToHeader => TO_PATTERNS.as_slice(),
        }
    }

    /// Name of the first predicate in this family matching `header`.
    pub fn matching_pattern(&self, header: &str) -> Option<&'static str> {
        self.patterns()
            .iter()
            .find(|pattern| pattern.matches(header))
            .map(|pattern| pattern.name)
    }
}

/// First header, in column order, accepted by any predicate of `field`.
fn first_match(headers: &HeaderSet, field: HeaderField) -> Option<String> {
    headers
        .iter()
        .find(|header| field.matching_pattern(header).is_some())
        .map(str::to_string)
}

/// Guess the recipient mapping from header names alone.
///
/// Column order decides ties, not predicate order: in `["Name", "FaxNumber",
/// "Fax"]` the fax column is `FaxNumber`. Either side may come back unset.
pub fn classify(headers: &HeaderSet) -> ColumnMapping {
    ColumnMapping {
        fax_number: first_match(headers, HeaderField::FaxNumber).unwrap_or_default(),
        to_header: first_match(headers, HeaderField::ToHeader),
    }
}

/// Fax column for a block list, only when a header is unambiguously a fax
/// number column.
pub fn classify_block_list(headers: &HeaderSet) -> Option<String> {
    headers
        .iter()
        .find(|header| BLOCK_LIST_FAX_PATTERN.matches(header))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn headers(names: &[&str]) -> HeaderSet {
        HeaderSet::new(names.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[test]
    fn test_column_order_beats_pattern_order() {
        let mapping = classify(&headers(&["Name", "FaxNumber", "Fax"]));
        assert_eq!(mapping.fax_number, "FaxNumber");
        assert_eq!(mapping.to_header.as_deref(), Some("Name"));
    }

    #[test]
    fn test_case_insensitive_variants() {
        for name in ["FAX", "fax number", "Fax_Number", "Fax #", "fax#", "FaxNo Number"] {
            assert!(
                HeaderField::FaxNumber.matching_pattern(name).is_some(),
                "{name} should match"
            );
        }
        for name in ["Fax Machine", "Home Fax", "Phone"] {
            assert!(HeaderField::FaxNumber.matching_pattern(name).is_none());
        }
    }

    #[test]
    fn test_to_header_families() {
        assert_eq!(HeaderField::ToHeader.matching_pattern("Last Name"), Some("last_name"));
        assert_eq!(HeaderField::ToHeader.matching_pattern("LAST"), Some("last_name"));
        assert_eq!(HeaderField::ToHeader.matching_pattern("Physician"), Some("physician"));
        assert_eq!(HeaderField::ToHeader.matching_pattern("First Name"), None);
    }

    #[test]
    fn test_unmatched_fields_stay_unset() {
        let mapping = classify(&headers(&["Notes", "Phone"]));
        assert_eq!(mapping, ColumnMapping::default());
    }

    #[test]
    fn test_block_list_requires_strict_fax_header() {
        assert_eq!(
            classify_block_list(&headers(&["Reason", "Fax Number"])).as_deref(),
            Some("Fax Number")
        );
        assert_eq!(classify_block_list(&headers(&["Fax#"])).as_deref(), Some("Fax#"));
        assert_eq!(classify_block_list(&headers(&["Main Fax Number", "Notes"])), None);
    }
}
