use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for ISO dates accepted by archive queries
    /// - Valid: "2024-06-01", "2024-06-01T14:30", "2024-06-01 14:30:05"
    /// - Invalid: "06/01/2024", "2024-6-1", "yesterday"
    pub static ref ISO_DATE_REGEX: Regex =
        Regex::new(r"^\d{4}-\d{2}-\d{2}(?:[T ]\d{2}:\d{2}(?::\d{2})?)?$").unwrap();
}
