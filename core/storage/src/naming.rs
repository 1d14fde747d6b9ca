//! Remote file naming.

use chrono::NaiveDateTime;
use std::path::Path;

/// Timestamp format spliced into unique names (`yyMMddHHmmss`).
pub const UNIQUE_SUFFIX_FORMAT: &str = "%y%m%d%H%M%S";

/// Insert a seconds-resolution timestamp between stem and extension.
///
/// `report.pdf` at 2024-01-02 03:04:05 becomes `report-240102030405.pdf`.
/// Two calls within the same second return the same name.
pub fn unique_file_name(file_name: &str, now: NaiveDateTime) -> String {
    let timestamp = now.format(UNIQUE_SUFFIX_FORMAT);
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_else(|| file_name.into());

    match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, timestamp, ext.to_string_lossy()),
        None => format!("{}-{}", stem, timestamp),
    }
}
