//! Label file parsing

use crate::MetadataError;

/// Parse a newline-delimited label list
///
/// Each line is trimmed; blank lines are skipped. The order of the file is
/// the order of the output tensor.
pub fn load_labels(bytes: &[u8]) -> Result<Vec<String>, MetadataError> {
    let text = std::str::from_utf8(bytes).map_err(|e| MetadataError::Malformed {
        field: "labels",
        reason: e.to_string(),
    })?;

    Ok(text
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}
