use crate::error::{Error, Result};

/// Trim a required title. Blank titles are rejected with `title_required`.
pub fn require_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(Error::Invalid("title_required"));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional text field; blank values collapse to `None`.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
