use crate::errors::MeshError;

const MAX_IDENTIFIER_LEN: usize = 64;
const UPLOAD_FALLBACK_ID: &str = "upload";

/// Trims and lowercases a structure identifier.
///
/// Accepted identifiers start with an ASCII letter or digit and contain only
/// letters, digits, `_` and `-`, so the renderer can never read one as a flag.
pub fn normalize_identifier(raw: &str) -> Result<String, MeshError> {
    let id = raw.trim().to_ascii_lowercase();
    let valid_first = id
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric());
    let valid_rest = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if !valid_first || !valid_rest || id.len() > MAX_IDENTIFIER_LEN {
        return Err(MeshError::InvalidIdentifier(raw.to_string()));
    }
    Ok(id)
}

/// Derives the entry id passed to the renderer for an uploaded file from its stem.
pub fn entry_id_from_file_name(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let stem = base.split('.').next().unwrap_or(base);
    let cleaned: String = stem
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(MAX_IDENTIFIER_LEN)
        .collect();
    let cleaned = cleaned.trim_start_matches(['-', '_']);

    if cleaned.is_empty() {
        UPLOAD_FALLBACK_ID.to_string()
    } else {
        cleaned.to_string()
    }
}
