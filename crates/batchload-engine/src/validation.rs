//! Identifier validation
//!
//! Identifiers arrive from notification payloads and operator tooling. They
//! are checked before any store round-trip so a malformed request never
//! opens a transaction.

use crate::error::{EngineError, EngineResult};

pub const MAX_SOURCE_PREFIX_LENGTH: usize = 200;
pub const MAX_BATCH_ID_LENGTH: usize = 36;
pub const MAX_FILE_REF_LENGTH: usize = 300;
pub const MAX_COPY_OPTIONS_LENGTH: usize = 200;
pub const MAX_FILENAME_FILTER_LENGTH: usize = 100;
/// Mount directory and notification topics
pub const MAX_SETTING_LENGTH: usize = 100;
pub const MAX_VERSION_LENGTH: usize = 20;

const SCHEME: &str = "s3://";

/// Validate a required, length-bounded identifier
pub fn validate_identifier(value: &str, field_name: &str, max_length: usize) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::malformed(format!("{} is required", field_name)));
    }

    if value.len() > max_length {
        return Err(EngineError::malformed(format!(
            "{} must be at most {} characters, got {}",
            field_name,
            max_length,
            value.len()
        )));
    }

    Ok(())
}

/// Validate an optional setting; absent values always pass
pub fn validate_optional(value: Option<&str>, field_name: &str, max_length: usize) -> EngineResult<()> {
    match value {
        Some(value) if value.len() > max_length => Err(EngineError::malformed(format!(
            "{} must be at most {} characters, got {}",
            field_name,
            max_length,
            value.len()
        ))),
        _ => Ok(()),
    }
}

pub fn validate_source_prefix(source_prefix: &str) -> EngineResult<()> {
    validate_identifier(source_prefix, "source prefix", MAX_SOURCE_PREFIX_LENGTH)
}

pub fn validate_batch_id(batch_id: &str) -> EngineResult<()> {
    validate_identifier(batch_id, "batch id", MAX_BATCH_ID_LENGTH)
}

pub fn validate_file_ref(file_ref: &str) -> EngineResult<()> {
    validate_identifier(file_ref, "file reference", MAX_FILE_REF_LENGTH)
}

/// Validate the (source prefix, batch id) key of a batch
pub fn validate_batch_key(source_prefix: &str, batch_id: &str) -> EngineResult<()> {
    validate_source_prefix(source_prefix)?;
    validate_batch_id(batch_id)
}

/// Canonical form of a watched location
///
/// `s3://bucket/path/` and `bucket/path` name the same prefix. Scheme markers
/// are removed and a single trailing slash is trimmed; a bare bucket name is
/// kept as is.
pub fn normalize_source_prefix(input: &str) -> EngineResult<String> {
    let stripped = input.trim().replace(SCHEME, "");
    let normalized = stripped.strip_suffix('/').unwrap_or(&stripped).to_string();
    validate_source_prefix(&normalized)?;
    Ok(normalized)
}
