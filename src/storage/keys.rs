//! Key sanitization.
//!
//! Partition and row keys double as path segments in the file-system backend, so
//! every key is trimmed and has path-hostile characters replaced before use.

use super::errors::{StorageError, StorageResult};

const HOSTILE_CHARACTERS: [char; 3] = ['/', '\\', ' '];

/// Trim and replace `/`, `\` and spaces with `_`
pub fn sanitize_key(key: &str) -> String {
    key.trim()
        .chars()
        .map(|c| {
            if HOSTILE_CHARACTERS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Sanitize and reject keys that cannot address a record
pub fn checked_key(key: &str) -> StorageResult<String> {
    let sanitized = sanitize_key(key);
    if sanitized.is_empty() {
        return Err(StorageError::invalid_key(key, "key is empty after trimming"));
    }
    if sanitized == "." || sanitized == ".." {
        return Err(StorageError::invalid_key(key, "key is a relative path segment"));
    }
    if sanitized.chars().any(char::is_control) {
        return Err(StorageError::invalid_key(key, "key contains control characters"));
    }
    Ok(sanitized)
}
