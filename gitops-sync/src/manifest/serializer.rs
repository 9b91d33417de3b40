//! Manifest serialization

use serde::Serialize;

use crate::errors::EngineError;

/// Every manifest starts with a bare document marker and no type tag
pub const DOCUMENT_START: &str = "---";

/// Serialize a resource into a single block-style YAML document
pub fn to_manifest_yaml<T: Serialize>(resource: &T) -> Result<String, EngineError> {
    let body = serde_yaml::to_string(resource)?;
    let body = body.strip_prefix("---\n").unwrap_or(&body);
    Ok(format!("{}\n{}", DOCUMENT_START, body))
}
