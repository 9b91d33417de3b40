//! Helm values merging

use serde_yaml::{Mapping, Value};

use crate::errors::EngineError;

/// Produces the effective values document of an instance
pub trait ValuesMerger: Send + Sync {
    /// Overlay environment overrides onto a chart version's base values
    fn merge(&self, base: &str, overrides: Option<&str>) -> Result<String, EngineError>;
}

/// Deep-merges YAML mappings; scalars and sequences in the override replace the base
#[derive(Debug, Clone, Default)]
pub struct YamlValuesMerger;

impl ValuesMerger for YamlValuesMerger {
    fn merge(&self, base: &str, overrides: Option<&str>) -> Result<String, EngineError> {
        let overrides = match overrides {
            Some(o) if !o.trim().is_empty() => o,
            _ => return Ok(base.to_string()),
        };

        let mut merged = parse_document(base)?;
        let overlay = parse_document(overrides)?;
        overlay_value(&mut merged, overlay);

        let rendered = serde_yaml::to_string(&merged)?;
        Ok(rendered.strip_prefix("---\n").unwrap_or(&rendered).to_string())
    }
}

fn parse_document(text: &str) -> Result<Value, EngineError> {
    if text.trim().is_empty() {
        return Ok(Value::Mapping(Mapping::new()));
    }
    serde_yaml::from_str(text)
        .map_err(|e| EngineError::SerializationError(format!("invalid values yaml: {}", e)))
}

fn overlay_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => overlay_value(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
