//! Manifest (`package.json`) loading and persistence.
//!
//! Only the `dependencies` section is interpreted. Every other top-level
//! field is carried through untouched so a rewrite never drops user data.

use super::error::PkgError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// Default manifest file name.
pub const MANIFEST_NAME: &str = "package.json";

/// The dependency manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Dependency name -> version specifier (exact version or dist-tag).
    #[serde(default)]
    dependencies: BTreeMap<String, String>,

    /// Remaining top-level fields, preserved verbatim.
    #[serde(flatten)]
    other: Map<String, Value>,
}

impl Manifest {
    /// Create an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a manifest from disk.
    ///
    /// # Errors
    /// Returns a manifest error if the file is absent, unreadable, not JSON,
    /// or its `dependencies` field is not a string-to-string object.
    pub fn load(path: &Path) -> Result<Self, PkgError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PkgError::manifest_not_found(path));
            }
            Err(e) => {
                return Err(PkgError::manifest_invalid(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        Self::parse(&content)
            .map_err(|e| PkgError::manifest_invalid(format!("{}: {}", path.display(), e.message())))
    }

    /// Parse manifest JSON text.
    ///
    /// # Errors
    /// Returns a manifest error if the text does not have the expected shape.
    pub fn parse(content: &str) -> Result<Self, PkgError> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| PkgError::manifest_invalid(format!("Invalid JSON: {e}")))?;

        if !value.is_object() {
            return Err(PkgError::manifest_invalid(format!(
                "Manifest must be a JSON object, got {}",
                json_type_name(&value)
            )));
        }

        serde_json::from_value(value)
            .map_err(|e| PkgError::manifest_invalid(format!("Invalid dependencies: {e}")))
    }

    /// Serialize to the on-disk form: two-space indent, sorted keys, trailing newline.
    ///
    /// # Errors
    /// Returns a manifest write error if serialization fails.
    pub fn to_pretty_string(&self) -> Result<String, PkgError> {
        let mut out = serde_json::to_string_pretty(self)
            .map_err(|e| PkgError::manifest_write_failed(format!("Failed to serialize: {e}")))?;
        out.push('\n');
        Ok(out)
    }

    /// Write the manifest to disk, replacing the file's full contents.
    ///
    /// # Errors
    /// Returns a manifest write error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), PkgError> {
        let content = self.to_pretty_string()?;
        flight_util::fs::atomic_write(path, content.as_bytes()).map_err(|e| {
            PkgError::manifest_write_failed(format!("Failed to write {}: {e}", path.display()))
        })
    }

    /// Get the specifier recorded for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.dependencies.get(name).map(String::as_str)
    }

    /// Whether `name` is listed.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.dependencies.contains_key(name)
    }

    /// Add or update a dependency. Returns the previous specifier, if any.
    pub fn insert(&mut self, name: impl Into<String>, spec: impl Into<String>) -> Option<String> {
        self.dependencies.insert(name.into(), spec.into())
    }

    /// Remove a dependency. Returns its specifier, if it was listed.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.dependencies.remove(name)
    }

    /// Iterate over `(name, specifier)` pairs in name order.
    pub fn dependencies(&self) -> impl Iterator<Item = (&str, &str)> {
        self.dependencies
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}

/// Get a human-readable type name for a JSON value.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
