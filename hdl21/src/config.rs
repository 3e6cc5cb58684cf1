//!
//! # Elaboration Options
//!

// Crates.io
use schemars::{schema::RootSchema, schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

// Local imports
use crate::error::ElabResult;
use crate::utils::SerdeFile;

/// # Elaboration Options
///
/// Loadable from JSON, YAML, or TOML files via [SerdeFile].
/// Any omitted field takes its default value.
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ElabOptions {
    /// Separator between a bundle name and its role names, in flattened signal names
    pub bundle_separator: String,
    /// Separator between instance and port names, in implicit port-reference signal names
    pub portref_separator: String,
    /// Separator between hierarchical names, in hierarchically-flattened modules
    pub hierarchy_separator: String,
    /// Report signals which are read but never driven
    pub require_drivers: bool,
}
impl Default for ElabOptions {
    fn default() -> Self {
        Self {
            bundle_separator: "_".into(),
            portref_separator: "_".into(),
            hierarchy_separator: ":".into(),
            require_drivers: true,
        }
    }
}
impl SerdeFile for ElabOptions {}
impl ElabOptions {
    /// Load from file `fname`, inferring its format from its extension
    pub fn load(fname: impl AsRef<std::path::Path>) -> ElabResult<Self> {
        Ok(Self::open_path(fname)?)
    }
    /// Get the JSON-Schema of the options file format
    pub fn schema() -> RootSchema {
        schema_for!(ElabOptions)
    }
}
