//! Bridge configuration.

use serde::{Deserialize, Serialize};
use tether_types::{ExportNames, ImportNames, DEFAULT_IMPORT_MODULE};

use crate::error::BridgeResult;

/// Default capacity of the diagnostics ring.
pub const DEFAULT_MAX_DIAGNOSTICS: usize = 64;

/// Everything the host needs to know to bind a guest.
///
/// Every field has a default, so a JSON document only lists overrides:
///
/// ```json
/// { "imports": { "install_value": "__extjs_install" }, "max_diagnostics": 8 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Module name the guest imports bridge functions from.
    pub import_module: String,
    pub imports: ImportNames,
    pub exports: ExportNames,
    /// Diagnostic entries kept before the oldest is dropped.
    pub max_diagnostics: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            import_module: DEFAULT_IMPORT_MODULE.to_string(),
            imports: ImportNames::default(),
            exports: ExportNames::default(),
            max_diagnostics: DEFAULT_MAX_DIAGNOSTICS,
        }
    }
}

impl BridgeConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(source: &str) -> BridgeResult<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
