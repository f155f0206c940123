//! Names of the functions and exports both sides agree on.
//!
//! The guest imports the bridge functions from the host under
//! [`ImportNames`] and exposes its allocator, table and entry point under
//! [`ExportNames`]. Both tables deserialize with defaults so a config file
//! only needs to list what differs.

use serde::{Deserialize, Serialize};

/// Default import module for all bridge functions.
pub const DEFAULT_IMPORT_MODULE: &str = "env";

/// Host functions the guest imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportNames {
    /// `(id: i32) -> ()`: one more guest holder of a reference.
    pub increment_refcount: String,
    /// `(id: i32) -> ()`: one guest holder dropped a reference.
    pub decrement_refcount: String,
    /// `(addr: i32) -> ()`: decode the slot at `addr` into the scratch slot.
    pub install_value: String,
    /// `() -> ()`: linear memory was replaced by a larger buffer.
    pub on_grow: String,
    /// `() -> ()`: a guest panic started.
    pub panic: String,
    /// `(ptr: i32, len: i32) -> ()`: panic message text.
    pub panic_message: String,
    /// `(ptr: i32, len: i32, line: i32) -> ()`: panic location.
    pub panic_location: String,
}

impl Default for ImportNames {
    fn default() -> Self {
        Self {
            increment_refcount: "__web_increment_refcount".to_string(),
            decrement_refcount: "__web_decrement_refcount".to_string(),
            install_value: "__web_install_value".to_string(),
            on_grow: "__web_on_grow".to_string(),
            panic: "__web_panic".to_string(),
            panic_message: "__web_panic_message".to_string(),
            panic_location: "__web_panic_location".to_string(),
        }
    }
}

/// Items the guest must export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportNames {
    /// Linear memory.
    pub memory: String,
    /// `(size: i32) -> i32`
    pub malloc: String,
    /// `(ptr: i32) -> ()`
    pub free: String,
    /// Indirect-call table of adapters and deallocators.
    pub table: String,
    /// `() -> ()`, called exactly once after the first view construction.
    pub main: String,
}

impl Default for ExportNames {
    fn default() -> Self {
        Self {
            memory: "memory".to_string(),
            malloc: "__web_malloc".to_string(),
            free: "__web_free".to_string(),
            table: "__web_table".to_string(),
            main: "__web_main".to_string(),
        }
    }
}
