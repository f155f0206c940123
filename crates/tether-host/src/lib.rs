//! Host side of the tether bridge.
//!
//! A guest wasm module and the host exchange values through 16-byte tagged
//! slots in guest linear memory. This crate owns everything on the host
//! side of that exchange:
//!
//! - [`codec`] turns host [`Value`]s into slots and back.
//! - [`refs`] gives host objects stable ids the guest can hold.
//! - [`trampoline`] calls guest function-table entries and collects the
//!   value they install.
//! - [`memory`] hands out bounds-checked typed views of linear memory and
//!   rebuilds them when the guest grows it.
//! - [`closure`] wraps guest closures so the host can call and release them.
//!
//! [`Bridge`] ties these together around one `wasmi` store:
//!
//! ```no_run
//! use tether_host::{Bridge, Value};
//!
//! # fn run(wasm: &[u8]) -> tether_host::BridgeResult<()> {
//! let bridge = Bridge::builder()
//!     .host_function("log", 1, |_caller, args| {
//!         println!("{}", args[0]);
//!         Ok(Value::Undefined)
//!     })
//!     .instantiate(wasm)?;
//! println!("loaded {}", bridge.fingerprint());
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod closure;
pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod error;
mod imports;
mod json;
pub mod memory;
pub mod refs;
pub mod state;
pub mod trampoline;
pub mod value;

pub use bridge::{fingerprint, Bridge, BridgeBuilder};
pub use closure::{GuestClosure, GuestOnceClosure};
pub use config::BridgeConfig;
pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::{BridgeError, BridgeResult};
pub use memory::{MemoryView, MemoryViewMut};
pub use refs::{RefId, RefTable, NO_REFERENCE};
pub use state::{BridgeState, GuestExports};
pub use tether_types::{HostString, RefFlavor, Slot};
pub use value::{HostObject, Mapping, Shape, Symbol, Value};
pub use wasmi;
