//! Generator for guest modules that speak the tether bridge ABI.
//!
//! A generated guest is a small, self-contained `.wasm` module:
//!
//! ## Imports (module `env` by default)
//! - the seven bridge functions named by [`tether_types::ImportNames`]
//! - one `(ret_slot, arg_slot…) -> ()` function per declared host function
//!
//! ## Exports
//! - linear memory, bump allocator, deallocator, function table and entry
//!   point, named by [`tether_types::ExportNames`]
//! - counter globals `heap_ptr`, `main_calls`, `free_calls`, `drop_calls`
//!
//! Table slot 0 is always empty; adapters and deallocators occupy slots
//! `1..`. See [`layout`] for the static memory map.

pub mod body;
pub mod builder;
pub mod error;
pub mod layout;

pub use builder::{Adapter, GuestBuilder};
pub use error::{GuestError, GuestResult};
