//! Shared wire types for the tether bridge.
//!
//! Both the host ([`tether-host`]) and the guest generator
//! ([`tether-guest`]) build on this crate: the 16-byte tagged slot layout,
//! the kind numbering, the UTF-8 transcoder, and the ABI names. Nothing here
//! touches a wasm engine.
//!
//! [`tether-host`]: https://docs.rs/tether-host
//! [`tether-guest`]: https://docs.rs/tether-guest

pub mod abi;
mod error;
mod text;
pub mod utf8;
pub mod wire;

pub use abi::{ExportNames, ImportNames, DEFAULT_IMPORT_MODULE};
pub use error::DecodeError;
pub use text::HostString;
pub use wire::{ClosureSlot, KeyDescriptor, Kind, RefFlavor, Slot, KEY_DESCRIPTOR_SIZE, SLOT_SIZE};
