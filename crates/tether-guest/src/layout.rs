//! Fixed memory layout and index assignments of generated guests.
//!
//! ```text
//! 0     .. 16    reserved (address 0 is the null pointer)
//! 16    .. 32    UNDEFINED_SLOT all zeroes, kind Undefined
//! 32    .. 48    INT_SLOT       scratch Int32 slot written by adapters
//! 48    .. 64    RETURN_SLOT    return slot handed to host functions
//! 64    .. 4096  static data (strings, prebuilt slots)
//! 4096  ..       bump-allocated heap
//! ```

/// All-zero slot decoding as `Undefined`.
pub const UNDEFINED_SLOT: u32 = 16;
/// Slot adapters fill with an Int32 before installing it.
pub const INT_SLOT: u32 = 32;
/// Slot host functions encode their result into.
pub const RETURN_SLOT: u32 = 48;
/// First byte of static data.
pub const STATIC_START: u32 = 64;
/// First byte handed out by the allocator.
pub const HEAP_START: u32 = 4096;
/// Allocation alignment; keeps Float64 payloads 8-byte aligned.
pub const ALLOC_ALIGN: u32 = 8;
/// WASM page size in bytes.
pub const PAGE_SIZE: u32 = 65536;
/// Upper bound on `max_pages`, keeps `memory.size << 16` inside 32 bits.
pub const MAX_PAGES_LIMIT: u64 = 16384;

// ── Imported function indices ────────────────────────────────────────────────
// (order must match the import section emission in builder.rs)

pub const IMPORT_INCREMENT_REFCOUNT: u32 = 0;
pub const IMPORT_DECREMENT_REFCOUNT: u32 = 1;
pub const IMPORT_INSTALL_VALUE: u32 = 2;
pub const IMPORT_ON_GROW: u32 = 3;
pub const IMPORT_PANIC: u32 = 4;
pub const IMPORT_PANIC_MESSAGE: u32 = 5;
pub const IMPORT_PANIC_LOCATION: u32 = 6;

/// Number of bridge imports; host functions follow.
pub const BRIDGE_IMPORT_COUNT: u32 = 7;

// ── Globals ──────────────────────────────────────────────────────────────────

/// Next free heap byte.
pub const GLOBAL_HEAP_PTR: u32 = 0;
/// Times the entry point ran.
pub const GLOBAL_MAIN_CALLS: u32 = 1;
/// Times the deallocator export ran.
pub const GLOBAL_FREE_CALLS: u32 = 2;
/// Times a closure deallocator table entry ran.
pub const GLOBAL_DROP_CALLS: u32 = 3;

/// Export names of the counter globals, in global index order.
pub const GLOBAL_EXPORTS: [&str; 4] = ["heap_ptr", "main_calls", "free_calls", "drop_calls"];

// ── Type indices ─────────────────────────────────────────────────────────────

/// `(i32) -> i32`, the allocator signature. Void signatures with `n`
/// i32 params live at index `n + 1`.
pub const TYPE_MALLOC: u32 = 0;

/// Type index of `(i32 × params) -> ()`.
#[inline]
pub const fn void_type(params: u32) -> u32 {
    params + 1
}
