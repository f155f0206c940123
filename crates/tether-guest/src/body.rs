//! Function bodies emitted into generated guests.
//!
//! Adapters have the signature `(data_ptr: i32, args_ptr: i32) -> ()`, where
//! `args_ptr` addresses an `Array` slot holding the call arguments. Every
//! adapter finishes by handing one slot address to the install import, which
//! is how the host learns the return value.

use tether_types::wire::{KIND_INT32, KIND_OFFSET};
use wasm_encoder::{BlockType, Function, Instruction, MemArg, ValType};

use crate::layout::*;

fn memarg(offset: u64, align: u32) -> MemArg {
    MemArg {
        offset,
        align,
        memory_index: 0,
    }
}

/// Bump allocator `(size: i32) -> i32`.
///
/// Rounds the heap pointer up to [`ALLOC_ALIGN`], grows memory when the
/// request does not fit, and announces every growth through the on-grow
/// import before returning.
pub fn emit_malloc() -> Function {
    // param 0: size; locals 1: ptr, 2: end, 3: available bytes
    let mut f = Function::new(vec![(3, ValType::I32)]);
    // ptr = (heap_ptr + ALIGN - 1) & -ALIGN
    f.instruction(&Instruction::GlobalGet(GLOBAL_HEAP_PTR));
    f.instruction(&Instruction::I32Const((ALLOC_ALIGN - 1) as i32));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Const(-(ALLOC_ALIGN as i32)));
    f.instruction(&Instruction::I32And);
    f.instruction(&Instruction::LocalSet(1));
    // end = ptr + size
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::LocalSet(2));
    // available = memory.size << 16
    f.instruction(&Instruction::MemorySize(0));
    f.instruction(&Instruction::I32Const(16));
    f.instruction(&Instruction::I32Shl);
    f.instruction(&Instruction::LocalSet(3));
    // if end > available: grow by ceil((end - available) / PAGE_SIZE)
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::LocalGet(3));
    f.instruction(&Instruction::I32GtU);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::LocalGet(3));
    f.instruction(&Instruction::I32Sub);
    f.instruction(&Instruction::I32Const((PAGE_SIZE - 1) as i32));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Const(16));
    f.instruction(&Instruction::I32ShrU);
    emit_grow_checked(&mut f);
    f.instruction(&Instruction::End);
    // heap_ptr = end
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::GlobalSet(GLOBAL_HEAP_PTR));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::End);
    f
}

/// `memory.grow` with the page count on the stack; traps on failure and
/// calls the on-grow import on success.
fn emit_grow_checked(f: &mut Function) {
    f.instruction(&Instruction::MemoryGrow(0));
    f.instruction(&Instruction::I32Const(-1));
    f.instruction(&Instruction::I32Eq);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::Unreachable);
    f.instruction(&Instruction::End);
    f.instruction(&Instruction::Call(IMPORT_ON_GROW));
}

/// Increment a counter global by one.
fn emit_bump(f: &mut Function, global: u32) {
    f.instruction(&Instruction::GlobalGet(global));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::GlobalSet(global));
}

/// Deallocator `(ptr: i32) -> ()`. The bump heap never reuses memory; the
/// call is only counted.
pub fn emit_free() -> Function {
    let mut f = Function::new(vec![]);
    emit_bump(&mut f, GLOBAL_FREE_CALLS);
    f.instruction(&Instruction::End);
    f
}

/// One host-function call made by the entry point.
#[derive(Debug, Clone)]
pub struct MainCall {
    pub function: u32,
    pub args: Vec<u32>,
}

/// Entry point `() -> ()`: counts itself, then performs each call with
/// [`RETURN_SLOT`] as the return slot.
pub fn emit_main(calls: &[MainCall]) -> Function {
    let mut f = Function::new(vec![]);
    emit_bump(&mut f, GLOBAL_MAIN_CALLS);
    for call in calls {
        f.instruction(&Instruction::I32Const(RETURN_SLOT as i32));
        for arg in &call.args {
            f.instruction(&Instruction::I32Const(*arg as i32));
        }
        f.instruction(&Instruction::Call(call.function));
    }
    f.instruction(&Instruction::End);
    f
}

/// Closure deallocator `(data_ptr: i32) -> ()`; counts its calls.
pub fn emit_counting_dealloc() -> Function {
    let mut f = Function::new(vec![]);
    emit_bump(&mut f, GLOBAL_DROP_CALLS);
    f.instruction(&Instruction::End);
    f
}

/// Push the address of argument 0, or of [`UNDEFINED_SLOT`] when the
/// argument array is empty.
fn emit_first_arg(f: &mut Function) {
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::I32Load(memarg(4, 2)));
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::If(BlockType::Result(ValType::I32)));
    f.instruction(&Instruction::I32Const(UNDEFINED_SLOT as i32));
    f.instruction(&Instruction::Else);
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::I32Load(memarg(0, 2)));
    f.instruction(&Instruction::End);
}

/// Write the i32 on top of the stack into [`INT_SLOT`] as an Int32 and
/// install it. The value must be pushed by `push`.
fn emit_install_int(f: &mut Function, push: impl FnOnce(&mut Function)) {
    f.instruction(&Instruction::I32Const(INT_SLOT as i32));
    push(f);
    f.instruction(&Instruction::I32Store(memarg(0, 2)));
    f.instruction(&Instruction::I32Const(INT_SLOT as i32));
    f.instruction(&Instruction::I32Const(KIND_INT32 as i32));
    f.instruction(&Instruction::I32Store8(memarg(KIND_OFFSET as u64, 0)));
    f.instruction(&Instruction::I32Const(INT_SLOT as i32));
    f.instruction(&Instruction::Call(IMPORT_INSTALL_VALUE));
}

fn emit_install_undefined(f: &mut Function) {
    f.instruction(&Instruction::I32Const(UNDEFINED_SLOT as i32));
    f.instruction(&Instruction::Call(IMPORT_INSTALL_VALUE));
}

/// Installs argument 0 unchanged.
pub fn emit_echo() -> Function {
    let mut f = Function::new(vec![]);
    emit_first_arg(&mut f);
    f.instruction(&Instruction::Call(IMPORT_INSTALL_VALUE));
    f.instruction(&Instruction::End);
    f
}

/// Installs argument 0, then traps with `unreachable`.
pub fn emit_echo_then_trap() -> Function {
    let mut f = Function::new(vec![]);
    emit_first_arg(&mut f);
    f.instruction(&Instruction::Call(IMPORT_INSTALL_VALUE));
    f.instruction(&Instruction::Unreachable);
    f.instruction(&Instruction::End);
    f
}

/// Installs the argument count as an Int32.
pub fn emit_arg_count() -> Function {
    let mut f = Function::new(vec![]);
    emit_install_int(&mut f, |f| {
        f.instruction(&Instruction::LocalGet(1));
        f.instruction(&Instruction::I32Load(memarg(4, 2)));
    });
    f.instruction(&Instruction::End);
    f
}

/// Installs the closure's data pointer as an Int32.
pub fn emit_data_pointer() -> Function {
    let mut f = Function::new(vec![]);
    emit_install_int(&mut f, |f| {
        f.instruction(&Instruction::LocalGet(0));
    });
    f.instruction(&Instruction::End);
    f
}

/// Calls host function `function` with argument 0 and installs its result.
pub fn emit_forward(function: u32) -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::I32Const(RETURN_SLOT as i32));
    emit_first_arg(&mut f);
    f.instruction(&Instruction::Call(function));
    f.instruction(&Instruction::I32Const(RETURN_SLOT as i32));
    f.instruction(&Instruction::Call(IMPORT_INSTALL_VALUE));
    f.instruction(&Instruction::End);
    f
}

/// Static placement of a panic report's strings.
#[derive(Debug, Clone, Copy)]
pub struct PanicReport {
    pub message: (u32, u32),
    pub file: (u32, u32),
    pub line: u32,
}

/// Reports a panic through the three diagnostic imports, then installs
/// `undefined`.
pub fn emit_panic(report: PanicReport) -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::Call(IMPORT_PANIC));
    f.instruction(&Instruction::I32Const(report.message.0 as i32));
    f.instruction(&Instruction::I32Const(report.message.1 as i32));
    f.instruction(&Instruction::Call(IMPORT_PANIC_MESSAGE));
    f.instruction(&Instruction::I32Const(report.file.0 as i32));
    f.instruction(&Instruction::I32Const(report.file.1 as i32));
    f.instruction(&Instruction::I32Const(report.line as i32));
    f.instruction(&Instruction::Call(IMPORT_PANIC_LOCATION));
    emit_install_undefined(&mut f);
    f.instruction(&Instruction::End);
    f
}

/// Grows memory by `pages`, announces it, then installs argument 0.
pub fn emit_grow(pages: u32) -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::I32Const(pages as i32));
    emit_grow_checked(&mut f);
    emit_first_arg(&mut f);
    f.instruction(&Instruction::Call(IMPORT_INSTALL_VALUE));
    f.instruction(&Instruction::End);
    f
}

/// Reads the reference id out of argument 0 and passes it to `import`
/// (increment or decrement), then installs `undefined`.
pub fn emit_refcount(import: u32) -> Function {
    let mut f = Function::new(vec![]);
    emit_first_arg(&mut f);
    f.instruction(&Instruction::I32Load(memarg(0, 2)));
    f.instruction(&Instruction::Call(import));
    emit_install_undefined(&mut f);
    f.instruction(&Instruction::End);
    f
}
