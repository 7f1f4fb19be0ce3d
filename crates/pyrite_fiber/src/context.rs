//! Architecture-specific context switching.
//!
//! [`switch_context`] is the sole suspension primitive in the whole fiber
//! stack: it saves the callee-saved registers of the calling context onto
//! the calling stack, stores the resulting stack pointer through
//! `out_prev_sp`, loads `new_sp` into the architectural stack pointer, and
//! restores the counterpart registers of whatever was saved there. Control
//! returns to whichever site originally called `switch_context` with that
//! stack pointer — which, the very first time a fiber runs, is
//! [`prepare_stack`]'s synthetic frame rather than a real suspension point.
//!
//! Supported targets: `x86_64` and `aarch64`, both under `cfg(unix)`. The
//! Windows x64 calling convention additionally treats `xmm6`–`xmm15` as
//! callee-saved and isn't implemented here (see DESIGN.md).

use core::arch::asm;

/// A raw stack pointer value, as stored between switches.
///
/// Not a real pointer type because it's never dereferenced directly — it's
/// only ever handed back to [`switch_context`].
pub type StackPointer = usize;

/// The one-shot entry point a freshly prepared fiber stack "returns" into.
///
/// Implemented in `pyrite_fiber::fiber`; receives the fiber's `*mut Fiber`
/// as its only argument, in the platform's first-argument register, and
/// never returns.
pub type FiberTrampoline = unsafe extern "C" fn(arg: *mut u8) -> !;

#[cfg(all(unix, target_arch = "x86_64"))]
mod x86_64_impl {
    use super::{FiberTrampoline, StackPointer};
    use core::arch::{asm, naked_asm};

    /// Number of `usize` slots the saved-register frame occupies:
    /// `rbp, rbx, r12, r13, r14, r15`.
    const SAVED_REGS: usize = 6;

    /// Saves `rbp, rbx, r12, r13, r14, r15` (the System V AMD64 callee-saved
    /// general-purpose registers; none of `xmm0`–`xmm15` are callee-saved
    /// under this ABI, so there is nothing vector-register-specific to do
    /// here) to the current stack, writes the resulting `rsp` through
    /// `out_prev_sp`, then loads `new_sp` and restores its frame.
    ///
    /// # Safety
    ///
    /// `new_sp` must be either a value previously produced by a prior call
    /// to this function (stored through some `out_prev_sp`) or a value
    /// produced by [`super::prepare_stack`] for a fiber that has not yet
    /// run. `out_prev_sp` must be valid to write a `usize` through, or null
    /// (to discard the previous stack pointer, used when a fiber is known
    /// never to be resumed).
    #[unsafe(naked)]
    pub unsafe extern "C" fn switch_context(out_prev_sp: *mut StackPointer, new_sp: StackPointer) {
        naked_asm!(
            "push rbp",
            "push rbx",
            "push r12",
            "push r13",
            "push r14",
            "push r15",
            // rdi = out_prev_sp, may be null when the caller doesn't care
            // (e.g. switching away from a fiber that just finished).
            "test rdi, rdi",
            "jz 2f",
            "mov [rdi], rsp",
            "2:",
            "mov rsp, rsi",
            "pop r15",
            "pop r14",
            "pop r13",
            "pop r12",
            "pop rbx",
            "pop rbp",
            "ret",
        );
    }

    /// The stub a freshly switched-to fiber stack lands in.
    ///
    /// `switch_context`'s restore sequence pops the stashed fiber pointer
    /// into `r12` (a callee-saved register, chosen purely as a parking
    /// spot) before `ret` "returns" here. `rdi` is not callee-saved and so
    /// can't carry the argument across the switch directly; this stub's
    /// only job is to move it into `rdi` — the System V first-argument
    /// register — before calling the real entry point.
    #[unsafe(naked)]
    unsafe extern "C" fn trampoline_entry() {
        naked_asm!("mov rdi, r12", "call {entry}", "ud2", entry = sym super::fiber_trampoline_entry);
    }

    /// Lays out a fresh fiber stack so that the first [`switch_context`]
    /// into it "returns" into [`trampoline_entry`] with `arg` available.
    ///
    /// `stack_top` must be 16-byte aligned (the high end of the stack
    /// allocation) and have at least `SAVED_REGS * 8 + 8` bytes below it.
    ///
    /// # Safety
    ///
    /// `stack_top` must point one-past-the-end of a writable region of at
    /// least `(SAVED_REGS + 1) * size_of::<usize>()` bytes that outlives the
    /// fiber.
    pub unsafe fn prepare_stack(stack_top: *mut u8, arg: *mut u8) -> StackPointer {
        unsafe {
            debug_assert_eq!(stack_top as usize % 16, 0, "stack top must be 16-byte aligned");

            let mut sp = stack_top as *mut usize;

            // The slot `switch_context`'s `ret` will read as the return
            // address: the address of our trampoline.
            sp = sp.sub(1);
            sp.write(trampoline_entry as usize);

            // rbp, rbx, r12, r13, r14, r15 — popped in this order, so r15
            // is written first (lowest address).
            sp = sp.sub(SAVED_REGS);
            sp.add(0).write(0); // r15
            sp.add(1).write(0); // r14
            sp.add(2).write(0); // r13
            sp.add(3).write(arg as usize); // r12: carries the fiber arg
            sp.add(4).write(0); // rbx
            sp.add(5).write(0); // rbp

            sp as StackPointer
        }
    }

    // silence "unused" in the rare configuration where this module is
    // compiled but the generic re-export below isn't referenced
    #[allow(dead_code)]
    fn _assert_trampoline_type(_f: FiberTrampoline) {}
}

#[cfg(all(unix, target_arch = "aarch64"))]
mod aarch64_impl {
    use super::{FiberTrampoline, StackPointer};
    use core::arch::naked_asm;

    /// `x19`..`x28` (10 GPRs) + `x29`/`x30` (frame pointer, link register) +
    /// `d8`..`d15` (8 callee-saved FP/SIMD low-64-bits), in save order.
    const SAVED_REGS: usize = 20;

    /// AAPCS64 callee-saved register save/restore, mirroring
    /// [`super::x86_64_impl::switch_context`].
    ///
    /// # Safety
    ///
    /// Same contract as the `x86_64` implementation.
    #[unsafe(naked)]
    pub unsafe extern "C" fn switch_context(out_prev_sp: *mut StackPointer, new_sp: StackPointer) {
        naked_asm!(
            "stp x19, x20, [sp, #-160]!",
            "stp x21, x22, [sp, #16]",
            "stp x23, x24, [sp, #32]",
            "stp x25, x26, [sp, #48]",
            "stp x27, x28, [sp, #64]",
            "stp x29, x30, [sp, #80]",
            "stp d8,  d9,  [sp, #96]",
            "stp d10, d11, [sp, #112]",
            "stp d12, d13, [sp, #128]",
            "stp d14, d15, [sp, #144]",
            "cbz x0, 1f",
            "mov x2, sp",
            "str x2, [x0]",
            "1:",
            "mov sp, x1",
            "ldp d14, d15, [sp, #144]",
            "ldp d12, d13, [sp, #128]",
            "ldp d10, d11, [sp, #112]",
            "ldp d8,  d9,  [sp, #96]",
            "ldp x29, x30, [sp, #80]",
            "ldp x27, x28, [sp, #64]",
            "ldp x25, x26, [sp, #48]",
            "ldp x23, x24, [sp, #32]",
            "ldp x21, x22, [sp, #16]",
            "ldp x19, x20, [sp], #160",
            "ret",
        );
    }

    #[unsafe(naked)]
    unsafe extern "C" fn trampoline_entry() {
        // The fiber argument was stashed in callee-saved x19 by
        // `prepare_stack`; x30 (lr) was set to this function's own address,
        // so `bl` here returns to nowhere meaningful, which is fine since
        // the real entry point never returns.
        naked_asm!("mov x0, x19", "bl {entry}", "brk #1", entry = sym super::fiber_trampoline_entry);
    }

    /// # Safety
    ///
    /// `stack_top` must point one-past-the-end of a writable, 16-byte
    /// aligned region of at least `SAVED_REGS * size_of::<u64>()` bytes
    /// that outlives the fiber.
    pub unsafe fn prepare_stack(stack_top: *mut u8, arg: *mut u8) -> StackPointer {
        unsafe {
            debug_assert_eq!(stack_top as usize % 16, 0, "stack top must be 16-byte aligned");

            let sp = (stack_top as *mut u64).sub(SAVED_REGS);
            // Matches the stp/ldp layout in `switch_context` above.
            sp.add(0).write(arg as u64); // x19
            sp.add(1).write(0); // x20
            sp.add(2).write(0); // x21
            sp.add(3).write(0); // x22
            sp.add(4).write(0); // x23
            sp.add(5).write(0); // x24
            sp.add(6).write(0); // x25
            sp.add(7).write(0); // x26
            sp.add(8).write(0); // x27
            sp.add(9).write(0); // x28
            sp.add(10).write(0); // x29 (fp)
            sp.add(11).write(trampoline_entry as u64); // x30 (lr)
            for i in 12..SAVED_REGS {
                sp.add(i).write(0); // d8..d15
            }

            sp as StackPointer
        }
    }

    #[allow(dead_code)]
    fn _assert_trampoline_type(_f: FiberTrampoline) {}
}

#[cfg(all(unix, target_arch = "x86_64"))]
use x86_64_impl as arch;
#[cfg(all(unix, target_arch = "aarch64"))]
use aarch64_impl as arch;

#[cfg(not(any(all(unix, target_arch = "x86_64"), all(unix, target_arch = "aarch64"))))]
compile_error!("pyrite_fiber's context switch is implemented for x86_64 and aarch64 on unix only");

/// Saves the calling context's callee-saved registers, records its stack
/// pointer through `out_prev_sp`, and switches to `new_sp`.
///
/// # Safety
///
/// See the architecture-specific implementations; in short, `new_sp` must
/// be a stack pointer this function (or [`prepare_stack`]) previously
/// produced for a context that is safe to resume exactly once more.
#[inline]
pub unsafe fn switch_context(out_prev_sp: *mut StackPointer, new_sp: StackPointer) {
    unsafe { arch::switch_context(out_prev_sp, new_sp) }
}

/// Prepares a fresh stack so that the first [`switch_context`] into it
/// enters the fiber trampoline with `arg` in the platform's first-argument
/// register, as specified by §4.1.
///
/// # Safety
///
/// `stack_top` must be 16-byte aligned and point one-past-the-end of a
/// writable region large enough for the architecture's saved-register
/// frame (at least a few hundred bytes; real stacks are tens of
/// kilobytes). The region must remain valid and exclusively owned by this
/// fiber until it finishes.
#[inline]
pub unsafe fn prepare_stack(stack_top: *mut u8, arg: *mut u8) -> StackPointer {
    unsafe { arch::prepare_stack(stack_top, arg) }
}

/// Called by the architecture trampolines with the fiber's `*mut Fiber`
/// (type-erased as `*mut u8`) once the argument has been moved into the
/// first-argument register. Forwards into `fiber::fiber_main`, which runs
/// the fiber's closure and never returns (it context-switches back out).
///
/// # Safety
///
/// `arg` must be a valid `*mut crate::fiber::Fiber` produced by
/// [`crate::pool::FiberPool`].
unsafe extern "C" fn fiber_trampoline_entry(arg: *mut u8) -> ! {
    unsafe { crate::fiber::fiber_main(arg.cast()) }
}

/// A fence ensuring the compiler does not reorder ordinary loads/stores
/// across a context switch boundary that it cannot see into (the switch is
/// opaque inline assembly, but callers sometimes also need this around
/// non-atomic bookkeeping updated right before/after a switch).
#[inline]
pub fn compiler_fence() {
    unsafe {
        asm!("", options(nostack, preserves_flags));
    }
}
