/*
 * Copyright 2025 The Petrel developers
 *
 * This file is part of Petrel.
 *
 * Petrel is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Petrel is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Petrel. If not, see <https://www.gnu.org/licenses/>.
 */

//! Thread register context and stack switching.
//!
//! A suspended thread is entirely described by its stack pointer: the callee-saved
//! registers live on its kernel stack, pushed by `context_switch`. A freshly created
//! thread gets a hand-crafted frame which makes the first switch "return" into
//! [`thread_bootstrap`]; a thread duplicated by `fork` gets a frame which makes the
//! first switch restore a saved trap frame instead, through `fork_return`.
//!
//! None of the switch path requires a privileged execution level, so it also runs
//! hosted; only the trap-frame return and the userspace transition differ there.

use super::idt::IntFrame;
use crate::memory::VirtAddr;

/// Saved execution state of a suspended thread.
#[derive(Debug, Default)]
#[repr(C)]
pub struct Context {
	/// Kernel stack pointer at suspension.
	pub rsp: usize,
}

/// The entry point of every new thread, reached through the first context switch.
///
/// `entry` and `arg` are popped off the initial frame by the trampoline.
#[no_mangle]
extern "C" fn thread_bootstrap(entry: extern "C" fn(usize) -> !, arg: usize) -> ! {
	// The switch path runs with interrupts masked
	super::sti();
	entry(arg)
}

core::arch::global_asm!(
	r#"
.global context_switch
.global thread_trampoline

// context_switch(prev: *mut Context, next: *const Context)
context_switch:
	push rbx
	push rbp
	push r12
	push r13
	push r14
	push r15
	mov [rdi], rsp
	mov rsp, [rsi]
	pop r15
	pop r14
	pop r13
	pop r12
	pop rbp
	pop rbx
	ret

// First return target of a new thread. The initial frame leaves the entry point and
// its argument on top of the stack.
thread_trampoline:
	pop rdi
	pop rsi
	jmp thread_bootstrap
"#
);

// First return target of a forked thread: the stack holds a saved trap frame, which
// is restored the way a syscall returns.
#[cfg(target_os = "none")]
core::arch::global_asm!(
	r#"
.global fork_return

fork_return:
	pop r15
	pop r14
	pop r13
	pop r12
	pop r11
	pop r10
	pop r9
	pop r8
	pop rbp
	pop rdi
	pop rsi
	pop rdx
	pop rcx
	pop rbx
	pop rax
	add rsp, 16
	iretq
"#
);

// Hosted builds cannot iretq; the frame's saved instruction pointer is reached with a
// plain ret, leaving the cs/rflags/rsp/ss words behind on the dead stack above.
#[cfg(not(target_os = "none"))]
core::arch::global_asm!(
	r#"
.global fork_return

fork_return:
	pop r15
	pop r14
	pop r13
	pop r12
	pop r11
	pop r10
	pop r9
	pop r8
	pop rbp
	pop rdi
	pop rsi
	pop rdx
	pop rcx
	pop rbx
	pop rax
	add rsp, 16
	ret
"#
);

extern "C" {
	fn context_switch(prev: *mut Context, next: *const Context);
	fn thread_trampoline();
	fn fork_return();
}

/// Initializes `ctx` so the first switch into it enters `entry(arg)`.
///
/// `stack_top` is the top of the thread's kernel stack. The function writes the initial
/// frame below it.
///
/// # Safety
///
/// `stack_top` must be the top of a mapped, writable stack of sufficient size.
pub unsafe fn init(ctx: &mut Context, stack_top: VirtAddr, entry: extern "C" fn(usize) -> !, arg: usize) {
	let top = stack_top.as_ptr::<usize>();
	// Layout, from the top downwards: arg, entry, trampoline, then the six zeroed
	// callee-saved registers popped by the switch
	top.sub(1).write(arg);
	top.sub(2).write(entry as usize);
	top.sub(3).write(thread_trampoline as usize);
	for i in 4..=9 {
		top.sub(i).write(0);
	}
	ctx.rsp = top.sub(9) as usize;
}

/// Initializes `ctx` so the first switch into it restores `frame` and resumes at the
/// frame's saved instruction pointer, the way a syscall returns.
///
/// Used by `fork` for the duplicate of the calling thread: the caller passes a copy
/// of the live entry frame with the child's return registers already written.
///
/// # Safety
///
/// `stack_top` must be the top of a mapped, writable stack of sufficient size.
pub unsafe fn init_forked(ctx: &mut Context, stack_top: VirtAddr, frame: &IntFrame) {
	let frame_base = stack_top.as_ptr::<IntFrame>().sub(1);
	frame_base.write(frame.clone());
	// Below the frame: the switch frame returning into fork_return
	let words = frame_base as *mut usize;
	words.sub(1).write(fork_return as usize);
	for i in 2..=7 {
		words.sub(i).write(0);
	}
	ctx.rsp = words.sub(7) as usize;
}

/// Rebases the saved stack pointer of `src` from the stack at `old_base` onto a copy
/// of that stack at `new_base`, storing the result in `dst`.
pub fn rebase(dst: &mut Context, src: &Context, old_base: VirtAddr, new_base: VirtAddr) {
	dst.rsp = new_base.0.wrapping_add(src.rsp.wrapping_sub(old_base.0));
}

/// Switches from the thread owning `prev` to the thread owning `next`.
///
/// # Safety
///
/// Both contexts must be valid and `next` must not be running anywhere else.
pub unsafe fn switch(prev: *mut Context, next: *const Context) {
	context_switch(prev, next);
}

/// Jumps to userspace at `ip` with the stack `sp`.
///
/// # Safety
///
/// `ip` and `sp` must point into mapped userspace memory of the bound address space.
pub unsafe fn enter_user(ip: usize, sp: usize) -> ! {
	#[cfg(target_os = "none")]
	{
		// Conventional user segment selectors, with RPL 3
		core::arch::asm!(
			"push 0x23",  // ss
			"push {sp}",
			"push 0x202", // rflags: IF
			"push 0x1b",  // cs
			"push {ip}",
			"iretq",
			sp = in(reg) sp,
			ip = in(reg) ip,
			options(noreturn),
		);
	}
	#[cfg(not(target_os = "none"))]
	{
		let _ = (ip, sp);
		unreachable!("userspace transition requires a freestanding target");
	}
}
