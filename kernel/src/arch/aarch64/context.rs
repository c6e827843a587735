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
//! A suspended thread keeps its callee-saved registers on its kernel stack, stored by
//! `context_switch`. A freshly created thread gets a hand-crafted frame which makes
//! the first switch "return" into [`thread_bootstrap`]; a thread duplicated by `fork`
//! gets a frame which makes the first switch restore a saved exception frame instead,
//! through `fork_return`.
//!
//! The switch path itself needs no privileged execution level and also runs hosted.

use super::exception::IntFrame;
use crate::memory::VirtAddr;

/// Saved execution state of a suspended thread.
#[derive(Debug, Default)]
#[repr(C)]
pub struct Context {
	/// Kernel stack pointer at suspension.
	pub sp: usize,
}

/// The entry point of every new thread, reached through the first context switch.
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
	stp x19, x20, [sp, #-96]!
	stp x21, x22, [sp, #16]
	stp x23, x24, [sp, #32]
	stp x25, x26, [sp, #48]
	stp x27, x28, [sp, #64]
	stp x29, x30, [sp, #80]
	mov x9, sp
	str x9, [x0]
	ldr x9, [x1]
	mov sp, x9
	ldp x29, x30, [sp, #80]
	ldp x27, x28, [sp, #64]
	ldp x25, x26, [sp, #48]
	ldp x23, x24, [sp, #32]
	ldp x21, x22, [sp, #16]
	ldp x19, x20, [sp], #96
	ret

// First return target of a new thread. The initial frame stored the entry point in
// x19 and its argument in x20.
thread_trampoline:
	mov x0, x19
	mov x1, x20
	b thread_bootstrap
"#
);

// First return target of a forked thread: the stack holds a saved exception frame,
// which is restored the way a syscall returns.
#[cfg(target_os = "none")]
core::arch::global_asm!(
	r#"
.global fork_return

fork_return:
	ldp x9, x10, [sp, #256]
	msr elr_el1, x9
	msr spsr_el1, x10
	ldr x9, [sp, #248]
	msr sp_el0, x9
	ldr x30, [sp, #240]
	ldp x28, x29, [sp, #224]
	ldp x26, x27, [sp, #208]
	ldp x24, x25, [sp, #192]
	ldp x22, x23, [sp, #176]
	ldp x20, x21, [sp, #160]
	ldp x18, x19, [sp, #144]
	ldp x16, x17, [sp, #128]
	ldp x14, x15, [sp, #112]
	ldp x12, x13, [sp, #96]
	ldp x10, x11, [sp, #80]
	ldp x8, x9, [sp, #64]
	ldp x6, x7, [sp, #48]
	ldp x4, x5, [sp, #32]
	ldp x2, x3, [sp, #16]
	ldp x0, x1, [sp]
	add sp, sp, #272
	eret
"#
);

// Hosted builds cannot eret; the frame's saved return address is reached with a
// branch, clobbering the x9 scratch register.
#[cfg(not(target_os = "none"))]
core::arch::global_asm!(
	r#"
.global fork_return

fork_return:
	ldr x30, [sp, #240]
	ldp x28, x29, [sp, #224]
	ldp x26, x27, [sp, #208]
	ldp x24, x25, [sp, #192]
	ldp x22, x23, [sp, #176]
	ldp x20, x21, [sp, #160]
	ldp x18, x19, [sp, #144]
	ldp x16, x17, [sp, #128]
	ldp x14, x15, [sp, #112]
	ldp x12, x13, [sp, #96]
	ldp x10, x11, [sp, #80]
	ldr x8, [sp, #64]
	ldp x6, x7, [sp, #48]
	ldp x4, x5, [sp, #32]
	ldp x2, x3, [sp, #16]
	ldr x9, [sp, #256]
	ldp x0, x1, [sp]
	add sp, sp, #272
	br x9
"#
);

extern "C" {
	fn context_switch(prev: *mut Context, next: *const Context);
	fn thread_trampoline();
	fn fork_return();
}

/// Initializes `ctx` so the first switch into it enters `entry(arg)`.
///
/// # Safety
///
/// `stack_top` must be the top of a mapped, writable stack of sufficient size.
pub unsafe fn init(ctx: &mut Context, stack_top: VirtAddr, entry: extern "C" fn(usize) -> !, arg: usize) {
	let frame = stack_top.as_ptr::<usize>().sub(12);
	frame.write_bytes(0, 12);
	// x19 and x20 feed the trampoline, x30 is the switch's return target
	frame.write(entry as usize); // x19
	frame.add(1).write(arg); // x20
	frame.add(11).write(thread_trampoline as usize); // x30
	ctx.sp = frame as usize;
}

/// Initializes `ctx` so the first switch into it restores `frame` and resumes at the
/// frame's saved return address, the way a syscall returns.
///
/// Used by `fork` for the duplicate of the calling thread: the caller passes a copy
/// of the live exception frame with the child's return registers already written.
///
/// # Safety
///
/// `stack_top` must be the top of a mapped, writable stack of sufficient size.
pub unsafe fn init_forked(ctx: &mut Context, stack_top: VirtAddr, frame: &IntFrame) {
	let frame_base = stack_top.as_ptr::<IntFrame>().sub(1);
	frame_base.write(frame.clone());
	// Below the frame: the switch frame returning into fork_return
	let sw = (frame_base as *mut usize).sub(12);
	sw.write_bytes(0, 12);
	sw.add(11).write(fork_return as usize); // x30
	ctx.sp = sw as usize;
}

/// Rebases the saved stack pointer of `src` from the stack at `old_base` onto a copy
/// of that stack at `new_base`, storing the result in `dst`.
pub fn rebase(dst: &mut Context, src: &Context, old_base: VirtAddr, new_base: VirtAddr) {
	dst.sp = new_base.0.wrapping_add(src.sp.wrapping_sub(old_base.0));
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
		core::arch::asm!(
			"msr elr_el1, {ip}",
			"msr sp_el0, {sp}",
			// EL0t, interrupts enabled
			"msr spsr_el1, xzr",
			"eret",
			ip = in(reg) ip,
			sp = in(reg) sp,
			options(noreturn),
		);
	}
	#[cfg(not(target_os = "none"))]
	{
		let _ = (ip, sp);
		unreachable!("userspace transition requires a freestanding target");
	}
}
