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

//! One-shot preemption timer, backed by the EL1 physical generic timer.

use crate::time::clock;
use core::sync::atomic::{
	AtomicU64, AtomicUsize,
	Ordering::{Relaxed, Release},
};

/// The PPI INTID of the EL1 physical timer.
pub(super) const TIMER_INTID: u32 = 30;

/// The per-CPU timer callback.
static HANDLER: AtomicUsize = AtomicUsize::new(0);
/// The delay programmed by the last call to [`timer_one_shot`].
static LAST_DELAY_US: AtomicU64 = AtomicU64::new(0);

/// Registers the function called whenever the preemption timer fires.
pub fn timer_set_handler(f: fn()) {
	HANDLER.store(f as usize, Release);
}

/// Arms the one-shot timer of the current CPU to fire in `us` microseconds.
pub fn timer_one_shot(us: u64) {
	LAST_DELAY_US.store(us, Relaxed);
	#[cfg(target_os = "none")]
	unsafe {
		let freq: u64;
		core::arch::asm!("mrs {}, cntfrq_el0", out(reg) freq);
		let ticks = us * freq / 1_000_000;
		core::arch::asm!(
			"msr cntp_tval_el0, {}",
			"mov x9, #1",
			"msr cntp_ctl_el0, x9",
			in(reg) ticks.max(1),
			out("x9") _,
		);
	}
}

/// Called from the interrupt path when the timer fires.
pub(super) fn tick() {
	#[cfg(target_os = "none")]
	unsafe {
		// Mask the timer until it is re-armed
		core::arch::asm!("msr cntp_ctl_el0, xzr");
	}
	clock::advance_us(LAST_DELAY_US.load(Relaxed));
	let handler = HANDLER.load(Relaxed);
	if handler != 0 {
		let f: fn() = unsafe { core::mem::transmute(handler) };
		f();
	}
}
