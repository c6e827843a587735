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

//! One-shot preemption timer, backed by the local APIC timer.

use crate::time::clock;
use core::sync::atomic::{
	AtomicU64, AtomicUsize,
	Ordering::{Relaxed, Release},
};

/// The vector the LAPIC timer fires on. Below the device-interrupt range.
pub(super) const TIMER_VECTOR: u32 = 0x30;

/// The per-CPU timer callback.
static HANDLER: AtomicUsize = AtomicUsize::new(0);
/// LAPIC timer ticks per microsecond, measured by the boot glue.
static TICKS_PER_US: AtomicU64 = AtomicU64::new(1);
/// The delay programmed by the last call to [`timer_one_shot`].
static LAST_DELAY_US: AtomicU64 = AtomicU64::new(0);

/// Stores the calibration result of the boot glue.
pub fn timer_calibrate(ticks_per_us: u64) {
	TICKS_PER_US.store(ticks_per_us.max(1), Release);
}

/// Registers the function called whenever the preemption timer fires.
pub fn timer_set_handler(f: fn()) {
	HANDLER.store(f as usize, Release);
}

/// Arms the one-shot timer of the current CPU to fire in `us` microseconds.
pub fn timer_one_shot(us: u64) {
	LAST_DELAY_US.store(us, Relaxed);
	#[cfg(target_os = "none")]
	{
		use super::apic;
		// One-shot mode, divide by 16
		apic::lapic_write(apic::LAPIC_REG_TIMER_DIV, 0b11);
		apic::lapic_write(apic::LAPIC_REG_LVT_TIMER, TIMER_VECTOR);
		let count = us * TICKS_PER_US.load(Relaxed) / 16;
		apic::lapic_write(apic::LAPIC_REG_TIMER_INIT, count.max(1) as u32);
	}
}

/// Called from the interrupt path when the timer fires.
pub(super) fn tick() {
	clock::advance_us(LAST_DELAY_US.load(Relaxed));
	let handler = HANDLER.load(Relaxed);
	if handler != 0 {
		let f: fn() = unsafe { core::mem::transmute(handler) };
		f();
	}
	super::apic::eoi();
}
