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

//! Architecture-specific code.
//!
//! The rest of the kernel only goes through the functions re-exported here and through
//! the `paging`, `context` and interrupt-controller interfaces of the selected port.
//! Instructions that require a privileged execution level are compiled only for
//! freestanding targets (`target_os = "none"`); on hosted builds they are no-ops so the
//! surrounding logic can be tested.

cfg_if::cfg_if! {
	if #[cfg(target_arch = "x86_64")] {
		pub mod x86_64;
		pub(crate) use x86_64 as imp;
	} else if #[cfg(target_arch = "aarch64")] {
		pub mod aarch64;
		pub(crate) use aarch64 as imp;
	}
}

pub use imp::{context, paging, IntFrame};

/// Disables local interrupts.
#[inline]
pub fn cli() {
	imp::cli();
}

/// Enables local interrupts.
#[inline]
pub fn sti() {
	imp::sti();
}

/// Tells whether local interrupts are enabled.
#[inline]
pub fn is_interrupt_enabled() -> bool {
	imp::is_interrupt_enabled()
}

/// Waits for the next interrupt, with interrupts enabled.
#[inline]
pub fn halt() {
	imp::halt();
}

/// Returns the identifier of the current CPU.
#[inline]
pub fn cpu_id() -> u32 {
	imp::cpu_id()
}

/// Writes a string on the architecture's debug serial port.
pub fn serial_write(s: &str) {
	imp::serial_write(s);
}

/// Returns the interrupt controller of the architecture.
pub fn irq_chip() -> &'static dyn crate::event::IrqChip {
	imp::irq_chip()
}

/// Registers the per-CPU timer interrupt callback and the preemption quantum.
///
/// The callback runs in interrupt context every time the one-shot timer fires; it is
/// responsible for re-arming through [`timer_one_shot`].
pub fn timer_set_handler(f: fn()) {
	imp::timer_set_handler(f);
}

/// Arms the one-shot preemption timer of the current CPU to fire in `us` microseconds.
pub fn timer_one_shot(us: u64) {
	imp::timer_one_shot(us);
}

/// Writes the architectural thread pointer of the current CPU.
pub fn tcb_set(ptr: usize) {
	imp::tcb_set(ptr);
}
