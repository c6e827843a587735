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

//! Local APIC and I/O APIC access, and the [`IrqChip`] implementation on top of them.

use crate::event::{Irq, IrqChip};
#[cfg(target_os = "none")]
use crate::event::IrqTrigger;
use crate::memory::PhysAddr;
use utils::{errno, errno::EResult};

/// Default physical base of the local APIC registers.
const LAPIC_BASE: PhysAddr = PhysAddr(0xfee0_0000);
/// Default physical base of the I/O APIC registers.
const IOAPIC_BASE: PhysAddr = PhysAddr(0xfec0_0000);

/// LAPIC register: ID.
const LAPIC_REG_ID: usize = 0x20;
/// LAPIC register: end of interrupt.
const LAPIC_REG_EOI: usize = 0xb0;
/// LAPIC register: spurious interrupt vector.
const LAPIC_REG_SVR: usize = 0xf0;
/// LAPIC register: LVT timer.
pub(super) const LAPIC_REG_LVT_TIMER: usize = 0x320;
/// LAPIC register: timer initial count.
pub(super) const LAPIC_REG_TIMER_INIT: usize = 0x380;
/// LAPIC register: timer divide configuration.
pub(super) const LAPIC_REG_TIMER_DIV: usize = 0x3e0;

/// The first vector usable for device interrupts.
pub const IRQ_VECTOR_BASE: u32 = 64;
/// The last vector usable for device interrupts.
pub const IRQ_VECTOR_MAX: u32 = 255;

/// Reads a local APIC register.
#[cfg(target_os = "none")]
pub(super) fn lapic_read(reg: usize) -> u32 {
	unsafe {
		let ptr = LAPIC_BASE.to_virtual().as_ptr::<u32>().byte_add(reg);
		ptr.read_volatile()
	}
}

/// Writes a local APIC register.
#[cfg(target_os = "none")]
pub(super) fn lapic_write(reg: usize, val: u32) {
	unsafe {
		let ptr = LAPIC_BASE.to_virtual().as_ptr::<u32>().byte_add(reg);
		ptr.write_volatile(val);
	}
}

/// Returns the local APIC ID of the current CPU.
#[cfg(target_os = "none")]
pub fn lapic_id() -> u32 {
	lapic_read(LAPIC_REG_ID) >> 24
}

/// Signals the end of the current interrupt to the local APIC.
pub fn eoi() {
	#[cfg(target_os = "none")]
	lapic_write(LAPIC_REG_EOI, 0);
}

/// Enables the local APIC of the current CPU.
///
/// # Safety
///
/// Must be called once per CPU during bring-up.
#[cfg(target_os = "none")]
pub unsafe fn lapic_enable() {
	// Software-enable, spurious vector 0xff
	lapic_write(LAPIC_REG_SVR, 0x100 | 0xff);
}

/// Reads an I/O APIC register through its index/data window.
#[cfg(target_os = "none")]
fn ioapic_read(reg: u32) -> u32 {
	unsafe {
		let base = IOAPIC_BASE.to_virtual().as_ptr::<u32>();
		base.write_volatile(reg);
		base.byte_add(0x10).read_volatile()
	}
}

/// Writes an I/O APIC register through its index/data window.
#[cfg(target_os = "none")]
fn ioapic_write(reg: u32, val: u32) {
	unsafe {
		let base = IOAPIC_BASE.to_virtual().as_ptr::<u32>();
		base.write_volatile(reg);
		base.byte_add(0x10).write_volatile(val);
	}
}

/// Programs the redirection entry routing `gsi` to `vector` on the CPU with LAPIC ID
/// `dest`.
#[cfg(target_os = "none")]
fn ioapic_route(gsi: u32, vector: u32, trigger: IrqTrigger, masked: bool, dest: u32) {
	let reg = 0x10 + gsi * 2;
	let mut low = vector;
	match trigger {
		IrqTrigger::LevelHigh => low |= 1 << 15,
		IrqTrigger::LevelLow => low |= (1 << 15) | (1 << 13),
		IrqTrigger::EdgeFalling => low |= 1 << 13,
		IrqTrigger::EdgeRising => {}
	}
	if masked {
		low |= 1 << 16;
	}
	ioapic_write(reg + 1, dest << 24);
	ioapic_write(reg, low);
}

/// The APIC-based interrupt controller.
pub struct ApicChip;

/// The interrupt controller instance of the port.
pub static APIC_CHIP: ApicChip = ApicChip;

impl IrqChip for ApicChip {
	fn vector_range(&self) -> (u32, u32) {
		(IRQ_VECTOR_BASE, IRQ_VECTOR_MAX)
	}

	fn enable(&self, irq: &Irq) {
		#[cfg(target_os = "none")]
		ioapic_route(
			irq.vector() - IRQ_VECTOR_BASE,
			irq.vector(),
			irq.trigger(),
			false,
			irq.cpu(),
		);
		#[cfg(not(target_os = "none"))]
		let _ = irq;
	}

	fn disable(&self, irq: &Irq) {
		#[cfg(target_os = "none")]
		ioapic_route(
			irq.vector() - IRQ_VECTOR_BASE,
			irq.vector(),
			irq.trigger(),
			true,
			irq.cpu(),
		);
		#[cfg(not(target_os = "none"))]
		let _ = irq;
	}

	fn set_affinity(&self, irq: &Irq, cpu: u32) -> EResult<()> {
		if cpu >= 256 {
			return Err(errno!(EINVAL));
		}
		#[cfg(target_os = "none")]
		ioapic_route(
			irq.vector() - IRQ_VECTOR_BASE,
			irq.vector(),
			irq.trigger(),
			!irq.is_enabled(),
			cpu,
		);
		#[cfg(not(target_os = "none"))]
		let _ = irq;
		Ok(())
	}

	fn eoi(&self, _vector: u32) {
		eoi();
	}
}
