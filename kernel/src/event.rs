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

//! Hardware interrupt management.
//!
//! An [`Irq`] reserves one architectural vector (x86_64) or INTID (AArch64) and binds a
//! handler to it. Routing, masking and affinity go through the architecture's
//! interrupt controller behind the [`IrqChip`] trait.
//!
//! On interrupt entry, the low-level stub identifies the vector and calls
//! [`dispatch`]. An interrupt nobody claimed is fatal.

use crate::{arch, sync::IntSpin};
use alloc::{boxed::Box, collections::BTreeMap, sync::Arc};
use core::sync::atomic::{
	AtomicBool, AtomicU32,
	Ordering::{Acquire, Relaxed, Release},
};
use utils::{errno, errno::EResult};

/// Trigger mode of an interrupt line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IrqTrigger {
	EdgeRising,
	EdgeFalling,
	LevelHigh,
	LevelLow,
}

/// An interrupt handler. Returns whether the interrupt was handled.
pub type IrqHandler = Box<dyn Fn(&Irq) -> bool + Send + Sync>;

/// Operations provided by an interrupt controller.
pub trait IrqChip: Send + Sync {
	/// Returns the inclusive range of vectors the controller can route.
	fn vector_range(&self) -> (u32, u32);
	/// Unmasks the interrupt at the controller level.
	fn enable(&self, irq: &Irq);
	/// Masks the interrupt at the controller level.
	fn disable(&self, irq: &Irq);
	/// Reroutes the interrupt to the given CPU.
	fn set_affinity(&self, irq: &Irq, cpu: u32) -> EResult<()>;
	/// Signals the end of the interrupt.
	fn eoi(&self, vector: u32);
}

/// A reserved interrupt vector with its handler.
pub struct Irq {
	/// The architectural vector.
	vector: u32,
	/// Trigger mode.
	trigger: IrqTrigger,
	/// Allocation flags, for future use by drivers.
	#[allow(dead_code)]
	flags: u32,
	/// The CPU the interrupt is routed to.
	cpu: AtomicU32,
	/// Whether the line is unmasked.
	enabled: AtomicBool,
	/// The bound handler.
	handler: IrqHandler,
}

impl Irq {
	/// Returns the architectural vector of the interrupt.
	#[inline]
	pub fn vector(&self) -> u32 {
		self.vector
	}

	/// Returns the trigger mode of the interrupt.
	#[inline]
	pub fn trigger(&self) -> IrqTrigger {
		self.trigger
	}

	/// Returns the CPU the interrupt is routed to.
	#[inline]
	pub fn cpu(&self) -> u32 {
		self.cpu.load(Relaxed)
	}

	/// Tells whether the line is unmasked.
	#[inline]
	pub fn is_enabled(&self) -> bool {
		self.enabled.load(Acquire)
	}

	/// Unmasks the interrupt at the controller level.
	pub fn enable(&self) {
		arch::irq_chip().enable(self);
		self.enabled.store(true, Release);
	}

	/// Masks the interrupt at the controller level.
	pub fn disable(&self) {
		arch::irq_chip().disable(self);
		self.enabled.store(false, Release);
	}

	/// Reroutes the interrupt to the given CPU, reprogramming the controller.
	pub fn set_affinity(&self, cpu: u32) -> EResult<()> {
		arch::irq_chip().set_affinity(self, cpu)?;
		self.cpu.store(cpu, Relaxed);
		Ok(())
	}
}

/// The table of reserved vectors.
static IRQS: IntSpin<BTreeMap<u32, Arc<Irq>>> = IntSpin::new(BTreeMap::new());

/// Initializes interrupt handling on the current CPU.
pub(crate) fn init() {
	arch::imp::init_interrupts();
}

/// Reserves a free vector, binding `handler` to it.
///
/// The interrupt starts enabled.
///
/// If no vector is available, the function returns [`EBUSY`].
pub fn irq_alloc(trigger: IrqTrigger, handler: IrqHandler, flags: u32) -> EResult<Arc<Irq>> {
	let (base, max) = arch::irq_chip().vector_range();
	let mut irqs = IRQS.lock();
	let vector = (base..=max)
		.find(|v| !irqs.contains_key(v))
		.ok_or(errno!(EBUSY))?;
	let irq = Arc::new(Irq {
		vector,
		trigger,
		flags,
		cpu: AtomicU32::new(arch::cpu_id()),
		enabled: AtomicBool::new(false),
		handler,
	});
	irqs.insert(vector, irq.clone());
	drop(irqs);
	irq.enable();
	Ok(irq)
}

/// Releases the vector and controller routing of `irq`.
///
/// Pending raises after this call are ignored.
pub fn irq_free(irq: &Arc<Irq>) {
	irq.disable();
	IRQS.lock().remove(&irq.vector);
}

/// Software-raises the interrupt, for emulated lines and tests.
///
/// The handler runs only if the vector is still reserved and enabled. Returns whether
/// the handler was invoked.
pub fn irq_raise(irq: &Arc<Irq>) -> bool {
	let current = {
		let irqs = IRQS.lock();
		irqs.get(&irq.vector).cloned()
	};
	match current {
		Some(cur) if Arc::ptr_eq(&cur, irq) && cur.is_enabled() => {
			(cur.handler)(&cur);
			true
		}
		_ => false,
	}
}

/// Dispatches the hardware interrupt with the given vector.
///
/// An unclaimed or unhandled interrupt is fatal.
pub(crate) fn dispatch(vector: u32) {
	let irq = {
		let irqs = IRQS.lock();
		irqs.get(&vector).cloned()
	};
	let Some(irq) = irq else {
		panic!("unclaimed interrupt (vector: {vector})");
	};
	let handled = (irq.handler)(&irq);
	if !handled {
		panic!("unhandled interrupt (vector: {vector})");
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use core::sync::atomic::{AtomicUsize, Ordering::SeqCst};

	#[test]
	fn irq_dispatch_count() {
		let count = Arc::new(AtomicUsize::new(0));
		let c = count.clone();
		let irq = irq_alloc(
			IrqTrigger::LevelHigh,
			Box::new(move |_| {
				c.fetch_add(1, SeqCst);
				true
			}),
			0,
		)
		.unwrap();
		for _ in 0..3 {
			assert!(irq_raise(&irq));
		}
		assert_eq!(count.load(SeqCst), 3);
		// A freed line no longer reaches the handler
		irq_free(&irq);
		assert!(!irq_raise(&irq));
		assert_eq!(count.load(SeqCst), 3);
	}

	#[test]
	fn irq_disable_blocks_raise() {
		let count = Arc::new(AtomicUsize::new(0));
		let c = count.clone();
		let irq = irq_alloc(
			IrqTrigger::EdgeRising,
			Box::new(move |_| {
				c.fetch_add(1, SeqCst);
				true
			}),
			0,
		)
		.unwrap();
		irq.disable();
		assert!(!irq_raise(&irq));
		irq.enable();
		assert!(irq_raise(&irq));
		assert_eq!(count.load(SeqCst), 1);
		irq_free(&irq);
	}

	#[test]
	fn irq_affinity() {
		let irq = irq_alloc(IrqTrigger::LevelLow, Box::new(|_| true), 0).unwrap();
		irq.set_affinity(0).unwrap();
		assert_eq!(irq.cpu(), 0);
		// Out-of-range CPU is rejected and the routing is unchanged
		assert!(irq.set_affinity(100_000).is_err());
		assert_eq!(irq.cpu(), 0);
		irq_free(&irq);
	}

	#[test]
	fn irq_vectors_unique() {
		let a = irq_alloc(IrqTrigger::LevelHigh, Box::new(|_| true), 0).unwrap();
		let b = irq_alloc(IrqTrigger::LevelHigh, Box::new(|_| true), 0).unwrap();
		assert_ne!(a.vector(), b.vector());
		irq_free(&a);
		irq_free(&b);
	}
}
