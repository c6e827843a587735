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

//! MMIO register ranges, mapped uncached into the kernel half.

use super::{
	vmem,
	vmem::{CachePolicy, MapSize, Prot, VMem},
	PhysAddr, VirtAddr,
};
use crate::sync::IntSpin;
use utils::{errno::EResult, limits::PAGE_SIZE};

/// Serializes mutations of the kernel context.
static KERNEL_VMEM_LOCK: IntSpin<()> = IntSpin::new(());

/// Runs `f` with a handle on the kernel virtual memory context.
pub(crate) fn with_kernel_vmem<T, F: FnOnce(&mut VMem) -> T>(f: F) -> T {
	let _guard = KERNEL_VMEM_LOCK.lock();
	let mut vmem = unsafe { VMem::from_root(vmem::kernel_root()) };
	let res = f(&mut vmem);
	// The kernel context is global, never dropped
	core::mem::forget(vmem);
	res
}

/// Maps `pages` pages of device registers at `phys` into the kernel half, uncached.
///
/// Returns the virtual address of the mapping.
pub fn map(phys: PhysAddr, pages: usize) -> EResult<VirtAddr> {
	let virt = phys.to_virtual();
	with_kernel_vmem(|vmem| {
		for i in 0..pages {
			vmem.map(
				virt + i * PAGE_SIZE,
				phys + i * PAGE_SIZE,
				MapSize::Normal,
				Prot::RW,
				CachePolicy::Uncached,
			)?;
		}
		Ok(virt)
	})
}

/// Unmaps a range previously mapped with [`map`].
pub fn unmap(virt: VirtAddr, pages: usize) {
	with_kernel_vmem(|vmem| {
		for i in 0..pages {
			vmem.unmap(virt + i * PAGE_SIZE);
		}
	});
}
