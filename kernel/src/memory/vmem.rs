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

//! Virtual memory contexts.
//!
//! [`VMem`] wraps the architecture's translation tables behind an
//! architecture-independent interface. A mapping is installed at one of three
//! granules; the user/kernel attribute is derived from the half of the address space
//! the virtual address belongs to.

use super::{memmap, PhysAddr, VirtAddr};
use crate::arch::paging;
use crate::sync::OnceInit;
use bitflags::bitflags;
use utils::{errno::AllocResult, limits::PAGE_SIZE};

bitflags! {
	/// Memory protection of a mapping.
	#[derive(Clone, Copy, Debug, Eq, PartialEq)]
	pub struct Prot: u8 {
		const READ = 0b001;
		const WRITE = 0b010;
		const EXEC = 0b100;
	}
}

impl Prot {
	/// Read and write access.
	pub const RW: Self = Self::READ.union(Self::WRITE);
}

/// The granule of a mapping.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MapSize {
	/// 4 KiB page.
	Normal,
	/// 2 MiB page.
	Large,
	/// 1 GiB page.
	Huge,
}

impl MapSize {
	/// The size of the granule in bytes.
	#[inline]
	pub fn bytes(self) -> usize {
		match self {
			MapSize::Normal => PAGE_SIZE,
			MapSize::Large => PAGE_SIZE << 9,
			MapSize::Huge => PAGE_SIZE << 18,
		}
	}
}

/// Cache policy of a mapping.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CachePolicy {
	/// Write-back.
	#[default]
	WriteBack,
	/// Write-through.
	WriteThrough,
	/// Write-combining.
	WriteCombine,
	/// Uncached, for device memory.
	Uncached,
}

/// The root of the kernel-half translation tables.
static KERNEL_ROOT: OnceInit<PhysAddr> = unsafe { OnceInit::new() };

/// A virtual memory context.
pub struct VMem {
	/// The root translation table.
	root: PhysAddr,
}

impl VMem {
	/// Creates a new context, sharing the kernel half with every other context.
	pub fn new() -> AllocResult<Self> {
		let root = paging::alloc_root()?;
		unsafe {
			paging::copy_kernel_half(root, *KERNEL_ROOT);
		}
		Ok(Self {
			root,
		})
	}

	/// Wraps an existing root table.
	///
	/// # Safety
	///
	/// `root` must point to valid translation tables, owned by the caller.
	pub unsafe fn from_root(root: PhysAddr) -> Self {
		Self {
			root,
		}
	}

	/// Returns the physical address of the root table.
	#[inline]
	pub fn root(&self) -> PhysAddr {
		self.root
	}

	/// Maps the physical page(s) at `phys` to `virt` with the given granule.
	///
	/// An existing mapping at `virt` is replaced. The mapcount of the target frame is
	/// incremented when it is managed RAM and the granule is [`MapSize::Normal`].
	pub fn map(
		&mut self,
		virt: VirtAddr,
		phys: PhysAddr,
		size: MapSize,
		prot: Prot,
		cache: CachePolicy,
	) -> AllocResult<()> {
		unsafe { paging::map(self.root, virt, phys, size, prot, cache) }
	}

	/// Unmaps the page at `virt`, invalidating its local TLB entry.
	///
	/// Intermediate tables whose reference count drops to zero are freed on the way
	/// back up.
	///
	/// Returns the physical address and granule of the removed mapping.
	pub fn unmap(&mut self, virt: VirtAddr) -> Option<(PhysAddr, MapSize)> {
		unsafe { paging::unmap(self.root, virt) }
	}

	/// Rewrites the protection of the mapping covering `virt`.
	///
	/// Returns `false` if no mapping covers the address.
	pub fn protect(&mut self, virt: VirtAddr, prot: Prot) -> bool {
		unsafe { paging::protect(self.root, virt, prot) }
	}

	/// Translates `virt` into the base physical address and granule of its mapping.
	pub fn translate(&self, virt: VirtAddr) -> Option<(PhysAddr, MapSize)> {
		paging::translate(self.root, virt)
	}

	/// Translates `virt` into the exact corresponding physical address.
	pub fn virt_to_phys(&self, virt: VirtAddr) -> Option<PhysAddr> {
		let (base, size) = self.translate(virt)?;
		Some(base + (virt.0 & (size.bytes() - 1)))
	}

	/// Tells whether the mapping covering `virt` allows writes.
	pub fn is_writable(&self, virt: VirtAddr) -> Option<bool> {
		paging::is_writable(self.root, virt)
	}

	/// Binds the context to the current CPU.
	pub fn bind(&self) {
		unsafe {
			paging::bind(self.root);
		}
	}

	/// Tells whether the context is bound to the current CPU.
	pub fn is_bound(&self) -> bool {
		paging::is_bound(self.root)
	}
}

impl Drop for VMem {
	fn drop(&mut self) {
		if self.is_bound() {
			panic!("dropping a virtual memory context while in use");
		}
		unsafe {
			paging::free_user(self.root);
		}
	}
}

/// Invalidates the TLB entry of the page at `virt` on the current CPU.
#[inline]
pub fn invalidate_page(virt: VirtAddr) {
	paging::invlpg(virt);
}

/// Invalidates the pages at `virt` on every CPU mapping the context.
///
/// Cross-CPU shootdown hook: the IPI path is not wired yet, remote CPUs are flushed
/// lazily on their next context switch.
pub fn shootdown_range(virt: VirtAddr, pages: usize) {
	for i in 0..pages {
		invalidate_page(virt + i * PAGE_SIZE);
	}
}

/// Builds the kernel context and its higher-half direct map.
pub(super) fn init() -> AllocResult<()> {
	let root = paging::alloc_root()?;
	unsafe {
		OnceInit::init(&KERNEL_ROOT, root);
	}
	// Identity-map the managed RAM into the HHDM, using large pages where alignment
	// allows. The boot glue is responsible for the kernel image mappings
	let (begin, pages) = memmap::ram_region();
	let end = begin + pages * PAGE_SIZE;
	let mut vmem = unsafe { VMem::from_root(root) };
	let mut addr = begin;
	while addr < end {
		let virt = addr.to_virtual();
		let large = MapSize::Large.bytes();
		let size = if addr.is_aligned_to(large) && addr.0 + large <= end.0 {
			MapSize::Large
		} else {
			MapSize::Normal
		};
		vmem.map(virt, addr, size, Prot::RW, CachePolicy::WriteBack)?;
		addr = addr + size.bytes();
	}
	#[cfg(target_os = "none")]
	vmem.bind();
	// The kernel context is global, never dropped
	core::mem::forget(vmem);
	Ok(())
}

/// Returns the root of the kernel-half translation tables.
pub(crate) fn kernel_root() -> PhysAddr {
	*KERNEL_ROOT
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::test_utils;

	#[test]
	fn vmem_map_translate() {
		test_utils::init_kernel();
		let mut vmem = VMem::new().unwrap();
		assert_eq!(vmem.translate(VirtAddr(0x100000)), None);
		vmem.map(
			VirtAddr(0x100000),
			PhysAddr(0x200000),
			MapSize::Normal,
			Prot::RW,
			CachePolicy::WriteBack,
		)
		.unwrap();
		assert_eq!(
			vmem.translate(VirtAddr(0x100000)),
			Some((PhysAddr(0x200000), MapSize::Normal))
		);
		assert_eq!(vmem.virt_to_phys(VirtAddr(0x100123)), Some(PhysAddr(0x200123)));
		assert_eq!(vmem.translate(VirtAddr(0x101000)), None);
		assert_eq!(vmem.is_writable(VirtAddr(0x100000)), Some(true));
	}

	#[test]
	fn vmem_unmap() {
		test_utils::init_kernel();
		let mut vmem = VMem::new().unwrap();
		vmem.map(
			VirtAddr(0x400000),
			PhysAddr(0x200000),
			MapSize::Normal,
			Prot::READ,
			CachePolicy::WriteBack,
		)
		.unwrap();
		assert_eq!(
			vmem.unmap(VirtAddr(0x400000)),
			Some((PhysAddr(0x200000), MapSize::Normal))
		);
		assert_eq!(vmem.unmap(VirtAddr(0x400000)), None);
		assert_eq!(vmem.translate(VirtAddr(0x400000)), None);
	}

	#[test]
	fn vmem_granules() {
		test_utils::init_kernel();
		let mut vmem = VMem::new().unwrap();
		vmem.map(
			VirtAddr(0x4000_0000),
			PhysAddr(0x4000_0000),
			MapSize::Large,
			Prot::RW,
			CachePolicy::WriteBack,
		)
		.unwrap();
		assert_eq!(
			vmem.translate(VirtAddr(0x4000_0000 + 0x1000)),
			Some((PhysAddr(0x4000_0000), MapSize::Large))
		);
		assert_eq!(
			vmem.virt_to_phys(VirtAddr(0x4000_0000 + 0x1234)),
			Some(PhysAddr(0x4000_1234))
		);
	}

	#[test]
	fn vmem_protect() {
		test_utils::init_kernel();
		let mut vmem = VMem::new().unwrap();
		vmem.map(
			VirtAddr(0x500000),
			PhysAddr(0x200000),
			MapSize::Normal,
			Prot::RW,
			CachePolicy::WriteBack,
		)
		.unwrap();
		assert!(vmem.protect(VirtAddr(0x500000), Prot::READ));
		assert_eq!(vmem.is_writable(VirtAddr(0x500000)), Some(false));
		assert!(vmem.protect(VirtAddr(0x500000), Prot::RW));
		assert_eq!(vmem.is_writable(VirtAddr(0x500000)), Some(true));
		assert!(!vmem.protect(VirtAddr(0x600000), Prot::READ));
	}

	#[test]
	fn vmem_mapcount() {
		use crate::memory::buddy;
		test_utils::init_kernel();
		let mut vmem = VMem::new().unwrap();
		let frame = buddy::alloc(0).unwrap();
		assert_eq!(frame.map_count(), 0);
		vmem.map(
			VirtAddr(0x700000),
			frame.phys_addr(),
			MapSize::Normal,
			Prot::RW,
			CachePolicy::WriteBack,
		)
		.unwrap();
		assert_eq!(frame.map_count(), 1);
		vmem.map(
			VirtAddr(0x701000),
			frame.phys_addr(),
			MapSize::Normal,
			Prot::READ,
			CachePolicy::WriteBack,
		)
		.unwrap();
		assert_eq!(frame.map_count(), 2);
		vmem.unmap(VirtAddr(0x700000));
		vmem.unmap(VirtAddr(0x701000));
		assert_eq!(frame.map_count(), 0);
		unsafe {
			buddy::free(frame);
		}
	}
}
