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

//! Memory management.
//!
//! The memory is split in two halves:
//! - Userspace: everything below the architecture's split address, private to each
//!   process
//! - Kernelspace: everything above, shared by every address space
//!
//! The kernel half contains the HHDM (higher-half direct map), a 1:1 view of physical
//! memory at `hhdm_offset()`, through which the kernel can reach any frame.

#[cfg(target_os = "none")]
pub mod alloc;
pub mod buddy;
pub mod cache;
pub mod memmap;
pub mod mmio;
pub mod user;
pub mod vmem;

use crate::arch::paging;
use core::{
	fmt,
	mem::size_of,
	ops::{Add, Deref, DerefMut, Sub},
	ptr,
	sync::atomic::{AtomicUsize, Ordering::Relaxed},
};
use memmap::BootInfo;
use utils::errno::EResult;

/// The first address of the kernel half of the virtual memory.
pub const KERNEL_SPLIT: VirtAddr = VirtAddr(paging::KERNEL_SPLIT);

/// Offset of the higher-half direct map.
static HHDM_OFFSET: AtomicUsize = AtomicUsize::new(0);

/// Returns the offset of the higher-half direct map.
#[inline]
pub fn hhdm_offset() -> usize {
	HHDM_OFFSET.load(Relaxed)
}

/// An address on physical memory.
#[repr(transparent)]
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PhysAddr(pub usize);

impl PhysAddr {
	/// Returns the virtual address of the physical address through the HHDM.
	#[inline]
	pub fn to_virtual(self) -> VirtAddr {
		VirtAddr(self.0.wrapping_add(hhdm_offset()))
	}
}

/// An address on virtual memory.
///
/// This would usually be represented by a pointer. However, in some cases we need to
/// represent virtual addresses without being able to dereference them.
#[repr(transparent)]
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VirtAddr(pub usize);

impl VirtAddr {
	/// Returns the physical address of an HHDM virtual address.
	#[inline]
	pub fn to_physical(self) -> PhysAddr {
		PhysAddr(self.0.wrapping_sub(hhdm_offset()))
	}

	/// Tells whether the address lives in the kernel half.
	#[inline]
	pub fn is_kernel(self) -> bool {
		self >= KERNEL_SPLIT
	}

	/// Returns a mutable pointer to the virtual address.
	pub fn as_ptr<T>(self) -> *mut T {
		ptr::with_exposed_provenance_mut(self.0)
	}
}

impl<T> From<*const T> for VirtAddr {
	fn from(ptr: *const T) -> Self {
		Self(ptr as usize)
	}
}

impl<T> From<*mut T> for VirtAddr {
	fn from(ptr: *mut T) -> Self {
		Self(ptr as usize)
	}
}

macro_rules! addr_impl {
	($name:ident) => {
		impl $name {
			/// Tells whether the address is null.
			pub fn is_null(self) -> bool {
				self.0 == 0
			}

			/// Tells whether the address is aligned to `align`.
			pub fn is_aligned_to(self, align: usize) -> bool {
				self.0 % align == 0
			}

			/// Returns the next address aligned to `align`.
			///
			/// If `self` is already aligned, the function returns `self`.
			pub fn align_to(self, align: usize) -> Self {
				Self(self.0.next_multiple_of(align))
			}

			/// Returns the previous address aligned to `align`.
			///
			/// If `self` is already aligned, the function returns `self`.
			pub fn down_align_to(self, align: usize) -> Self {
				Self(self.0 & !(align - 1))
			}
		}

		impl Deref for $name {
			type Target = usize;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}

		impl DerefMut for $name {
			fn deref_mut(&mut self) -> &mut Self::Target {
				&mut self.0
			}
		}

		impl Add<usize> for $name {
			type Output = Self;

			/// Adds the given offset in bytes, wrapping on overflow.
			fn add(self, off: usize) -> Self::Output {
				Self(self.0.wrapping_add(off))
			}
		}

		impl Sub<usize> for $name {
			type Output = Self;

			/// Subtracts the given offset in bytes, wrapping on overflow.
			fn sub(self, off: usize) -> Self::Output {
				Self(self.0.wrapping_sub(off))
			}
		}

		impl fmt::Debug for $name {
			fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
				const LEN: usize = size_of::<usize>() * 2;
				write!(fmt, "{:0LEN$x}", self.0)
			}
		}
	};
}

addr_impl!(PhysAddr);
addr_impl!(VirtAddr);

/// Initializes memory management from the boot information.
///
/// Must be called exactly once, before anything allocates.
pub(crate) fn init(boot: &BootInfo) -> EResult<()> {
	HHDM_OFFSET.store(boot.hhdm_offset, Relaxed);
	memmap::init(boot);
	buddy::init();
	vmem::init()?;
	#[cfg(target_os = "none")]
	alloc::init()?;
	Ok(())
}
