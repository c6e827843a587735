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

//! Reference-counted physical frames.
//!
//! An [`RcFrame`] is the owning handle to a buddy-allocated block: page caches and VM
//! objects store clones of it, and the block returns to the buddy allocator when the
//! last clone is dropped.

use super::{
	buddy,
	buddy::{FrameOrder, Page},
	PhysAddr, VirtAddr,
};
use alloc::sync::Arc;
use core::{fmt, slice};
use utils::{errno::AllocResult, limits::PAGE_SIZE};

#[derive(Debug)]
struct RcFrameInner {
	/// The frame descriptor.
	page: &'static Page,
	/// The order of the block.
	order: FrameOrder,
}

impl Drop for RcFrameInner {
	fn drop(&mut self) {
		unsafe {
			buddy::free(self.page);
		}
	}
}

/// Reference-counted allocated physical block.
///
/// When the reference count reaches zero, the block is freed.
///
/// A new reference is created with [`Clone`].
#[derive(Clone)]
pub struct RcFrame(Arc<RcFrameInner>);

impl RcFrame {
	/// Allocates a new, *uninitialized* block of the given order.
	pub fn new(order: FrameOrder) -> AllocResult<Self> {
		let page = buddy::alloc(order)?;
		Ok(Self(Arc::new(RcFrameInner {
			page,
			order,
		})))
	}

	/// Allocates a new, zeroed block of the given order.
	pub fn new_zeroed(order: FrameOrder) -> AllocResult<Self> {
		let frame = Self::new(order)?;
		unsafe {
			frame.slice_mut().fill(0);
		}
		Ok(frame)
	}

	/// Returns the block's physical address.
	#[inline]
	pub fn phys_addr(&self) -> PhysAddr {
		self.0.page.phys_addr()
	}

	/// Returns the block's virtual address through the HHDM.
	#[inline]
	pub fn virt_addr(&self) -> VirtAddr {
		self.phys_addr().to_virtual()
	}

	/// Returns the frame descriptor.
	#[inline]
	pub fn page(&self) -> &'static Page {
		self.0.page
	}

	/// Returns the order of the block.
	#[inline]
	pub fn order(&self) -> FrameOrder {
		self.0.order
	}

	/// Returns the size of the block in bytes.
	#[inline]
	#[allow(clippy::len_without_is_empty)]
	pub fn len(&self) -> usize {
		PAGE_SIZE << self.0.order
	}

	/// Returns an immutable slice over the block.
	pub fn slice(&self) -> &[u8] {
		unsafe { slice::from_raw_parts(self.virt_addr().as_ptr(), self.len()) }
	}

	/// Returns a mutable slice over the block.
	///
	/// # Safety
	///
	/// It is the caller's responsibility to ensure no other reference to the same range
	/// exists at the same time.
	#[inline]
	#[allow(clippy::mut_from_ref)]
	pub unsafe fn slice_mut(&self) -> &mut [u8] {
		slice::from_raw_parts_mut(self.virt_addr().as_ptr(), self.len())
	}

	/// Tells whether other handles to the same block exist.
	#[inline]
	pub fn is_shared(&self) -> bool {
		Arc::strong_count(&self.0) > 1
	}
}

impl fmt::Debug for RcFrame {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RcFrame")
			.field("addr", &self.phys_addr())
			.field("order", &self.order())
			.finish()
	}
}
