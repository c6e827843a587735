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

//! Memory segments: one contiguous virtual range backed by a VM object.

use super::object::VmObject;
use crate::memory::{vmem::Prot, VirtAddr};
use alloc::sync::Arc;
use bitflags::bitflags;
use core::num::NonZeroUsize;
use utils::limits::PAGE_SIZE;

bitflags! {
	/// Mapping flags of a segment.
	#[derive(Clone, Copy, Debug, Eq, PartialEq)]
	pub struct MapFlags: u32 {
		/// Writes stay private to this mapping (copy-on-write).
		const PRIVATE = 0x01;
		/// Writes are carried to the backing object.
		const SHARED = 0x02;
		/// The mapping is backed by anonymous zero-filled memory.
		const ANON = 0x04;
		/// Map exactly at the requested address.
		const FIXED = 0x08;
		/// With `FIXED`, fail instead of replacing existing segments.
		const FIXED_NOREPLACE = 0x10;
		/// Fault every page in immediately.
		const POPULATE = 0x20;
	}
}

/// A segment of an address space.
#[derive(Clone, Debug)]
pub struct Segment {
	/// The first virtual address of the segment. Page-aligned.
	pub start: VirtAddr,
	/// The length of the segment in pages.
	pub pages: NonZeroUsize,
	/// Memory protection.
	pub prot: Prot,
	/// Mapping flags.
	pub flags: MapFlags,
	/// The backing object.
	pub object: Arc<VmObject>,
	/// Offset of the segment's first page in the object, in pages.
	pub object_off: u64,
}

impl Segment {
	/// The first address past the segment.
	#[inline]
	pub fn end(&self) -> VirtAddr {
		self.start + self.pages.get() * PAGE_SIZE
	}

	/// Tells whether the segment contains `addr`.
	#[inline]
	pub fn contains(&self, addr: VirtAddr) -> bool {
		addr >= self.start && addr < self.end()
	}

	/// The object page index backing the page at `addr`.
	#[inline]
	pub fn object_index(&self, addr: VirtAddr) -> u64 {
		self.object_off + ((addr.0 - self.start.0) / PAGE_SIZE) as u64
	}

	/// Removes the page range `[inner_off, inner_off + count)` from the segment,
	/// returning the remaining pieces.
	///
	/// Both pieces keep a reference to the same object, at adjusted offsets.
	pub fn split(&self, inner_off: usize, count: usize) -> (Option<Segment>, Option<Segment>) {
		let prev = NonZeroUsize::new(inner_off).map(|pages| Segment {
			start: self.start,
			pages,
			prot: self.prot,
			flags: self.flags,
			object: self.object.clone(),
			object_off: self.object_off,
		});
		let end = inner_off + count;
		let next = self
			.pages
			.get()
			.checked_sub(end)
			.and_then(NonZeroUsize::new)
			.map(|pages| Segment {
				start: self.start + end * PAGE_SIZE,
				pages,
				prot: self.prot,
				flags: self.flags,
				object: self.object.clone(),
				object_off: self.object_off + end as u64,
			});
		(prev, next)
	}
}
