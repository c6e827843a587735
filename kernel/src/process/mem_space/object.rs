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

//! VM objects, the pluggable page sources behind memory segments.
//!
//! An object produces the pages of the region it backs:
//! - **anon**: demand-allocated, zero-filled frames
//! - **vnode**: pages of a file, through the vnode's page cache
//! - **phys**: a fixed physical range (MMIO); never allocates, never copies
//! - **shadow**: copy-on-write layer delegating reads to a parent object and keeping
//!   privately copied pages in its own cache
//!
//! Offsets are page indices into the object. Frames cached by anon and shadow objects
//! are owned by the object; a vnode's frames belong to the vnode's page cache, the
//! object's own array only tracks dirtiness (mark 0).

use crate::{
	file::vfs::{cache as vnode_cache, node::Vnode},
	memory::{cache::RcFrame, PhysAddr},
	sync::IntSpin,
};
use alloc::sync::Arc;
use core::fmt;
use utils::{
	collections::xarray::{XArray, XA_MARK_0},
	errno,
	errno::EResult,
	limits::PAGE_SIZE,
};

/// A page produced by a VM object.
#[derive(Clone, Debug)]
pub enum VmPage {
	/// An owned, refcounted frame.
	Frame(RcFrame),
	/// A fixed physical page, not managed by the frame allocator.
	Fixed(PhysAddr),
}

impl VmPage {
	/// The physical address of the page.
	pub fn phys_addr(&self) -> PhysAddr {
		match self {
			VmPage::Frame(f) => f.phys_addr(),
			VmPage::Fixed(p) => *p,
		}
	}
}

/// The variant-specific state of an object.
pub enum Source {
	/// Zero-filled demand paging.
	Anon,
	/// Pages of a file.
	Vnode {
		/// The backing vnode.
		vnode: Arc<Vnode>,
		/// Byte offset of the object's page 0 in the file. Page-aligned.
		base_off: u64,
	},
	/// A fixed physical range.
	Phys {
		/// Physical address of the object's page 0.
		base: PhysAddr,
	},
	/// Copy-on-write layer over another object.
	Shadow {
		/// The next object in the COW chain. The shadow holds one strong reference.
		parent: Arc<VmObject>,
	},
}

/// Variant-specific operations of a VM object.
pub trait VmObjectOps: Send + Sync {
	/// Produces the page at `index`, installing it in the object's cache when the
	/// object owns its pages.
	fn get_page(&self, obj: &VmObject, index: u64) -> EResult<VmPage>;

	/// Copies `src` into a private page at `index` of `obj`'s cache.
	///
	/// Used by the write path of copy-on-write.
	fn copy_page(&self, obj: &VmObject, index: u64, src: &VmPage) -> EResult<RcFrame> {
		let (_, _, _) = (obj, index, src);
		Err(errno!(ENOTSUP))
	}
}

/// A pluggable page source.
///
/// Cached frames are released with the object; a frame only returns to the frame
/// allocator once it is both unmapped everywhere and released here.
pub struct VmObject {
	/// The size of the object in bytes.
	size: u64,
	/// Cached pages, keyed by page index.
	cached: IntSpin<XArray<RcFrame>>,
	/// The operation table of the variant.
	ops: &'static dyn VmObjectOps,
	/// The variant-specific state.
	source: Source,
}

impl VmObject {
	/// Creates an anonymous object of `size` bytes.
	pub fn new_anon(size: u64) -> Arc<Self> {
		Arc::new(Self {
			size,
			cached: IntSpin::new(XArray::new()),
			ops: &ANON_OPS,
			source: Source::Anon,
		})
	}

	/// Creates an object over the file `vnode`, starting at byte `base_off`.
	pub fn new_vnode(vnode: Arc<Vnode>, base_off: u64, size: u64) -> Arc<Self> {
		debug_assert!(base_off % PAGE_SIZE as u64 == 0);
		Arc::new(Self {
			size,
			cached: IntSpin::new(XArray::new()),
			ops: &VNODE_OPS,
			source: Source::Vnode {
				vnode,
				base_off,
			},
		})
	}

	/// Creates an object over the fixed physical range starting at `base`.
	pub fn new_phys(base: PhysAddr, size: u64) -> Arc<Self> {
		Arc::new(Self {
			size,
			cached: IntSpin::new(XArray::new()),
			ops: &PHYS_OPS,
			source: Source::Phys {
				base,
			},
		})
	}

	/// Creates a copy-on-write shadow of `parent`.
	pub fn new_shadow(parent: Arc<VmObject>) -> Arc<Self> {
		Arc::new(Self {
			size: parent.size,
			cached: IntSpin::new(XArray::new()),
			ops: &SHADOW_OPS,
			source: Source::Shadow {
				parent,
			},
		})
	}

	/// The size of the object in bytes.
	#[inline]
	pub fn size(&self) -> u64 {
		self.size
	}

	/// The variant-specific state.
	#[inline]
	pub fn source(&self) -> &Source {
		&self.source
	}

	/// Tells whether the object is a shadow.
	#[inline]
	pub fn is_shadow(&self) -> bool {
		matches!(self.source, Source::Shadow { .. })
	}

	/// Tells whether writes to a private mapping of this object require a shadow
	/// layer before they can proceed.
	///
	/// Anonymous pages are owned by their object; fixed physical ranges never copy.
	pub fn needs_cow(&self) -> bool {
		matches!(self.source, Source::Vnode { .. } | Source::Shadow { .. })
	}

	/// Returns the page at `index`, from cache or through the variant's producer.
	pub fn get_page(&self, index: u64) -> EResult<VmPage> {
		// Cache hit does not reach the producer
		if let Some(frame) = self.cached.lock().get(index) {
			return Ok(VmPage::Frame(frame.clone()));
		}
		self.ops.get_page(self, index)
	}

	/// Copies `src` into a private page at `index`, installing it in the cache.
	pub fn copy_page(&self, index: u64, src: &VmPage) -> EResult<RcFrame> {
		self.ops.copy_page(self, index, src)
	}

	/// Returns the cached page at `index`, without invoking the producer.
	pub fn lookup_page(&self, index: u64) -> Option<RcFrame> {
		self.cached.lock().get(index).cloned()
	}

	/// Installs `frame` at `index` in the object's cache.
	///
	/// If another producer won the race, its frame is kept and returned instead.
	pub fn insert_page(&self, index: u64, frame: RcFrame) -> RcFrame {
		let mut cached = self.cached.lock();
		match cached.get(index) {
			Some(existing) => existing.clone(),
			None => {
				cached.insert(index, frame.clone());
				frame
			}
		}
	}

	/// Removes the cached page at `index`.
	pub fn remove_page(&self, index: u64) -> Option<RcFrame> {
		self.cached.lock().remove(index)
	}

	/// Records a write through a shared mapping of the object.
	///
	/// For file-backed objects, the page is flagged dirty both here and in the
	/// vnode's page cache.
	pub fn mark_dirty(&self, index: u64, frame: &RcFrame) {
		let mut cached = self.cached.lock();
		if cached.get(index).is_none() {
			cached.insert(index, frame.clone());
		}
		cached.set_mark(index, XA_MARK_0);
		drop(cached);
		if let Source::Vnode {
			vnode,
			base_off,
		} = &self.source
		{
			let file_index = index + base_off / PAGE_SIZE as u64;
			vnode.cache.lock().set_mark(file_index, XA_MARK_0);
		}
	}
}

impl fmt::Debug for VmObject {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let kind = match &self.source {
			Source::Anon => "anon",
			Source::Vnode { .. } => "vnode",
			Source::Phys { .. } => "phys",
			Source::Shadow { .. } => "shadow",
		};
		f.debug_struct("VmObject")
			.field("kind", &kind)
			.field("size", &self.size)
			.finish()
	}
}

/// Copies the content of `src` into a fresh frame.
fn copy_frame(src: &VmPage) -> EResult<RcFrame> {
	let dst = RcFrame::new(0)?;
	let src_slice =
		unsafe { core::slice::from_raw_parts(src.phys_addr().to_virtual().as_ptr::<u8>(), PAGE_SIZE) };
	unsafe {
		dst.slice_mut().copy_from_slice(src_slice);
	}
	Ok(dst)
}

/// Operations of anonymous objects.
struct AnonOps;

static ANON_OPS: AnonOps = AnonOps;

impl VmObjectOps for AnonOps {
	fn get_page(&self, obj: &VmObject, index: u64) -> EResult<VmPage> {
		let frame = RcFrame::new_zeroed(0)?;
		Ok(VmPage::Frame(obj.insert_page(index, frame)))
	}

	fn copy_page(&self, obj: &VmObject, index: u64, src: &VmPage) -> EResult<RcFrame> {
		let dst = copy_frame(src)?;
		Ok(obj.insert_page(index, dst))
	}
}

/// Operations of file-backed objects.
struct VnodeObjOps;

static VNODE_OPS: VnodeObjOps = VnodeObjOps;

impl VmObjectOps for VnodeObjOps {
	fn get_page(&self, obj: &VmObject, index: u64) -> EResult<VmPage> {
		let Source::Vnode {
			vnode,
			base_off,
		} = &obj.source
		else {
			unreachable!();
		};
		let file_index = index + base_off / PAGE_SIZE as u64;
		// Pages entirely past the end of the file do not exist
		if file_index * PAGE_SIZE as u64 >= vnode.size() {
			return Err(errno!(EFAULT));
		}
		// The vnode's cache owns the frame; the object does not keep a copy
		let frame = vnode_cache::get_page(vnode, file_index, false)?;
		Ok(VmPage::Frame(frame))
	}
}

/// Operations of fixed physical objects.
struct PhysOps;

static PHYS_OPS: PhysOps = PhysOps;

impl VmObjectOps for PhysOps {
	fn get_page(&self, obj: &VmObject, index: u64) -> EResult<VmPage> {
		let Source::Phys {
			base,
		} = &obj.source
		else {
			unreachable!();
		};
		if index * PAGE_SIZE as u64 >= obj.size {
			return Err(errno!(EFAULT));
		}
		Ok(VmPage::Fixed(*base + index as usize * PAGE_SIZE))
	}
}

/// Operations of shadow objects.
struct ShadowOps;

static SHADOW_OPS: ShadowOps = ShadowOps;

impl VmObjectOps for ShadowOps {
	fn get_page(&self, obj: &VmObject, index: u64) -> EResult<VmPage> {
		let Source::Shadow {
			parent,
		} = &obj.source
		else {
			unreachable!();
		};
		// Local cache was missed (the caller checked): delegate upward. The recursion
		// terminates at a non-shadow object
		parent.get_page(index)
	}

	fn copy_page(&self, obj: &VmObject, index: u64, src: &VmPage) -> EResult<RcFrame> {
		let dst = copy_frame(src)?;
		Ok(obj.insert_page(index, dst))
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::test_utils;

	#[test]
	fn anon_zero_fill() {
		test_utils::init_kernel();
		let obj = VmObject::new_anon(4 * PAGE_SIZE as u64);
		let page = obj.get_page(2).unwrap();
		let VmPage::Frame(frame) = &page else {
			panic!("anon must produce owned frames");
		};
		assert!(frame.slice().iter().all(|b| *b == 0));
		// Cached: the same frame comes back
		let again = obj.get_page(2).unwrap();
		assert_eq!(again.phys_addr(), page.phys_addr());
	}

	#[test]
	fn shadow_delegates_and_copies() {
		test_utils::init_kernel();
		let parent = VmObject::new_anon(PAGE_SIZE as u64);
		let page = parent.get_page(0).unwrap();
		if let VmPage::Frame(f) = &page {
			unsafe {
				f.slice_mut()[0] = 0xaa;
			}
		}
		let shadow = VmObject::new_shadow(parent.clone());
		// Reads delegate to the parent
		let read = shadow.get_page(0).unwrap();
		assert_eq!(read.phys_addr(), page.phys_addr());
		// A copy-up produces a private frame with the parent's content
		let copied = shadow.copy_page(0, &read).unwrap();
		assert_ne!(copied.phys_addr(), page.phys_addr());
		assert_eq!(copied.slice()[0], 0xaa);
		// The private page now hides the parent's
		let after = shadow.get_page(0).unwrap();
		assert_eq!(after.phys_addr(), copied.phys_addr());
	}

	#[test]
	fn phys_is_fixed() {
		test_utils::init_kernel();
		let obj = VmObject::new_phys(PhysAddr(0xf000_0000), 2 * PAGE_SIZE as u64);
		let page = obj.get_page(1).unwrap();
		assert!(matches!(page, VmPage::Fixed(_)));
		assert_eq!(page.phys_addr(), PhysAddr(0xf000_0000 + PAGE_SIZE));
		assert!(obj.get_page(2).is_err());
		assert!(obj.copy_page(0, &page).is_err());
	}
}
