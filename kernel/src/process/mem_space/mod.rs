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

//! Address spaces.
//!
//! An [`AddrSpace`] is an ordered set of non-overlapping segments plus the
//! architecture's page map. Segments reference VM objects; physical frames appear
//! lazily, when the page-fault resolver asks the object of the faulting segment for
//! the missing page.
//!
//! Copy-on-write works through shadow objects: cloning an address space (fork) wraps
//! every private segment's object in a pair of shadows and write-protects the
//! installed page-table entries, so the first write on either side faults and copies.

pub mod object;
pub mod segment;

use crate::{
	memory::{
		vmem::{CachePolicy, MapSize, Prot, VMem},
		VirtAddr,
	},
	sync::{IntSpin, OnceInit},
};
use alloc::{collections::BTreeMap, sync::Arc};
use core::num::NonZeroUsize;
use object::{Source, VmObject, VmPage};
use segment::{MapFlags, Segment};
use utils::{errno, errno::EResult, limits::PAGE_SIZE};

use crate::arch::paging::{KERNEL_SPLIT, USER_END};

/// The lowest address available to user mappings. Keeps the null page unmapped.
const USER_BEGIN: usize = 0x10000;

/// A virtual address space: ordered segments plus the arch page map.
pub struct AddrSpace {
	/// The segments, keyed by start address.
	state: IntSpin<BTreeMap<usize, Segment>>,
	/// The architecture's page map.
	vmem: IntSpin<VMem>,
	/// The first address mappings may use.
	limit_low: VirtAddr,
	/// The first address past the mappable range.
	limit_high: VirtAddr,
}

impl AddrSpace {
	/// Creates an empty user address space.
	pub fn new() -> EResult<Arc<Self>> {
		Ok(Arc::new(Self {
			state: IntSpin::new(BTreeMap::new()),
			vmem: IntSpin::new(VMem::new()?),
			limit_low: VirtAddr(USER_BEGIN),
			limit_high: VirtAddr(USER_END),
		}))
	}

	/// Returns the architecture page map.
	#[inline]
	pub fn vmem(&self) -> &IntSpin<VMem> {
		&self.vmem
	}

	/// Loads the address space on the current CPU.
	pub fn load(&self) {
		self.vmem.lock().bind();
	}

	/// Finds the lowest hole of at least `pages` pages, first-fit.
	fn find_hole(segments: &BTreeMap<usize, Segment>, low: usize, high: usize, pages: usize) -> Option<VirtAddr> {
		let len = pages * PAGE_SIZE;
		let mut candidate = low;
		for seg in segments.values() {
			if seg.end().0 <= candidate {
				continue;
			}
			if seg.start.0 >= candidate && seg.start.0 - candidate >= len {
				break;
			}
			candidate = seg.end().0;
		}
		(candidate + len <= high).then_some(VirtAddr(candidate))
	}

	/// Maps a range of `length` bytes.
	///
	/// Arguments:
	/// - `addr` is the requested address. With [`MapFlags::FIXED`] it is honored
	///   exactly, otherwise the lowest free hole is used
	/// - `prot` is the memory protection
	/// - `flags` select the mapping behavior; exactly one of `PRIVATE`/`SHARED` must
	///   be set
	/// - `obj` is the backing object. `None` (or the `ANON` flag without an object)
	///   creates a fresh anonymous object
	/// - `obj_off` is the byte offset of the mapping in the object; page-aligned
	///
	/// Physical memory is not allocated up front unless [`MapFlags::POPULATE`] is
	/// set.
	///
	/// Returns the first address of the new segment.
	pub fn map(
		&self,
		addr: VirtAddr,
		length: usize,
		prot: Prot,
		flags: MapFlags,
		obj: Option<Arc<VmObject>>,
		obj_off: u64,
	) -> EResult<VirtAddr> {
		let pages = NonZeroUsize::new(length.div_ceil(PAGE_SIZE)).ok_or(errno!(EINVAL))?;
		if flags.contains(MapFlags::PRIVATE) == flags.contains(MapFlags::SHARED) {
			return Err(errno!(EINVAL));
		}
		if obj_off % PAGE_SIZE as u64 != 0 {
			return Err(errno!(EINVAL));
		}
		let object = match obj {
			Some(obj) => obj,
			None => VmObject::new_anon((pages.get() * PAGE_SIZE) as u64),
		};
		let mut state = self.state.lock();
		let start = if flags.contains(MapFlags::FIXED) {
			if !addr.is_aligned_to(PAGE_SIZE) {
				return Err(errno!(EINVAL));
			}
			let end = addr.0.checked_add(pages.get() * PAGE_SIZE).ok_or(errno!(EINVAL))?;
			if addr < self.limit_low || end > self.limit_high.0 {
				return Err(errno!(EINVAL));
			}
			let overlaps = Self::range_overlaps(&state, addr, pages.get());
			if overlaps {
				if flags.contains(MapFlags::FIXED_NOREPLACE) {
					return Err(errno!(EEXIST));
				}
				// Replace overlapping segments in full
				self.unmap_locked(&mut state, addr, pages.get());
			}
			addr
		} else {
			Self::find_hole(&state, self.limit_low.0, self.limit_high.0, pages.get())
				.ok_or(errno!(ENOMEM))?
		};
		let seg = Segment {
			start,
			pages,
			prot,
			flags,
			object,
			object_off: obj_off / PAGE_SIZE as u64,
		};
		state.insert(start.0, seg);
		drop(state);
		if flags.contains(MapFlags::POPULATE) {
			for i in 0..pages.get() {
				self.page_fault(start + i * PAGE_SIZE, false)?;
			}
		}
		Ok(start)
	}

	/// Tells whether `[addr, addr + pages)` intersects an existing segment.
	fn range_overlaps(segments: &BTreeMap<usize, Segment>, addr: VirtAddr, pages: usize) -> bool {
		let end = addr.0 + pages * PAGE_SIZE;
		segments
			.values()
			.any(|seg| seg.start.0 < end && seg.end().0 > addr.0)
	}

	/// Unmap implementation, with the segment map already locked.
	fn unmap_locked(
		&self,
		state: &mut BTreeMap<usize, Segment>,
		addr: VirtAddr,
		pages: usize,
	) {
		let end = addr.0 + pages * PAGE_SIZE;
		// Collect the starts of affected segments first; the map cannot be mutated
		// while borrowed by the iteration
		let affected: alloc::vec::Vec<usize> = state
			.values()
			.filter(|seg| seg.start.0 < end && seg.end().0 > addr.0)
			.map(|seg| seg.start.0)
			.collect();
		for seg_start in affected {
			let seg = state.remove(&seg_start).unwrap();
			// Intersection with the range to unmap
			let lo = addr.0.max(seg.start.0);
			let hi = end.min(seg.end().0);
			// Drop the page-table entries of the intersection; this also drops the
			// frames' mapcount contributions
			{
				let mut vmem = self.vmem.lock();
				let mut page = lo;
				while page < hi {
					vmem.unmap(VirtAddr(page));
					page += PAGE_SIZE;
				}
			}
			let inner_off = (lo - seg.start.0) / PAGE_SIZE;
			let count = (hi - lo) / PAGE_SIZE;
			let (prev, next) = seg.split(inner_off, count);
			if let Some(p) = prev {
				state.insert(p.start.0, p);
			}
			if let Some(n) = next {
				state.insert(n.start.0, n);
			}
			// A fully removed segment drops its object reference here
		}
	}

	/// Unmaps `length` bytes starting at `addr`.
	///
	/// Segments partially covered are trimmed or split; fully covered ones are
	/// removed, releasing their object reference.
	pub fn unmap(&self, addr: VirtAddr, length: usize) -> EResult<()> {
		if !addr.is_aligned_to(PAGE_SIZE) {
			return Err(errno!(EINVAL));
		}
		let pages = NonZeroUsize::new(length.div_ceil(PAGE_SIZE)).ok_or(errno!(EINVAL))?;
		let mut state = self.state.lock();
		self.unmap_locked(&mut state, addr, pages.get());
		Ok(())
	}

	/// Returns a copy of the segment containing `addr`.
	pub fn segment_at(&self, addr: VirtAddr) -> Option<Segment> {
		let state = self.state.lock();
		state
			.range(..=addr.0)
			.next_back()
			.map(|(_, seg)| seg.clone())
			.filter(|seg| seg.contains(addr))
	}

	/// Returns the number of segments.
	pub fn segment_count(&self) -> usize {
		self.state.lock().len()
	}

	/// Checks the segment-ordering invariant: sorted by start, no overlaps.
	#[cfg(test)]
	pub(crate) fn assert_ordered(&self) {
		let state = self.state.lock();
		let mut prev_end = 0;
		for (start, seg) in state.iter() {
			assert_eq!(*start, seg.start.0);
			assert!(seg.start.0 >= prev_end, "overlapping segments");
			prev_end = seg.end().0;
		}
	}

	/// Resolves a page fault at `addr`.
	///
	/// `write` tells whether the faulting access was a write.
	///
	/// Returns `true` when the fault was resolved and the access may be retried;
	/// `false` when the access is invalid (no segment, or insufficient protection),
	/// in which case the caller terminates the thread or panics.
	pub fn page_fault(&self, addr: VirtAddr, write: bool) -> EResult<bool> {
		let page_addr = addr.down_align_to(PAGE_SIZE);
		// Find the segment, wrapping its object in a shadow first if this write
		// requires copy-on-write layering
		let seg = {
			let mut state = self.state.lock();
			let Some(seg) = state
				.range_mut(..=page_addr.0)
				.next_back()
				.map(|(_, s)| s)
				.filter(|s| s.contains(page_addr))
			else {
				return Ok(false);
			};
			// Check the access against the segment protection
			if write && !seg.prot.contains(Prot::WRITE) {
				return Ok(false);
			}
			if !write && !seg.prot.contains(Prot::READ) {
				return Ok(false);
			}
			let wrap = write
				&& seg.flags.contains(MapFlags::PRIVATE)
				&& !seg.object.is_shadow()
				&& seg.object.needs_cow();
			if wrap {
				seg.object = VmObject::new_shadow(seg.object.clone());
			}
			seg.clone()
		};
		let index = seg.object_index(page_addr);
		let private = seg.flags.contains(MapFlags::PRIVATE);
		// Fixed physical objects never allocate and never copy
		if let Source::Phys {
			..
		} = seg.object.source()
		{
			let page = seg.object.get_page(index)?;
			self.install(page_addr, &page, seg.prot)?;
			return Ok(true);
		}
		if write && private && seg.object.is_shadow() {
			// Write on a copy-on-write mapping
			let page = match seg.object.lookup_page(index) {
				// The page was already copied up: it is private, map it writable
				Some(frame) => VmPage::Frame(frame),
				None => {
					// Copy the parent's page up into the shadow
					let src = seg.object.get_page(index)?;
					let frame = seg.object.copy_page(index, &src)?;
					// Drop the old read-only mapping of the parent's page
					self.vmem.lock().unmap(page_addr);
					VmPage::Frame(frame)
				}
			};
			self.install(page_addr, &page, seg.prot)?;
			return Ok(true);
		}
		// Plain produce-and-map
		let page = seg.object.get_page(index)?;
		let mut prot = seg.prot;
		if private && seg.object.needs_cow() && seg.object.lookup_page(index).is_none() {
			// The page still belongs to a source shared with others: keep the entry
			// read-only so the first write faults into the copy path
			prot.remove(Prot::WRITE);
		}
		if write && seg.flags.contains(MapFlags::SHARED) {
			if let VmPage::Frame(frame) = &page {
				seg.object.mark_dirty(index, frame);
			}
		}
		self.install(page_addr, &page, prot)?;
		Ok(true)
	}

	/// Installs `page` at `addr` with the given protection.
	fn install(&self, addr: VirtAddr, page: &VmPage, prot: Prot) -> EResult<()> {
		let cache = match page {
			VmPage::Frame(_) => CachePolicy::WriteBack,
			// Fixed ranges are device memory
			VmPage::Fixed(_) => CachePolicy::Uncached,
		};
		self.vmem
			.lock()
			.map(addr, page.phys_addr(), MapSize::Normal, prot, cache)?;
		Ok(())
	}

	/// Clones the address space for `fork`.
	///
	/// Shared segments keep pointing at the same object. Private segments are
	/// re-pointed, on both sides, at fresh shadows whose parent is the old object;
	/// the already-installed entries are write-protected now so the next write on
	/// either side takes the copy-on-write path.
	pub fn fork(&self) -> EResult<Arc<Self>> {
		let new_space = Self::new()?;
		let mut state = self.state.lock();
		let mut new_state = new_space.state.lock();
		let mut vmem = self.vmem.lock();
		for seg in state.values_mut() {
			let mut child_seg = seg.clone();
			if seg.flags.contains(MapFlags::PRIVATE) {
				let parent_obj = seg.object.clone();
				seg.object = VmObject::new_shadow(parent_obj.clone());
				child_seg.object = VmObject::new_shadow(parent_obj);
				// Write-protect what is currently installed; reads keep working,
				// writes fault and copy
				for i in 0..seg.pages.get() {
					let page_addr = seg.start + i * PAGE_SIZE;
					if vmem.translate(page_addr).is_some() {
						let mut prot = seg.prot;
						prot.remove(Prot::WRITE);
						vmem.protect(page_addr, prot);
					}
				}
			}
			// The child's page map starts empty: its entries appear on demand
			new_state.insert(child_seg.start.0, child_seg);
		}
		drop(new_state);
		Ok(new_space)
	}
}

impl Drop for AddrSpace {
	fn drop(&mut self) {
		// Drop every installed entry so the frames' mapcounts fall to zero before
		// the objects release them
		let mut state = self.state.lock();
		let mut vmem = self.vmem.lock();
		for seg in state.values() {
			for i in 0..seg.pages.get() {
				vmem.unmap(seg.start + i * PAGE_SIZE);
			}
		}
		state.clear();
	}
}

/// The kernel's address space.
static KERNEL_SPACE: OnceInit<Arc<AddrSpace>> = unsafe { OnceInit::new() };

/// Initializes the kernel address space.
pub(crate) fn init() -> EResult<()> {
	let space = Arc::new(AddrSpace {
		state: IntSpin::new(BTreeMap::new()),
		vmem: IntSpin::new(unsafe {
			VMem::from_root(crate::memory::vmem::kernel_root())
		}),
		limit_low: VirtAddr(KERNEL_SPLIT),
		limit_high: VirtAddr(usize::MAX),
	});
	unsafe {
		OnceInit::init(&KERNEL_SPACE, space);
	}
	Ok(())
}

/// Returns the kernel's address space.
pub fn kernel_space() -> &'static Arc<AddrSpace> {
	&KERNEL_SPACE
}

/// Entry point of the architecture's page-fault path.
///
/// Resolves the fault against the current process's address space. Returns `false`
/// when the fault could not be resolved.
pub fn page_fault(addr: VirtAddr, write: bool) -> bool {
	let Some(proc) = crate::process::current_process() else {
		return false;
	};
	proc.addr_space.page_fault(addr, write).unwrap_or(false)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		file::vfs,
		file::vfs::node::VnodeType,
		memory::buddy,
		test_utils,
	};

	/// Reads one byte of `space` at `addr` the way the kernel would after a resolved
	/// fault: through the page tables and the HHDM.
	fn read_byte(space: &AddrSpace, addr: VirtAddr) -> u8 {
		assert!(space.page_fault(addr, false).unwrap());
		let phys = space.vmem().lock().virt_to_phys(addr).unwrap();
		unsafe { *phys.to_virtual().as_ptr::<u8>() }
	}

	/// Writes one byte to `space` at `addr` through a resolved write fault.
	fn write_byte(space: &AddrSpace, addr: VirtAddr, val: u8) {
		assert!(space.page_fault(addr, true).unwrap());
		let vmem = space.vmem().lock();
		assert_eq!(vmem.is_writable(addr.down_align_to(PAGE_SIZE)), Some(true));
		let phys = vmem.virt_to_phys(addr).unwrap();
		unsafe {
			*phys.to_virtual().as_ptr::<u8>() = val;
		}
	}

	#[test]
	fn anon_demand_paging() {
		test_utils::init_kernel();
		let space = AddrSpace::new().unwrap();
		let addr = space
			.map(
				VirtAddr::default(),
				2 * PAGE_SIZE,
				Prot::RW,
				MapFlags::PRIVATE | MapFlags::ANON,
				None,
				0,
			)
			.unwrap();
		// Nothing is present before the first access
		assert!(space.vmem().lock().translate(addr).is_none());
		assert_eq!(read_byte(&space, addr), 0);
		write_byte(&space, addr, 0xef);
		assert_eq!(read_byte(&space, addr), 0xef);
		// Only the touched page was allocated
		assert!(space.vmem().lock().translate(addr + PAGE_SIZE).is_none());
		// Unmapping drops the PTE reference; the object still owns the frame
		let phys = space.vmem().lock().virt_to_phys(addr).unwrap();
		let page = buddy::phys_to_page(phys).unwrap();
		assert_eq!(page.map_count(), 1);
		space.unmap(addr, 2 * PAGE_SIZE).unwrap();
		assert_eq!(page.map_count(), 0);
	}

	#[test]
	fn segments_stay_ordered() {
		test_utils::init_kernel();
		let space = AddrSpace::new().unwrap();
		let a = space
			.map(
				VirtAddr::default(),
				4 * PAGE_SIZE,
				Prot::RW,
				MapFlags::PRIVATE | MapFlags::ANON,
				None,
				0,
			)
			.unwrap();
		space
			.map(
				VirtAddr::default(),
				PAGE_SIZE,
				Prot::READ,
				MapFlags::PRIVATE | MapFlags::ANON,
				None,
				0,
			)
			.unwrap();
		space.assert_ordered();
		// Punch a hole in the middle of the first segment
		space.unmap(a + PAGE_SIZE, PAGE_SIZE).unwrap();
		space.assert_ordered();
		assert!(space.segment_at(a).is_some());
		assert!(space.segment_at(a + PAGE_SIZE).is_none());
		assert!(space.segment_at(a + 2 * PAGE_SIZE).is_some());
		// The hole is reusable
		let b = space
			.map(
				a + PAGE_SIZE,
				PAGE_SIZE,
				Prot::RW,
				MapFlags::PRIVATE | MapFlags::ANON | MapFlags::FIXED,
				None,
				0,
			)
			.unwrap();
		assert_eq!(b, a + PAGE_SIZE);
		space.assert_ordered();
	}

	#[test]
	fn fixed_noreplace() {
		test_utils::init_kernel();
		let space = AddrSpace::new().unwrap();
		let addr = space
			.map(
				VirtAddr::default(),
				PAGE_SIZE,
				Prot::RW,
				MapFlags::PRIVATE | MapFlags::ANON,
				None,
				0,
			)
			.unwrap();
		let res = space.map(
			addr,
			PAGE_SIZE,
			Prot::RW,
			MapFlags::PRIVATE | MapFlags::ANON | MapFlags::FIXED | MapFlags::FIXED_NOREPLACE,
			None,
			0,
		);
		assert_eq!(res.unwrap_err(), errno!(EEXIST));
		// Without NOREPLACE the overlap is replaced in full
		let replaced = space
			.map(
				addr,
				PAGE_SIZE,
				Prot::READ,
				MapFlags::PRIVATE | MapFlags::ANON | MapFlags::FIXED,
				None,
				0,
			)
			.unwrap();
		assert_eq!(replaced, addr);
		assert_eq!(space.segment_at(addr).unwrap().prot, Prot::READ);
	}

	#[test]
	fn fault_checks_protection() {
		test_utils::init_kernel();
		let space = AddrSpace::new().unwrap();
		let addr = space
			.map(
				VirtAddr::default(),
				PAGE_SIZE,
				Prot::READ,
				MapFlags::PRIVATE | MapFlags::ANON,
				None,
				0,
			)
			.unwrap();
		// Write to a read-only private mapping is refused outright
		assert!(!space.page_fault(addr, true).unwrap());
		assert!(space.page_fault(addr, false).unwrap());
		// No segment at all
		assert!(!space.page_fault(VirtAddr(0x1000), false).unwrap());
	}

	#[test]
	fn cow_on_fork() {
		test_utils::init_kernel();
		let parent = AddrSpace::new().unwrap();
		let addr = parent
			.map(
				VirtAddr::default(),
				PAGE_SIZE,
				Prot::RW,
				MapFlags::PRIVATE | MapFlags::ANON,
				None,
				0,
			)
			.unwrap();
		write_byte(&parent, addr, 0xaa);
		let child = parent.fork().unwrap();
		// After the fork, the parent's entry is write-protected
		assert_eq!(
			parent.vmem().lock().is_writable(addr),
			Some(false),
		);
		// The child reads the parent's data through the shadow chain
		assert_eq!(read_byte(&child, addr), 0xaa);
		let parent_phys = parent.vmem().lock().virt_to_phys(addr).unwrap();
		// Child writes: gets its own frame, parent's data is untouched
		write_byte(&child, addr, 0xbb);
		let child_phys = child.vmem().lock().virt_to_phys(addr).unwrap();
		assert_ne!(parent_phys, child_phys);
		assert_eq!(read_byte(&child, addr), 0xbb);
		assert_eq!(read_byte(&parent, addr), 0xaa);
		// And symmetrically for the parent
		write_byte(&parent, addr, 0xcc);
		assert_eq!(read_byte(&parent, addr), 0xcc);
		assert_eq!(read_byte(&child, addr), 0xbb);
	}

	#[test]
	fn mapcount_tracks_ptes() {
		test_utils::init_kernel();
		let parent = AddrSpace::new().unwrap();
		let addr = parent
			.map(
				VirtAddr::default(),
				PAGE_SIZE,
				Prot::RW,
				MapFlags::PRIVATE | MapFlags::ANON,
				None,
				0,
			)
			.unwrap();
		write_byte(&parent, addr, 1);
		let phys = parent.vmem().lock().virt_to_phys(addr).unwrap();
		let page = buddy::phys_to_page(phys).unwrap();
		assert_eq!(page.map_count(), 1);
		// The child mapping the same frame read-only bumps the count
		let child = parent.fork().unwrap();
		assert_eq!(read_byte(&child, addr), 1);
		assert_eq!(page.map_count(), 2);
		// Child copy-up replaces its entry: back to one
		write_byte(&child, addr, 2);
		assert_eq!(page.map_count(), 1);
		drop(child);
		drop(parent);
		assert_eq!(page.map_count(), 0);
	}

	#[test]
	fn shared_anon_is_shared() {
		test_utils::init_kernel();
		let a = AddrSpace::new().unwrap();
		let addr = a
			.map(
				VirtAddr::default(),
				PAGE_SIZE,
				Prot::RW,
				MapFlags::SHARED | MapFlags::ANON,
				None,
				0,
			)
			.unwrap();
		write_byte(&a, addr, 0x42);
		let b = a.fork().unwrap();
		// Shared mappings reference the same object and the same frames
		assert_eq!(read_byte(&b, addr), 0x42);
		write_byte(&b, addr, 0x43);
		assert_eq!(read_byte(&a, addr), 0x43);
	}

	#[test]
	fn file_mapping() {
		test_utils::init_kernel();
		let vn = vfs::create(b"/mmap_f", VnodeType::Regular).unwrap();
		let mut content = alloc::vec![0u8; PAGE_SIZE];
		for (i, b) in content.iter_mut().enumerate() {
			*b = b"ABCD"[i % 4];
		}
		vfs::write(&vn, &content, 0).unwrap();
		let space = AddrSpace::new().unwrap();
		let obj = VmObject::new_vnode(vn.clone(), 0, 2 * PAGE_SIZE as u64);
		let addr = space
			.map(
				VirtAddr::default(),
				2 * PAGE_SIZE,
				Prot::READ,
				MapFlags::SHARED,
				Some(obj),
				0,
			)
			.unwrap();
		assert_eq!(read_byte(&space, addr), b'A');
		assert_eq!(read_byte(&space, addr + 1), b'B');
		// The second page is past the end of the file: the access faults for real
		assert!(!space.page_fault(addr + PAGE_SIZE + 4, false).unwrap_or(false));
	}

	#[test]
	fn private_file_mapping_cow() {
		test_utils::init_kernel();
		let vn = vfs::create(b"/mmap_priv", VnodeType::Regular).unwrap();
		vfs::write(&vn, b"orig", 0).unwrap();
		let space = AddrSpace::new().unwrap();
		let obj = VmObject::new_vnode(vn.clone(), 0, PAGE_SIZE as u64);
		let addr = space
			.map(
				VirtAddr::default(),
				PAGE_SIZE,
				Prot::RW,
				MapFlags::PRIVATE,
				Some(obj),
				0,
			)
			.unwrap();
		assert_eq!(read_byte(&space, addr), b'o');
		// Writing wraps the object in a shadow and copies the page up
		write_byte(&space, addr, b'X');
		assert_eq!(read_byte(&space, addr), b'X');
		assert!(space.segment_at(addr).unwrap().object.is_shadow());
		// The file itself is untouched
		let mut buf = [0u8; 4];
		vfs::read(&vn, &mut buf, 0).unwrap();
		assert_eq!(&buf, b"orig");
	}
}
