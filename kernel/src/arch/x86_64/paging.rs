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

//! x86_64 four-level paging.
//!
//! The table walk itself is plain memory manipulation through the HHDM and works on any
//! target, which is how the virtual memory tests run hosted. Only `bind` and TLB
//! maintenance touch the hardware.
//!
//! Bookkeeping rules:
//! - The `mapcount` of the [`Page`] backing a table counts the present entries of that
//!   table. The unmap walk frees any intermediate table whose count drops to zero,
//!   never the root.
//! - The `mapcount` of a mapped frame counts the PTEs referencing it. Only 4 KiB
//!   mappings of managed RAM participate; larger granules serve the HHDM and MMIO,
//!   which the frame allocator does not manage.

use crate::memory::{
	buddy,
	vmem::{CachePolicy, MapSize, Prot},
	PhysAddr, VirtAddr,
};
use core::alloc::AllocError;
use utils::errno::AllocResult;

/// The first address of the kernel half of the address space.
pub const KERNEL_SPLIT: usize = 0xffff_8000_0000_0000;
/// The first address past the canonical user half.
pub const USER_END: usize = 0x0000_8000_0000_0000;

/// The number of entries per table.
const ENTRIES: usize = 512;
/// Index of the first kernel-half entry in the root table.
const KERNEL_HALF_START: usize = ENTRIES / 2;

/// Entry flag: present.
const FLAG_PRESENT: u64 = 1 << 0;
/// Entry flag: writable.
const FLAG_WRITE: u64 = 1 << 1;
/// Entry flag: accessible from ring 3.
const FLAG_USER: u64 = 1 << 2;
/// Entry flag: write-through caching.
const FLAG_WRITE_THROUGH: u64 = 1 << 3;
/// Entry flag: cache disabled.
const FLAG_CACHE_DISABLE: u64 = 1 << 4;
/// Entry flag: the entry is a large/huge leaf instead of a table pointer.
const FLAG_PAGE_SIZE: u64 = 1 << 7;
/// Entry flag: execute disable.
const FLAG_XD: u64 = 1 << 63;

/// Mask of the physical address in an entry.
const ADDR_MASK: u64 = 0x000f_ffff_ffff_f000;

/// A page table.
type Table = [u64; ENTRIES];

/// Returns a mutable reference to the table at the given physical address.
///
/// # Safety
///
/// The caller must ensure `phys` points to a page table and that accesses are
/// serialized.
unsafe fn table_mut(phys: PhysAddr) -> &'static mut Table {
	&mut *phys.to_virtual().as_ptr::<Table>()
}

/// Returns the slot covering `virt` in tables of the given `level`.
///
/// Level `3` is the root, level `0` the last level.
#[inline]
fn slot(virt: VirtAddr, level: usize) -> usize {
	(virt.0 >> (12 + 9 * level)) & (ENTRIES - 1)
}

/// The table level at which a mapping of the given size terminates.
#[inline]
fn leaf_level(size: MapSize) -> usize {
	match size {
		MapSize::Normal => 0,
		MapSize::Large => 1,
		MapSize::Huge => 2,
	}
}

/// Builds the flags of a leaf entry.
fn leaf_flags(prot: Prot, cache: CachePolicy, user: bool) -> u64 {
	let mut flags = FLAG_PRESENT;
	if prot.contains(Prot::WRITE) {
		flags |= FLAG_WRITE;
	}
	if !prot.contains(Prot::EXEC) {
		flags |= FLAG_XD;
	}
	if user {
		flags |= FLAG_USER;
	}
	// The PAT stays at its power-on configuration, under which these two bits select
	// the standard cache modes
	match cache {
		CachePolicy::WriteBack => {}
		CachePolicy::WriteThrough => flags |= FLAG_WRITE_THROUGH,
		CachePolicy::WriteCombine => flags |= FLAG_WRITE_THROUGH | FLAG_CACHE_DISABLE,
		CachePolicy::Uncached => flags |= FLAG_CACHE_DISABLE,
	}
	flags
}

/// Increments the present-entry count of the table at `table`.
fn table_entry_added(table: PhysAddr) {
	if let Some(page) = buddy::phys_to_page(table) {
		page.inc_map_count();
	}
}

/// Decrements the present-entry count of the table at `table`, returning the new count.
fn table_entry_removed(table: PhysAddr) -> u32 {
	match buddy::phys_to_page(table) {
		Some(page) => page.dec_map_count(),
		// A table outside of managed memory is never reclaimed
		None => u32::MAX,
	}
}

/// Drops the mapcount contribution of the leaf entry `ent` at `level`.
fn release_leaf(ent: u64, level: usize) {
	if level == 0 {
		if let Some(page) = buddy::phys_to_page(PhysAddr((ent & ADDR_MASK) as usize)) {
			page.dec_map_count();
		}
	}
}

/// Allocates a zeroed page table.
fn alloc_table() -> AllocResult<PhysAddr> {
	let page = buddy::alloc(0)?;
	let addr = page.phys_addr();
	unsafe {
		table_mut(addr).fill(0);
	}
	Ok(addr)
}

/// Allocates a zeroed root table.
pub(crate) fn alloc_root() -> AllocResult<PhysAddr> {
	alloc_table()
}

/// Copies the kernel-half entries of the root table `src` into `dst`.
///
/// The kernel half is shared: the copied entries point to the same subtrees.
///
/// # Safety
///
/// Both addresses must point to root tables.
pub(crate) unsafe fn copy_kernel_half(dst: PhysAddr, src: PhysAddr) {
	let src = table_mut(src);
	let dst = table_mut(dst);
	dst[KERNEL_HALF_START..].copy_from_slice(&src[KERNEL_HALF_START..]);
}

/// Maps the physical page(s) at `phys` to `virt` in the context rooted at `root`.
///
/// Missing intermediate tables are allocated. An existing mapping at `virt` is
/// replaced.
///
/// # Safety
///
/// The caller must serialize accesses to the context and invalidate the TLB afterwards.
pub(crate) unsafe fn map(
	root: PhysAddr,
	virt: VirtAddr,
	phys: PhysAddr,
	size: MapSize,
	prot: Prot,
	cache: CachePolicy,
) -> AllocResult<()> {
	debug_assert!(virt.is_aligned_to(size.bytes()));
	debug_assert!(phys.is_aligned_to(size.bytes()));
	// The user bit is derived from the targeted half of the address space
	let user = virt.0 < KERNEL_SPLIT;
	let leaf = leaf_level(size);
	let mut table = root;
	for level in ((leaf + 1)..=3).rev() {
		let ent = &mut table_mut(table)[slot(virt, level)];
		if *ent & FLAG_PRESENT == 0 {
			let new = alloc_table()?;
			*ent = new.0 as u64 | FLAG_PRESENT | FLAG_WRITE | if user { FLAG_USER } else { 0 };
			table_entry_added(table);
		} else if *ent & FLAG_PAGE_SIZE != 0 {
			// A larger mapping is in the way. Splitting is not supported
			return Err(AllocError);
		}
		table = PhysAddr((*ent & ADDR_MASK) as usize);
	}
	let ent = &mut table_mut(table)[slot(virt, leaf)];
	if *ent & FLAG_PRESENT != 0 {
		// Replacing: the entry count of the table is unchanged
		release_leaf(*ent, leaf);
	} else {
		table_entry_added(table);
	}
	let ps = if leaf > 0 { FLAG_PAGE_SIZE } else { 0 };
	*ent = phys.0 as u64 | leaf_flags(prot, cache, user) | ps;
	if leaf == 0 {
		if let Some(page) = buddy::phys_to_page(phys) {
			page.inc_map_count();
		}
	}
	Ok(())
}

/// Unmaps the page at `virt`, freeing intermediate tables that become empty.
///
/// Returns the physical address and granule of the removed mapping, if any.
///
/// # Safety
///
/// The caller must serialize accesses to the context.
pub(crate) unsafe fn unmap(root: PhysAddr, virt: VirtAddr) -> Option<(PhysAddr, MapSize)> {
	// Tables on the path from the root, paired with the slot taken in each
	let mut path = [(PhysAddr::default(), 0usize); 4];
	let mut table = root;
	let mut level = 3;
	let (leaf_ent, size) = loop {
		let s = slot(virt, level);
		path[level] = (table, s);
		let ent = table_mut(table)[s];
		if ent & FLAG_PRESENT == 0 {
			return None;
		}
		if level == 0 {
			break (ent, MapSize::Normal);
		}
		if ent & FLAG_PAGE_SIZE != 0 {
			let size = match level {
				1 => MapSize::Large,
				2 => MapSize::Huge,
				_ => return None,
			};
			break (ent, size);
		}
		table = PhysAddr((ent & ADDR_MASK) as usize);
		level -= 1;
	};
	// Clear the leaf
	let (leaf_table, leaf_slot) = path[level];
	table_mut(leaf_table)[leaf_slot] = 0;
	release_leaf(leaf_ent, level);
	let mut remaining = table_entry_removed(leaf_table);
	// Ascend, freeing now-empty intermediate tables. The root is never freed
	while level < 3 && remaining == 0 {
		let (parent, parent_slot) = path[level + 1];
		let freed = path[level].0;
		table_mut(parent)[parent_slot] = 0;
		buddy::free(buddy::phys_to_page(freed).unwrap());
		remaining = table_entry_removed(parent);
		level += 1;
	}
	invlpg(virt);
	Some((PhysAddr((leaf_ent & ADDR_MASK) as usize), size))
}

/// Rewrites the protection of the mapping covering `virt`.
///
/// Returns `false` if no mapping covers the address.
///
/// # Safety
///
/// The caller must serialize accesses to the context.
pub(crate) unsafe fn protect(root: PhysAddr, virt: VirtAddr, prot: Prot) -> bool {
	let user = virt.0 < KERNEL_SPLIT;
	let mut table = root;
	let mut level = 3;
	loop {
		let ent = &mut table_mut(table)[slot(virt, level)];
		if *ent & FLAG_PRESENT == 0 {
			return false;
		}
		if level == 0 || *ent & FLAG_PAGE_SIZE != 0 {
			let keep = *ent & (ADDR_MASK | FLAG_PAGE_SIZE | FLAG_WRITE_THROUGH | FLAG_CACHE_DISABLE);
			let flags = leaf_flags(prot, CachePolicy::WriteBack, user)
				& !(FLAG_WRITE_THROUGH | FLAG_CACHE_DISABLE);
			*ent = keep | flags;
			invlpg(virt);
			return true;
		}
		table = PhysAddr((*ent & ADDR_MASK) as usize);
		level -= 1;
	}
}

/// Translates `virt` into the physical address and granule of its mapping.
pub(crate) fn translate(root: PhysAddr, virt: VirtAddr) -> Option<(PhysAddr, MapSize)> {
	let mut table = root;
	let mut level = 3;
	loop {
		let ent = unsafe { table_mut(table) }[slot(virt, level)];
		if ent & FLAG_PRESENT == 0 {
			return None;
		}
		if level == 0 {
			return Some((PhysAddr((ent & ADDR_MASK) as usize), MapSize::Normal));
		}
		if ent & FLAG_PAGE_SIZE != 0 {
			let size = match level {
				1 => MapSize::Large,
				2 => MapSize::Huge,
				_ => return None,
			};
			return Some((PhysAddr((ent & ADDR_MASK) as usize), size));
		}
		table = PhysAddr((ent & ADDR_MASK) as usize);
		level -= 1;
	}
}

/// Tells whether the mapping covering `virt` is writable.
pub(crate) fn is_writable(root: PhysAddr, virt: VirtAddr) -> Option<bool> {
	let mut table = root;
	let mut level = 3;
	loop {
		let ent = unsafe { table_mut(table) }[slot(virt, level)];
		if ent & FLAG_PRESENT == 0 {
			return None;
		}
		if level == 0 || ent & FLAG_PAGE_SIZE != 0 {
			return Some(ent & FLAG_WRITE != 0);
		}
		table = PhysAddr((ent & ADDR_MASK) as usize);
		level -= 1;
	}
}

/// Frees the subtree rooted at `table`, dropping the mapcount of remaining leaves.
unsafe fn free_subtree(table: PhysAddr, level: usize) {
	let t = table_mut(table);
	for ent in t.iter_mut() {
		if *ent & FLAG_PRESENT == 0 {
			continue;
		}
		if level > 0 && *ent & FLAG_PAGE_SIZE == 0 {
			free_subtree(PhysAddr((*ent & ADDR_MASK) as usize), level - 1);
		} else {
			release_leaf(*ent, level);
		}
		*ent = 0;
		table_entry_removed(table);
	}
	buddy::free(buddy::phys_to_page(table).unwrap());
}

/// Frees the user half of the context rooted at `root`, then the root itself.
///
/// The kernel half is shared with every other context and is left untouched.
///
/// # Safety
///
/// The context must not be bound on any CPU.
pub(crate) unsafe fn free_user(root: PhysAddr) {
	let t = table_mut(root);
	for ent in t[..KERNEL_HALF_START].iter_mut() {
		if *ent & FLAG_PRESENT != 0 {
			free_subtree(PhysAddr((*ent & ADDR_MASK) as usize), 2);
			*ent = 0;
			table_entry_removed(root);
		}
	}
	// The kernel-half entries are borrowed, not owned: drop the counts without
	// touching the subtrees
	if let Some(page) = buddy::phys_to_page(root) {
		page.reset_map_count();
	}
	buddy::free(buddy::phys_to_page(root).unwrap());
}

/// Binds the context rooted at `root` on the current CPU.
///
/// # Safety
///
/// The context must keep the kernel mapped.
pub(crate) unsafe fn bind(root: PhysAddr) {
	#[cfg(target_os = "none")]
	core::arch::asm!("mov cr3, {}", in(reg) root.0);
	#[cfg(not(target_os = "none"))]
	let _ = root;
}

/// Tells whether the context rooted at `root` is bound on the current CPU.
pub(crate) fn is_bound(root: PhysAddr) -> bool {
	#[cfg(target_os = "none")]
	{
		let cr3: usize;
		unsafe {
			core::arch::asm!("mov {}, cr3", out(reg) cr3);
		}
		cr3 == root.0
	}
	#[cfg(not(target_os = "none"))]
	{
		let _ = root;
		false
	}
}

/// Invalidates the TLB entry of the page at `virt` on the current CPU.
#[inline]
pub(crate) fn invlpg(virt: VirtAddr) {
	#[cfg(target_os = "none")]
	unsafe {
		core::arch::asm!("invlpg [{}]", in(reg) virt.0);
	}
	#[cfg(not(target_os = "none"))]
	let _ = virt;
}
