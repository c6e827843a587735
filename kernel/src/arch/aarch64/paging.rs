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

//! AArch64 VMSAv8-A translation tables, 4 KiB granule, 48-bit virtual addresses.
//!
//! The lower half of the address space goes through the per-context root loaded in
//! `TTBR0_EL1`. The kernel half is a single set of tables loaded once in `TTBR1_EL1`
//! and shared by every context, so "copying the kernel half" is a no-op here.
//!
//! MAIR_EL1 is programmed by the boot glue with the attribute indices used below.
//!
//! Bookkeeping rules are the same as on x86_64: the mapcount of a table's backing page
//! counts its present entries, the mapcount of a mapped frame counts the 4 KiB PTEs
//! referencing it.

use crate::memory::{
	buddy,
	vmem::{CachePolicy, MapSize, Prot},
	PhysAddr, VirtAddr,
};
use core::alloc::AllocError;
use utils::errno::AllocResult;

/// The first address of the kernel half of the address space.
pub const KERNEL_SPLIT: usize = 0xffff_0000_0000_0000;
/// The first address past the user half (48-bit virtual addresses).
pub const USER_END: usize = 0x0001_0000_0000_0000;

/// The number of entries per table.
const ENTRIES: usize = 512;

/// Descriptor flag: valid.
const DESC_VALID: u64 = 1 << 0;
/// Descriptor flag: table pointer (levels above the last) or page (last level).
const DESC_TABLE: u64 = 1 << 1;
/// Descriptor flag: access flag.
const DESC_AF: u64 = 1 << 10;
/// Descriptor flag: inner shareable.
const DESC_INNER_SH: u64 = 3 << 8;
/// Descriptor flag: accessible from EL0.
const DESC_AP_EL0: u64 = 1 << 6;
/// Descriptor flag: read-only.
const DESC_AP_RO: u64 = 1 << 7;
/// Descriptor flag: unprivileged execute never.
const DESC_UXN: u64 = 1 << 54;
/// Descriptor flag: privileged execute never.
const DESC_PXN: u64 = 1 << 53;

/// MAIR index: normal memory, write-back.
const ATTR_NORMAL: u64 = 0 << 2;
/// MAIR index: device memory, nGnRnE.
const ATTR_DEVICE: u64 = 1 << 2;
/// MAIR index: normal memory, non-cacheable.
const ATTR_NORMAL_NC: u64 = 2 << 2;
/// MAIR index: normal memory, write-through.
const ATTR_NORMAL_WT: u64 = 3 << 2;

/// Mask of the physical address in a descriptor.
const ADDR_MASK: u64 = 0x0000_ffff_ffff_f000;

/// A translation table.
type Table = [u64; ENTRIES];

unsafe fn table_mut(phys: PhysAddr) -> &'static mut Table {
	&mut *phys.to_virtual().as_ptr::<Table>()
}

/// Returns the slot covering `virt` in tables of the given `level`.
///
/// Level `3` is the root, level `0` the last level. Only the low 48 bits of the
/// address take part in the walk.
#[inline]
fn slot(virt: VirtAddr, level: usize) -> usize {
	((virt.0 & 0x0000_ffff_ffff_ffff) >> (12 + 9 * level)) & (ENTRIES - 1)
}

#[inline]
fn leaf_level(size: MapSize) -> usize {
	match size {
		MapSize::Normal => 0,
		MapSize::Large => 1,
		MapSize::Huge => 2,
	}
}

/// Builds the attributes of a leaf descriptor.
fn leaf_flags(prot: Prot, cache: CachePolicy, user: bool) -> u64 {
	let mut flags = DESC_VALID | DESC_AF | DESC_INNER_SH;
	if !prot.contains(Prot::WRITE) {
		flags |= DESC_AP_RO;
	}
	if user {
		flags |= DESC_AP_EL0 | DESC_PXN;
		if !prot.contains(Prot::EXEC) {
			flags |= DESC_UXN;
		}
	} else {
		flags |= DESC_UXN;
		if !prot.contains(Prot::EXEC) {
			flags |= DESC_PXN;
		}
	}
	flags |= match cache {
		CachePolicy::WriteBack => ATTR_NORMAL,
		CachePolicy::WriteThrough => ATTR_NORMAL_WT,
		CachePolicy::WriteCombine => ATTR_NORMAL_NC,
		CachePolicy::Uncached => ATTR_DEVICE,
	};
	flags
}

fn table_entry_added(table: PhysAddr) {
	if let Some(page) = buddy::phys_to_page(table) {
		page.inc_map_count();
	}
}

fn table_entry_removed(table: PhysAddr) -> u32 {
	match buddy::phys_to_page(table) {
		Some(page) => page.dec_map_count(),
		None => u32::MAX,
	}
}

fn release_leaf(ent: u64, level: usize) {
	if level == 0 {
		if let Some(page) = buddy::phys_to_page(PhysAddr((ent & ADDR_MASK) as usize)) {
			page.dec_map_count();
		}
	}
}

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

/// The kernel half lives in `TTBR1_EL1` and is global: nothing to copy.
pub(crate) unsafe fn copy_kernel_half(_dst: PhysAddr, _src: PhysAddr) {}

/// Maps the physical page(s) at `phys` to `virt` in the context rooted at `root`.
///
/// # Safety
///
/// The caller must serialize accesses to the context.
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
	let user = virt.0 < KERNEL_SPLIT;
	let leaf = leaf_level(size);
	let mut table = root;
	for level in ((leaf + 1)..=3).rev() {
		let ent = &mut table_mut(table)[slot(virt, level)];
		if *ent & DESC_VALID == 0 {
			let new = alloc_table()?;
			*ent = new.0 as u64 | DESC_VALID | DESC_TABLE;
			table_entry_added(table);
		} else if *ent & DESC_TABLE == 0 {
			// A block mapping is in the way. Splitting is not supported
			return Err(AllocError);
		}
		table = PhysAddr((*ent & ADDR_MASK) as usize);
	}
	let ent = &mut table_mut(table)[slot(virt, leaf)];
	if *ent & DESC_VALID != 0 {
		release_leaf(*ent, leaf);
	} else {
		table_entry_added(table);
	}
	// At the last level the descriptor type is "page", above it is "block"
	let kind = if leaf == 0 { DESC_TABLE } else { 0 };
	*ent = phys.0 as u64 | leaf_flags(prot, cache, user) | kind;
	if leaf == 0 {
		if let Some(page) = buddy::phys_to_page(phys) {
			page.inc_map_count();
		}
	}
	Ok(())
}

/// Tells whether the descriptor `ent` at `level` is a leaf.
#[inline]
fn is_leaf(ent: u64, level: usize) -> bool {
	level == 0 || ent & DESC_TABLE == 0
}

/// Unmaps the page at `virt`, freeing intermediate tables that become empty.
///
/// # Safety
///
/// The caller must serialize accesses to the context.
pub(crate) unsafe fn unmap(root: PhysAddr, virt: VirtAddr) -> Option<(PhysAddr, MapSize)> {
	let mut path = [(PhysAddr::default(), 0usize); 4];
	let mut table = root;
	let mut level = 3;
	let (leaf_ent, size) = loop {
		let s = slot(virt, level);
		path[level] = (table, s);
		let ent = table_mut(table)[s];
		if ent & DESC_VALID == 0 {
			return None;
		}
		if is_leaf(ent, level) {
			let size = match level {
				0 => MapSize::Normal,
				1 => MapSize::Large,
				2 => MapSize::Huge,
				_ => return None,
			};
			break (ent, size);
		}
		table = PhysAddr((ent & ADDR_MASK) as usize);
		level -= 1;
	};
	let (leaf_table, leaf_slot) = path[level];
	table_mut(leaf_table)[leaf_slot] = 0;
	release_leaf(leaf_ent, level);
	let mut remaining = table_entry_removed(leaf_table);
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
/// # Safety
///
/// The caller must serialize accesses to the context.
pub(crate) unsafe fn protect(root: PhysAddr, virt: VirtAddr, prot: Prot) -> bool {
	let user = virt.0 < KERNEL_SPLIT;
	let mut table = root;
	let mut level = 3;
	loop {
		let ent = &mut table_mut(table)[slot(virt, level)];
		if *ent & DESC_VALID == 0 {
			return false;
		}
		if is_leaf(*ent, level) {
			let keep = *ent & (ADDR_MASK | DESC_TABLE | (3 << 2));
			let flags = leaf_flags(prot, CachePolicy::WriteBack, user) & !(3 << 2);
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
		if ent & DESC_VALID == 0 {
			return None;
		}
		if is_leaf(ent, level) {
			let size = match level {
				0 => MapSize::Normal,
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
		if ent & DESC_VALID == 0 {
			return None;
		}
		if is_leaf(ent, level) {
			return Some(ent & DESC_AP_RO == 0);
		}
		table = PhysAddr((ent & ADDR_MASK) as usize);
		level -= 1;
	}
}

unsafe fn free_subtree(table: PhysAddr, level: usize) {
	let t = table_mut(table);
	for ent in t.iter_mut() {
		if *ent & DESC_VALID == 0 {
			continue;
		}
		if !is_leaf(*ent, level) {
			free_subtree(PhysAddr((*ent & ADDR_MASK) as usize), level - 1);
		} else {
			release_leaf(*ent, level);
		}
		*ent = 0;
		table_entry_removed(table);
	}
	buddy::free(buddy::phys_to_page(table).unwrap());
}

/// Frees the context rooted at `root`.
///
/// On this architecture the per-context root only ever holds the user half.
///
/// # Safety
///
/// The context must not be bound on any CPU.
pub(crate) unsafe fn free_user(root: PhysAddr) {
	let t = table_mut(root);
	for ent in t.iter_mut() {
		if *ent & DESC_VALID != 0 {
			free_subtree(PhysAddr((*ent & ADDR_MASK) as usize), 2);
			*ent = 0;
			table_entry_removed(root);
		}
	}
	buddy::free(buddy::phys_to_page(root).unwrap());
}

/// Binds the user half of the context rooted at `root` on the current CPU.
///
/// # Safety
///
/// The root must point to valid translation tables.
pub(crate) unsafe fn bind(root: PhysAddr) {
	#[cfg(target_os = "none")]
	core::arch::asm!(
		"msr ttbr0_el1, {}",
		"isb",
		"tlbi vmalle1",
		"dsb nsh",
		"isb",
		in(reg) root.0,
	);
	#[cfg(not(target_os = "none"))]
	let _ = root;
}

/// Tells whether the context rooted at `root` is bound on the current CPU.
pub(crate) fn is_bound(root: PhysAddr) -> bool {
	#[cfg(target_os = "none")]
	{
		let ttbr0: usize;
		unsafe {
			core::arch::asm!("mrs {}, ttbr0_el1", out(reg) ttbr0);
		}
		ttbr0 & 0x0000_ffff_ffff_f000 == root.0
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
		core::arch::asm!(
			"dsb ishst",
			"tlbi vaae1, {}",
			"dsb ish",
			"isb",
			in(reg) (virt.0 >> 12),
		);
	}
	#[cfg(not(target_os = "none"))]
	let _ = virt;
}
