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

//! Physical memory map, retrieved from the boot protocol.
//!
//! The boot glue translates whatever the bootloader hands over into a [`BootInfo`];
//! everything downstream reads the normalized structure.

use super::PhysAddr;
use core::sync::atomic::{AtomicUsize, Ordering::Relaxed};
use utils::limits::PAGE_SIZE;

/// The type of a memory map entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemmapKind {
	/// Usable RAM.
	Ram,
	/// Reserved, must not be touched.
	Reserved,
	/// Memory-mapped device registers.
	Mmio,
}

/// An entry of the physical memory map.
#[derive(Clone, Copy, Debug)]
pub struct MemmapEntry {
	/// Base physical address of the region.
	pub addr: PhysAddr,
	/// Length of the region in bytes.
	pub len: usize,
	/// The type of the region.
	pub kind: MemmapKind,
}

/// Boot information handed over by the entry glue.
#[derive(Debug)]
pub struct BootInfo<'a> {
	/// Offset of the higher-half direct map.
	pub hhdm_offset: usize,
	/// The physical memory map.
	pub memmap: &'a [MemmapEntry],
	/// The initramfs archive, if the bootloader loaded one.
	pub initramfs: Option<&'static [u8]>,
}

/// Base of the RAM region handed to the frame allocator.
static RAM_BEGIN: AtomicUsize = AtomicUsize::new(0);
/// Size of that region in pages.
static RAM_PAGES: AtomicUsize = AtomicUsize::new(0);

/// Normalizes the boot memory map.
///
/// The frame allocator manages the largest usable region; anything else is left to
/// MMIO mappings.
pub(super) fn init(boot: &BootInfo) {
	let largest = boot
		.memmap
		.iter()
		.filter(|e| e.kind == MemmapKind::Ram)
		.max_by_key(|e| e.len);
	if let Some(e) = largest {
		let begin = e.addr.align_to(PAGE_SIZE);
		let len = e.len - (begin.0 - e.addr.0);
		RAM_BEGIN.store(begin.0, Relaxed);
		RAM_PAGES.store(len / PAGE_SIZE, Relaxed);
	}
}

/// Returns the base and page count of the RAM region managed by the frame allocator.
pub(crate) fn ram_region() -> (PhysAddr, usize) {
	(
		PhysAddr(RAM_BEGIN.load(Relaxed)),
		RAM_PAGES.load(Relaxed),
	)
}
