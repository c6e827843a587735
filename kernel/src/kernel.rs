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

//! Petrel is a small preemptive kernel for x86_64 and AArch64.
//!
//! This crate is the kernel itself, built as a library so the boot glue and kernel
//! modules can link against it. The hardware-facing paths only exist when building for a
//! freestanding target (`target_os = "none"`); everything else, including the virtual
//! memory manager, the VFS and the scheduler bookkeeping, also builds hosted, which is
//! how the test suite runs.

#![cfg_attr(not(test), no_std)]
#![feature(allocator_api)]

extern crate alloc;

pub mod arch;
pub mod event;
pub mod file;
pub mod logger;
pub mod memory;
#[cfg(target_os = "none")]
mod panic;
pub mod process;
pub mod sync;
pub mod syscall;
#[cfg(test)]
pub(crate) mod test_utils;
pub mod time;

use memory::memmap::BootInfo;
use utils::errno::EResult;

/// Initializes the kernel.
///
/// This function must be called exactly once, from the boot path of the bootstrap CPU,
/// with interrupts disabled.
///
/// The order matters: memory first (everything allocates), then the VFS (the initramfs
/// needs it), then processes and the scheduler.
pub fn init(boot: &BootInfo) -> EResult<()> {
	logger::init();
	memory::init(boot)?;
	process::mem_space::init()?;
	event::init();
	file::vfs::init()?;
	if let Some(archive) = boot.initramfs {
		file::fs::ustar::extract(archive, b"/")?;
	}
	process::scheduler::init(1)?;
	log::info!("kernel initialized");
	Ok(())
}
