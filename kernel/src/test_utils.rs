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

//! Hosted test support.
//!
//! The tests run the kernel over a leaked host-memory arena standing in for physical
//! RAM, with an HHDM offset of zero: a "physical" address is the host address of the
//! arena byte. One kernel instance is shared by every test of the binary.

use crate::memory::{
	memmap::{BootInfo, MemmapEntry, MemmapKind},
	PhysAddr,
};
use std::sync::{Mutex, MutexGuard, Once};

/// The size of the simulated physical memory.
const ARENA_SIZE: usize = 64 << 20;

static INIT: Once = Once::new();

/// Serializes the tests that drive the boot CPU's scheduler, whose switches must not
/// interleave.
static SCHED_LOCK: Mutex<()> = Mutex::new(());

/// Takes the scheduler-driving lock.
pub(crate) fn sched_lock() -> MutexGuard<'static, ()> {
	SCHED_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// Boots the kernel over a fresh arena. Idempotent.
pub(crate) fn init_kernel() {
	INIT.call_once(|| {
		let arena = Vec::leak(vec![0u8; ARENA_SIZE]);
		let memmap = [MemmapEntry {
			addr: PhysAddr(arena.as_ptr() as usize),
			len: arena.len(),
			kind: MemmapKind::Ram,
		}];
		let boot = BootInfo {
			hhdm_offset: 0,
			memmap: &memmap,
			initramfs: None,
		};
		crate::init(&boot).expect("kernel initialization failed");
	});
}
