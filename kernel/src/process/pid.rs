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

//! PID allocation.
//!
//! Every process has a unique PID, handed out by a bitmap allocator and returned when
//! the process goes away.

use crate::sync::IntSpin;
use core::ops::Deref;
use utils::{collections::id_allocator::IdAllocator, errno, errno::EResult};

/// A process identifier.
pub type Pid = u32;

/// The maximum number of PIDs.
const MAX_PID: usize = 32768;

/// PID of the kernel process.
pub const KERNEL_PID: Pid = 0;

/// The PID allocator.
static ALLOCATOR: IntSpin<Option<IdAllocator>> = IntSpin::new(None);

/// A PID, freed on drop.
#[derive(Debug)]
pub struct PidHandle(Pid);

impl PidHandle {
	/// Allocates an unused PID.
	pub fn unique() -> EResult<Self> {
		let mut allocator = ALLOCATOR.lock();
		let allocator = allocator.get_or_insert_with(|| IdAllocator::new(MAX_PID));
		let id = allocator.alloc().ok_or(errno!(ENOMEM))?;
		Ok(Self(id as Pid))
	}
}

impl Deref for PidHandle {
	type Target = Pid;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl Drop for PidHandle {
	fn drop(&mut self) {
		let mut allocator = ALLOCATOR.lock();
		if let Some(a) = allocator.as_mut() {
			a.free(self.0 as usize);
		}
	}
}
