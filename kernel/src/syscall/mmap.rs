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

//! The `mmap` system call.

use crate::{
	memory::{vmem::Prot, VirtAddr},
	process::{
		mem_space::{object::VmObject, segment::MapFlags},
		Process,
	},
};
use alloc::sync::Arc;
use utils::{errno, errno::EResult, limits::PAGE_SIZE};

/// Userspace protection flag: readable.
const PROT_READ: u32 = 0x1;
/// Userspace protection flag: writable.
const PROT_WRITE: u32 = 0x2;
/// Userspace protection flag: executable.
const PROT_EXEC: u32 = 0x4;

fn prot_from_user(prot: u32) -> Prot {
	let mut out = Prot::empty();
	if prot & PROT_READ != 0 {
		out |= Prot::READ;
	}
	if prot & PROT_WRITE != 0 {
		out |= Prot::WRITE;
	}
	if prot & PROT_EXEC != 0 {
		out |= Prot::EXEC;
	}
	out
}

pub fn mmap(
	proc: &Arc<Process>,
	addr: VirtAddr,
	len: usize,
	prot: u32,
	flags: u32,
	fd: i32,
	off: u64,
) -> EResult<usize> {
	let map_flags = MapFlags::from_bits(flags).ok_or(errno!(EINVAL))?;
	if off % PAGE_SIZE as u64 != 0 {
		return Err(errno!(EINVAL));
	}
	let prot = prot_from_user(prot);
	let object = if map_flags.contains(MapFlags::ANON) || fd < 0 {
		// A fresh zero-filled object
		None
	} else {
		let file = proc.fd_table.lock().get(fd)?;
		let pages = len.div_ceil(PAGE_SIZE) as u64;
		Some(VmObject::new_vnode(
			file.vnode().clone(),
			off,
			pages * PAGE_SIZE as u64,
		))
	};
	let start = proc.addr_space.map(addr, len, prot, map_flags, object, 0)?;
	Ok(start.0)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::test_utils;

	#[test]
	fn mmap_anon() {
		test_utils::init_kernel();
		let proc = Process::create("mmap_test", true).unwrap();
		let addr = mmap(
			&proc,
			VirtAddr::default(),
			2 * PAGE_SIZE,
			PROT_READ | PROT_WRITE,
			(MapFlags::ANON | MapFlags::PRIVATE).bits(),
			-1,
			0,
		)
		.unwrap();
		assert_ne!(addr, 0);
		assert!(proc.addr_space.segment_at(VirtAddr(addr)).is_some());
		// Both private and shared unset is invalid
		assert!(mmap(
			&proc,
			VirtAddr::default(),
			PAGE_SIZE,
			PROT_READ,
			MapFlags::ANON.bits(),
			-1,
			0,
		)
		.is_err());
	}
}
