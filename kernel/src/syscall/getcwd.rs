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

//! The `getcwd` system call.

use crate::{memory::user, memory::VirtAddr, process::Process};
use alloc::sync::Arc;
use utils::{errno, errno::EResult};

pub fn getcwd(proc: &Arc<Process>, buf: VirtAddr, size: usize) -> EResult<usize> {
	let mut cwd = proc.cwd.lock().clone();
	cwd.push(0);
	if cwd.len() > size {
		return Err(errno!(ERANGE));
	}
	user::copy_to_user(&proc.addr_space, buf, &cwd)?;
	Ok(0)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		memory::vmem::Prot,
		process::mem_space::segment::MapFlags,
		test_utils,
	};
	use utils::limits::PAGE_SIZE;

	#[test]
	fn getcwd_range() {
		test_utils::init_kernel();
		let proc = Process::create("cwd_test", true).unwrap();
		*proc.cwd.lock() = b"/some/dir".to_vec();
		let buf = proc
			.addr_space
			.map(
				VirtAddr::default(),
				PAGE_SIZE,
				Prot::RW,
				MapFlags::PRIVATE | MapFlags::ANON,
				None,
				0,
			)
			.unwrap();
		// Too small for the path plus its terminator
		assert_eq!(getcwd(&proc, buf, 9).unwrap_err(), errno!(ERANGE));
		getcwd(&proc, buf, 64).unwrap();
		let mut out = [0u8; 10];
		user::copy_from_user(&proc.addr_space, buf, &mut out).unwrap();
		assert_eq!(&out, b"/some/dir\0");
	}
}
