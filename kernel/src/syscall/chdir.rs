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

//! The `chdir` system call.

use super::user_path;
use crate::{file::vfs, memory::VirtAddr, process::Process};
use alloc::sync::Arc;
use utils::{errno, errno::EResult};

pub fn chdir(proc: &Arc<Process>, path: VirtAddr) -> EResult<usize> {
	let path = user_path(proc, path)?;
	let vn = vfs::lookup(&path)?;
	if !vn.is_dir() {
		return Err(errno!(ENOTDIR));
	}
	*proc.cwd.lock() = path;
	Ok(0)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		memory::user,
		memory::vmem::Prot,
		process::mem_space::segment::MapFlags,
		test_utils,
	};
	use utils::limits::PAGE_SIZE;

	#[test]
	fn chdir_changes_cwd() {
		test_utils::init_kernel();
		vfs::mkdir(b"/chdir_d").unwrap();
		vfs::create(b"/chdir_f", vfs::node::VnodeType::Regular).unwrap();
		let proc = Process::create("chdir_test", true).unwrap();
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
		user::copy_to_user(&proc.addr_space, buf, b"/chdir_d\0").unwrap();
		chdir(&proc, buf).unwrap();
		assert_eq!(&*proc.cwd.lock(), b"/chdir_d");
		// Not a directory
		user::copy_to_user(&proc.addr_space, buf, b"/chdir_f\0").unwrap();
		assert_eq!(chdir(&proc, buf).unwrap_err(), errno!(ENOTDIR));
		// Relative paths resolve against the new cwd
		user::copy_to_user(&proc.addr_space, buf, b"..\0").unwrap();
		chdir(&proc, buf).unwrap();
		assert_eq!(&*proc.cwd.lock(), b"/");
	}
}
